//! Browser-to-browser file sharing: a rendezvous relay that introduces peers
//! inside named rooms, and the chunked framing protocol they speak once a
//! direct data channel is up.

pub mod config;
pub mod diagnostics;
pub mod peer;
pub mod signaling;
pub mod transfer;
