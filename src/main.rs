use airbridge::config::ServerConfig;
use airbridge::diagnostics;
use airbridge::signaling::SignalingServer;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;

    println!("   AirBridge Signaling Server");
    println!("   Signaling on {}", config.signaling_addr());
    println!("   Rooms listing on http://{}/rooms", config.diagnostics_addr());
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::new();
    let handle = server.handle();
    let diagnostics_addr = config.diagnostics_addr();

    tokio::spawn(async move {
        if let Err(e) = diagnostics::run(&diagnostics_addr, handle).await {
            error!("Diagnostics listener failed: {}", e);
        }
    });

    let signaling_addr = config.signaling_addr();
    tokio::select! {
        result = server.run(&signaling_addr) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    Ok(())
}
