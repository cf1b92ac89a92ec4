use clap::Parser;
use std::net::SocketAddr;
use stressrpc_server::config::DEFAULT_PORT;
use stressrpc_server::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "stressrpc-server", about = "Test service used as a stress-test target")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let config = ServerConfig { address: SocketAddr::new(args.host, args.port) };

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    // Print "Listening on <addr>" once the server signals it is bound.
    tokio::spawn(async move {
        if let Ok(addr) = ready_rx.await {
            println!("Listening on {}", addr);
        }
    });

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("interrupt received, draining in-flight calls");
    };

    Server::new(config).run_until(ready_tx, shutdown).await?;
    Ok(())
}
