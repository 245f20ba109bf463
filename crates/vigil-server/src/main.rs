//! vigil control-plane server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil_config::Config;
use vigil_server::state::AppState;
use vigil_server::{auth, broadcaster, routes};

#[derive(Parser, Debug)]
#[command(name = "vigil-server", about = "Control plane for the vigil fleet monitor", version)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return;
        }
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let addr: SocketAddr = match config.listen_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, addr = %config.listen_addr, "invalid listen address");
            return;
        }
    };

    let state = AppState::new(config, Arc::new(auth::AllowAll));
    let cancel = CancellationToken::new();
    let broadcaster = broadcaster::spawn(state.clone(), cancel.clone());

    let app = routes::router(state);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, addr = %addr, "bind failed");
            return;
        }
    };

    info!(addr = %addr, "control plane listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        error!(error = %err, "server error");
    }

    cancel.cancel();
    let _ = broadcaster.await;
    info!("shutdown complete");
}
