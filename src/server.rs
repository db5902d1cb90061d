use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use api_registry::config::{load_config, RegistryConfig};
use api_registry::service::RegistryService;
use api_registry::storage::memory::MemoryStorage;
use api_registry::{grpc, VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &RegistryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing.log_level.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.tracing.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn main() -> Result<(), std::io::Error> {
    let config = load_config().map_err(std::io::Error::other)?;
    init_tracing(&config);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: RegistryConfig) -> Result<(), std::io::Error> {
    info!(version = VERSION, grpc_port = config.grpc_port, "starting registry server");

    let storage = Arc::new(MemoryStorage::new());
    let service = Arc::new(RegistryService::new(storage));
    let addr = SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), config.grpc_port).into();

    tokio::select! {
        result = grpc::start_grpc_server(addr, service) => {
            result.map_err(std::io::Error::other)?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
