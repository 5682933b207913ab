use trackwire_server::{Dispatcher, ServerConfig, SessionEvent};
use trackwire_shared::Message;

use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("TRACKWIRE_ADDR") {
        config.bind_addr = addr;
    }

    info!("Track dispatcher starting");
    info!("  bind address: {}", config.bind_addr);
    info!("  idle timeout: {:?}", config.idle_timeout);

    let mut dispatcher = Dispatcher::bind(config).await?;

    while let Some(event) = dispatcher.recv().await {
        match event {
            SessionEvent::Started { id } => {
                info!("[{id}] session started");
            }
            SessionEvent::Data { id, message } => {
                log_message(&id, &message);
            }
            SessionEvent::Finished { id } => {
                info!("[{id}] session finished");
            }
        }
    }

    Ok(())
}

fn log_message(id: &uuid::Uuid, message: &Message) {
    if !message.valid {
        debug!("[{id}] unrecognized frame");
        return;
    }

    let imei = message.imei.as_deref().unwrap_or("-");
    let cmd = message.cmd.as_deref().unwrap_or("-");

    match &message.gps.position {
        Some((longitude, latitude)) => {
            info!(
                "[{id}] {imei} {cmd}: fix={} position=({longitude}, {latitude}) speed={:?} heading={:?}",
                message.gps.fix, message.gps.speed, message.gps.heading
            );
        }
        None => {
            info!("[{id}] {imei} {cmd}");
        }
    }
}
