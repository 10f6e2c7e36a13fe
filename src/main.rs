use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use mqtt_session::config::{default_config_path, ClientConfig};
use mqtt_session::mqtt::{LoggingDelegate, MsgManager, SessionHandle};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = ClientConfig::load_or_default(&config_path).await;
    let params = config.connect_parameters()?;

    let address = config.broker.address();
    info!("Connecting to broker at {}", address);
    let stream = TcpStream::connect(&address)
        .await
        .map_err(|e| eyre!("Failed to connect to {}: {}", address, e))?;
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Unable to disable Nagle on broker connection: {}", e);
    }

    let (msg_tx, mut msg_rx) = mpsc::channel(100);
    let delegate = Arc::new(LoggingDelegate::new(
        params.clone(),
        config.session.subscriptions.clone(),
        MsgManager::new(msg_tx),
    ));

    let session = SessionHandle::spawn_with_limit(stream, params, delegate, config.max_packet_size);
    let mut status = session.status();

    loop {
        tokio::select! {
            Some(msg) = msg_rx.recv() => {
                println!("{}", msg.render());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                debug!("Session status: {:?}", current);
                if current.termination.is_some() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing session");
                break;
            }
        }
    }

    match session.shutdown().await {
        Ok(cause) => info!("Session ended: {:?}", cause),
        Err(e) => return Err(eyre!("Session ended with error: {}", e)),
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
