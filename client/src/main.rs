use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use share_socket::transfer::TransferOptions;
use share_socket::{ShareSocket, SocketConfigBuilder, SocketEvent};

fn setup() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug")
    }
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// Headless peer: joins the room, prints what happens, saves received files
/// to the working directory. `client [FILE]` also offers FILE to the room.
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    setup();

    let address = std::env::var("RELAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("RELAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(18080);
    let name = std::env::var("SHARE_NAME").unwrap_or_default();
    let file = std::env::args().nth(1).map(PathBuf::from);

    let config = SocketConfigBuilder::new()
        .address(address)
        .port(port)
        .name(name)
        .build();
    let mut socket = ShareSocket::new(config).await?;
    let handle = socket.handle();
    let mut events = socket.take_events();
    info!("connected as {}", handle.client_id());
    actix_rt::spawn(async move {
        if let Err(e) = socket.run().await {
            warn!("socket stopped: {e}");
        }
    });

    if let Some(path) = file {
        let outcome = handle.send_file(&path, None, TransferOptions::default()).await?;
        info!("send of {} finished: {outcome:?}", path.display());
    }

    while let Some(event) = events.recv().await {
        match event {
            SocketEvent::Peers(peers) => info!("{} peer(s) online", peers.len()),
            SocketEvent::PeerLeft { client_id } => info!("{client_id} left"),
            SocketEvent::Layout(positions) => info!("layout with {} desks", positions.len()),
            SocketEvent::LayoutUpdate { name, x, y } => info!("{name} moved to ({x}, {y})"),
            SocketEvent::Text { from_name, content, .. } => {
                info!("text from {from_name}: {content}");
            }
            SocketEvent::Offer { from, name, size, .. } => {
                info!("incoming {name} ({size} bytes) from {from}");
            }
            SocketEvent::Progress { transfer_id, received, size } => {
                info!("{transfer_id}: {received}/{size} bytes");
            }
            SocketEvent::Received { name, data, .. } => {
                tokio::fs::write(&name, &data).await?;
                info!("saved {name} ({} bytes)", data.len());
            }
        }
    }
    Ok(())
}
