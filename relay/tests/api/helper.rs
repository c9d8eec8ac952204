use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use once_cell::sync::Lazy;

use relay::{
    application::Application,
    settings::{ApplicationSettings, Settings},
};
use share_socket::message::{Message, RawIdentity};
use share_socket::{ws, ShareSocket, SocketConfigBuilder, WsFramed};

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug")
    }
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
});

pub struct TestApp {
    pub address: String,
    pub port: u16,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Lazy::force(&TRACING);

        let settings = Settings {
            application: ApplicationSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
        };
        let app = Application::build(settings)
            .await
            .expect("Failed to build application");
        let port = app.port();
        let _ = tokio::spawn(app.run_until_stopped());
        Self {
            address: "127.0.0.1".to_string(),
            port,
        }
    }

    pub fn base_address(&self) -> String {
        format!("http://{}:{}", &self.address, self.port)
    }

    pub fn path(&self, path: &str) -> String {
        format!("{}/{}", &self.base_address(), path)
    }

    pub fn socket_config(&self, name: &str) -> SocketConfigBuilder {
        SocketConfigBuilder::new()
            .address(&self.address)
            .port(self.port)
            .name(name)
    }
}

pub async fn raw_connect(app: &TestApp) -> WsFramed {
    let config = app.socket_config("").build();
    let (_res, ws) = ShareSocket::connect(&config).await.expect("ws connect failed");
    ws
}

pub async fn send(ws: &mut WsFramed, msg: &Message) {
    ws.send(ws::Message::Text(serde_json::to_string(msg).unwrap().into()))
        .await
        .unwrap();
}

pub async fn send_raw(ws: &mut WsFramed, text: &str) {
    ws.send(ws::Message::Text(text.to_string().into()))
        .await
        .unwrap();
}

pub async fn hello(ws: &mut WsFramed, client_id: &str, name: &str) {
    send(
        ws,
        &Message::Hello {
            client_id: Some(client_id.to_string()),
            identity: RawIdentity {
                name: name.to_string(),
                mac: String::new(),
            },
        },
    )
    .await;
}

/// `hello` plus the welcome wait, so the session is registered for sure.
pub async fn join(ws: &mut WsFramed, client_id: &str, name: &str) {
    hello(ws, client_id, name).await;
    recv_matching(ws, |m| matches!(m, Message::Welcome { .. })).await;
}

/// Next message for which `keep` holds, answering pings and skipping the rest.
pub async fn recv_matching<F>(ws: &mut WsFramed, mut keep: F) -> Message
where
    F: FnMut(&Message) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = ws
                .next()
                .await
                .expect("connection closed")
                .expect("transport error");
            match frame {
                ws::Frame::Text(text) => {
                    let msg: Message = serde_json::from_slice(&text).expect("unparseable frame");
                    if keep(&msg) {
                        return msg;
                    }
                }
                ws::Frame::Ping(payload) => {
                    let _ = ws.send(ws::Message::Pong(payload)).await;
                }
                _ => {}
            }
        }
    })
    .await
    .expect("timed out waiting for a matching message")
}

pub async fn recv_message(ws: &mut WsFramed) -> Message {
    recv_matching(ws, |_| true).await
}

/// Everything that arrives within the window. Presence rebroadcasts from host
/// enrichment may land here too; callers assert on what must or must not be
/// present rather than on exact counts.
pub async fn frames_within(ws: &mut WsFramed, window: Duration) -> Vec<Message> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(Ok(frame)) = ws.next().await {
            if let ws::Frame::Text(text) = frame {
                if let Ok(msg) = serde_json::from_slice::<Message>(&text) {
                    seen.push(msg);
                }
            }
        }
    })
    .await;
    seen
}

pub async fn assert_no_relay(ws: &mut WsFramed, window: Duration) {
    let seen = frames_within(ws, window).await;
    assert!(
        seen.iter().all(|m| !matches!(m, Message::Relay { .. })),
        "unexpected relay envelope: {seen:?}"
    );
}

pub async fn expect_close(ws: &mut WsFramed) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(ws::Frame::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(_)) => return,
            }
        }
    })
    .await
    .expect("connection was never closed")
}
