use actix_web::web::Bytes;
use futures_util::{SinkExt as _, StreamExt as _};

use share_socket::ws;

use crate::helper::{raw_connect, TestApp};

#[actix_web::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;
    let response = reqwest::Client::new()
        .get(&app.path("health_check"))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status(), 200);
}

#[actix_web::test]
async fn client_ping_pong() -> anyhow::Result<()> {
    let app = TestApp::spawn().await;
    let mut ws = raw_connect(&app).await;

    let mut got_pong = false;
    ws.send(ws::Message::Ping(Bytes::new())).await.unwrap();
    if let Some(msg) = ws.next().await {
        match msg {
            Ok(ws::Frame::Pong(_)) => {
                got_pong = true;
            }
            _ => {}
        }
    }
    assert!(got_pong);
    Ok(())
}
