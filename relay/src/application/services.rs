use actix::Addr;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use share_socket::MAX_FRAME_BYTES;

use super::registry::Registry;
use super::session::WsSession;

#[get("/health_check")]
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// Upgrades `GET /` into the relay WebSocket.
#[get("/")]
async fn connect(
    req: HttpRequest,
    stream: web::Payload,
    registry: web::Data<Addr<Registry>>,
) -> Result<HttpResponse, Error> {
    let peer_ip = req.peer_addr().map(|addr| addr.ip());
    let session = WsSession::new(registry.get_ref().clone(), peer_ip);
    // Chunk payloads need room beyond the 64 KiB default frame cap.
    ws::WsResponseBuilder::new(session, &req, stream)
        .frame_size(MAX_FRAME_BYTES)
        .start()
}
