use std::net::IpAddr;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web_actors::ws;
use tracing::debug;
use uuid::Uuid;

use share_socket::message::Message;

use super::registry::{self, Registry};

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One actor per WebSocket connection. Parses frames and forwards them to the
/// registry; never touches shared state itself.
#[derive(Debug)]
pub struct WsSession {
    id: Uuid,
    heartbeat: Instant,
    registry: Addr<Registry>,
    peer_ip: Option<IpAddr>,
}

impl WsSession {
    pub fn new(registry: Addr<Registry>, peer_ip: Option<IpAddr>) -> Self {
        Self {
            id: Uuid::new_v4(),
            heartbeat: Instant::now(),
            registry,
            peer_ip,
        }
    }

    /// helper method that sends ping to client every 5 seconds (HEARTBEAT_INTERVAL).
    ///
    /// also this method checks heartbeats from client
    fn heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > CLIENT_TIMEOUT {
                debug!("client {} heartbeat failed, disconnecting", act.id);
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn dispatch(&mut self, msg: Message, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            Message::Hello { client_id, identity } => {
                let client_id = client_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                self.registry.do_send(registry::Hello {
                    session_id: self.id,
                    client_id,
                    identity,
                    peer_ip: self.peer_ip,
                    addr: ctx.address().recipient(),
                });
            }
            Message::Identify { identity } => {
                self.registry.do_send(registry::Identify { session_id: self.id, identity });
            }
            Message::Relay { to, payload, .. } => {
                self.registry.do_send(registry::Relay { session_id: self.id, to, payload });
            }
            // Layout is fixed; position updates from clients are discarded.
            Message::LayoutUpdate { .. } => {}
            // Server-originated types carry no meaning inbound.
            Message::Welcome { .. }
            | Message::Layout { .. }
            | Message::Peers { .. }
            | Message::PeerLeft { .. } => {}
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.registry.do_send(registry::Disconnect { session_id: self.id });
        Running::Stop
    }
}

impl Handler<registry::Downstream> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: registry::Downstream, ctx: &mut Self::Context) -> Self::Result {
        match msg {
            registry::Downstream::Forward(msg) => {
                ctx.text(serde_json::to_string(&msg).unwrap());
            }
            registry::Downstream::Close => {
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<Message>(&text) {
                Ok(msg) => self.dispatch(msg, ctx),
                // Malformed input gets no reply, not even an error.
                Err(e) => debug!("ignoring unparseable message: {e}"),
            },
            Ok(ws::Message::Binary(_)) => debug!("ignoring binary frame"),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}
