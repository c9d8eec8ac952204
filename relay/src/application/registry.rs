use std::collections::HashMap;
use std::net::IpAddr;

use actix::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use share_socket::message::{Identity, Message, Positions, RawIdentity};

use crate::identity::{normalize, resolve_host};
use crate::layout::{layout_for, DEFAULT_ROOM};

/// What the registry pushes down to a session actor.
#[derive(Debug, Message)]
#[rtype(result = "()")]
pub enum Downstream {
    Forward(Message),
    /// The session was superseded by a newer connection for its clientId.
    Close,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Hello {
    pub session_id: Uuid,
    pub client_id: String,
    pub identity: RawIdentity,
    pub peer_ip: Option<IpAddr>,
    pub addr: Recipient<Downstream>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Identify {
    pub session_id: Uuid,
    pub identity: RawIdentity,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Relay {
    pub session_id: Uuid,
    pub to: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub session_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
struct HostResolved {
    session_id: Uuid,
    host: String,
}

struct Member {
    client_id: String,
    identity: Identity,
    peer_ip: Option<IpAddr>,
    addr: Recipient<Downstream>,
}

#[derive(Default)]
struct Room {
    members: HashMap<Uuid, Member>,
}

/// Owns every room, membership map, and identity. All mutation is serialized
/// through this actor's mailbox; session actors never share state directly.
#[derive(Default)]
pub struct Registry {
    rooms: HashMap<String, Room>,
    layouts: HashMap<String, Positions>,
    sessions: HashMap<Uuid, String>,
}

impl Actor for Registry {
    type Context = Context<Self>;
}

/// Sends are `do_send`: a full or closed mailbox means the frame is dropped,
/// which is the relay's entire failure policy.
fn broadcast(room: &Room, msg: &Message, except: Option<Uuid>) {
    for (id, member) in &room.members {
        if Some(*id) == except {
            continue;
        }
        member.addr.do_send(Downstream::Forward(msg.clone()));
    }
}

fn peers_message(room: &Room) -> Message {
    Message::Peers {
        peers: room.members.values().map(|m| normalize(&m.identity)).collect(),
    }
}

impl Registry {
    fn layout(&mut self, room_id: &str) -> Positions {
        self.layouts
            .entry(room_id.to_string())
            .or_insert_with(|| layout_for(room_id))
            .clone()
    }

    fn enrich(&self, session_id: Uuid, peer_ip: Option<IpAddr>, ctx: &mut Context<Self>) {
        let Some(ip) = peer_ip else { return };
        let addr = ctx.address();
        actix::spawn(async move {
            if let Some(host) = resolve_host(ip).await {
                addr.do_send(HostResolved { session_id, host });
            }
        });
    }
}

impl Handler<Hello> for Registry {
    type Result = ();

    fn handle(&mut self, msg: Hello, ctx: &mut Self::Context) -> Self::Result {
        let Hello { session_id, client_id, identity, peer_ip, addr } = msg;
        let room_id = DEFAULT_ROOM.to_string();
        let positions = self.layout(&room_id);
        let identity = Identity {
            client_id: client_id.clone(),
            name: identity.name,
            mac: identity.mac,
            ip: peer_ip.map(|ip| ip.to_string()).unwrap_or_default(),
            host: String::new(),
        };

        let room = self.rooms.entry(room_id.clone()).or_default();

        // Newest connection wins: any other session bound to the same
        // clientId is closed and dropped from membership first. Supersession
        // is not a departure, so no peer_left goes out.
        let stale: Vec<Uuid> = room
            .members
            .iter()
            .filter(|(id, member)| **id != session_id && member.client_id == client_id)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            info!("session {id} superseded by {session_id} for client {client_id}");
            if let Some(member) = room.members.remove(&id) {
                member.addr.do_send(Downstream::Close);
            }
            self.sessions.remove(&id);
        }

        addr.do_send(Downstream::Forward(Message::Welcome {
            room: room_id.clone(),
            client_id: client_id.clone(),
            identity: normalize(&identity),
        }));
        addr.do_send(Downstream::Forward(Message::Layout { positions }));

        room.members.insert(session_id, Member { client_id, identity, peer_ip, addr });
        self.sessions.insert(session_id, room_id);
        let announce = peers_message(room);
        broadcast(room, &announce, None);

        self.enrich(session_id, peer_ip, ctx);
    }
}

impl Handler<Identify> for Registry {
    type Result = ();

    fn handle(&mut self, msg: Identify, ctx: &mut Self::Context) -> Self::Result {
        let Some(room_id) = self.sessions.get(&msg.session_id).cloned() else { return };
        let Some(room) = self.rooms.get_mut(&room_id) else { return };
        let Some(member) = room.members.get_mut(&msg.session_id) else { return };
        member.identity.name = msg.identity.name;
        member.identity.mac = msg.identity.mac;
        let peer_ip = member.peer_ip;
        let announce = peers_message(room);
        broadcast(room, &announce, None);
        self.enrich(msg.session_id, peer_ip, ctx);
    }
}

impl Handler<Relay> for Registry {
    type Result = ();

    fn handle(&mut self, msg: Relay, _: &mut Self::Context) -> Self::Result {
        let Relay { session_id, to, payload } = msg;
        let Some(room_id) = self.sessions.get(&session_id) else { return };
        let Some(room) = self.rooms.get(room_id) else { return };
        let Some(sender) = room.members.get(&session_id) else { return };
        // The payload is forwarded as received; only clients interpret it.
        let envelope = Message::Relay {
            to: to.clone(),
            from: Some(sender.client_id.clone()),
            from_name: Some(normalize(&sender.identity).name),
            payload,
        };
        match to {
            Some(target) => match room.members.values().find(|m| m.client_id == target) {
                Some(member) => member.addr.do_send(Downstream::Forward(envelope)),
                // Addressing miss: dropped, nothing goes back to the sender.
                None => debug!("dropping relay for absent client {target}"),
            },
            None => broadcast(room, &envelope, Some(session_id)),
        }
    }
}

impl Handler<Disconnect> for Registry {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) -> Self::Result {
        let Some(room_id) = self.sessions.remove(&msg.session_id) else {
            // Superseded sessions were already evicted; their close is silent.
            return;
        };
        let Some(room) = self.rooms.get_mut(&room_id) else { return };
        let Some(member) = room.members.remove(&msg.session_id) else { return };
        if room.members.is_empty() {
            self.rooms.remove(&room_id);
            return;
        }
        broadcast(room, &Message::PeerLeft { client_id: member.client_id }, None);
        let announce = peers_message(room);
        broadcast(room, &announce, None);
    }
}

impl Handler<HostResolved> for Registry {
    type Result = ();

    fn handle(&mut self, msg: HostResolved, _: &mut Self::Context) -> Self::Result {
        let Some(room_id) = self.sessions.get(&msg.session_id) else { return };
        let Some(room) = self.rooms.get_mut(room_id) else { return };
        let Some(member) = room.members.get_mut(&msg.session_id) else { return };
        member.identity.host = msg.host;
        let announce = peers_message(room);
        broadcast(room, &announce, None);
    }
}
