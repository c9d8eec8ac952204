use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A client identity as it travels on the wire.
///
/// Only `clientId` has to be unique; the other fields are advisory and may be
/// empty until the server fills or enriches them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "clientId", default)]
    pub client_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub host: String,
}

/// The identity fragment a client announces in `hello` and `identify`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: String,
}

/// A desk position in virtual canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

pub type Positions = HashMap<String, Position>;

/// Everything that crosses the WebSocket, in both directions.
///
/// Relay payloads stay as raw JSON here: the server forwards them without
/// looking inside, and only the receiving client parses them into [`Payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Hello {
        #[serde(
            rename = "clientId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        client_id: Option<String>,
        #[serde(default)]
        identity: RawIdentity,
    },
    Welcome {
        room: String,
        #[serde(rename = "clientId")]
        client_id: String,
        identity: Identity,
    },
    Layout {
        positions: Positions,
    },
    Identify {
        #[serde(default)]
        identity: RawIdentity,
    },
    Peers {
        peers: Vec<Identity>,
    },
    PeerLeft {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    Relay {
        #[serde(default)]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(rename = "fromName", default, skip_serializing_if = "Option::is_none")]
        from_name: Option<String>,
        payload: serde_json::Value,
    },
    LayoutUpdate {
        name: String,
        x: i32,
        y: i32,
    },
}

/// What clients put inside a relay envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Text { content: String },
    File(FileEvent),
}

/// One step of the offer/accept/chunk/complete transfer handshake.
///
/// Chunks repeat the size/name/mime metadata so a receiver that never saw the
/// offer can still reassemble the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum FileEvent {
    Offer {
        #[serde(rename = "transferId")]
        transfer_id: String,
        name: String,
        size: u64,
        mime: String,
    },
    Accept {
        #[serde(rename = "transferId")]
        transfer_id: String,
    },
    Chunk {
        #[serde(rename = "transferId")]
        transfer_id: String,
        data: Vec<u8>,
        size: u64,
        name: String,
        mime: String,
    },
    Complete {
        #[serde(rename = "transferId")]
        transfer_id: String,
    },
}
