//! Connected clients and the messages exchanged with them.

use std::fmt;

use serde_json::Value;
use uuid::Uuid;

/// Transport-level connection id, unique for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    /// Account the client authenticated as.
    pub account: Uuid,
    pub name: String,
    /// Operator level, `None` for regular players.
    pub permission_level: Option<u32>,
    /// Name of whoever last sent this client a private message.
    pub last_messager: Option<String>,
    /// Packets received since the last rate check.
    pub sent_packets: u32,
}

impl Client {
    pub fn new(id: ClientId, account: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            account,
            name: name.into(),
            permission_level: None,
            last_messager: None,
            sent_packets: 0,
        }
    }
}

/// What a client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Command(String),
    Chat(String),
}

/// What the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Chat(String),
    Kick(String),
    /// A level event, forwarded verbatim.
    Event { name: &'static str, args: Vec<Value> },
    /// Names of the first 25 connected clients.
    PlayerList(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Client(ClientId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub message: Outgoing,
}

/// User-facing text for a transport disconnect reason. Unknown reasons pass
/// through unchanged.
pub fn disconnect_reason(reason: &str) -> &str {
    match reason {
        "server namespace disconnect" => "Disconnected by server",
        "client namespace disconnect" => "Client disconnected",
        "ping timeout" => "Connection timed out",
        "transport close" => "Lost Connection",
        "transport error" => "Connection failed",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_reasons() {
        assert_eq!(disconnect_reason("ping timeout"), "Connection timed out");
        assert_eq!(disconnect_reason("transport close"), "Lost Connection");
        assert_eq!(disconnect_reason("cosmic ray"), "cosmic ray");
    }
}
