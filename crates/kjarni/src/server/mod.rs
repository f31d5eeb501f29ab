//! # Server Host
//!
//! Hosts one [`Level`] for a set of remote clients without owning a
//! transport. The transport feeds connections and packets in, and drains
//! [`Envelope`]s out.
//!
//! ```text
//!   transport ── connect(token) ──► admission ──► Client roster
//!             ── receive(id, ..) ─► commands / chat
//!             ◄─ drain_outgoing() ── chat, kicks, player list, level events
//!
//!   host loop ── tick() ──────────► Level::tick + event forwarding
//!             ── check_packet_rates() once per second
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! let mut server = Server::new(config, access, level, Box::new(accounts))?;
//! let id = server.connect("token-abc")?;
//! server.receive(id, Incoming::Chat("hello".into()));
//! server.tick()?;
//! for envelope in server.drain_outgoing() {
//!     transport.send(envelope);
//! }
//! ```

mod client;
mod commands;
mod ticker;

pub use client::{disconnect_reason, Client, ClientId, Envelope, Incoming, Outgoing, Recipient};
pub use commands::register_server_commands;
pub use ticker::Ticker;

use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::{register_debug_commands, CommandRegistry, ExecutionContext};
use crate::config::{AccessLists, ServerConfig};
use crate::error::Result;
use crate::events::LevelEvent;
use crate::level::Level;

/// Packets per second above which a client is kicked.
pub const MAX_PACKETS_PER_SECOND: u32 = 50;

/// Player list length sent to clients.
pub const PLAYER_LIST_LEN: usize = 25;

/// Name used for the console in logs and private messages.
pub const CONSOLE_NAME: &str = "Server";

// ── Accounts ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub is_disabled: bool,
}

/// Identity lookups. Errors mean the lookup itself failed; `Ok(None)`
/// means no such account.
pub trait AccountDirectory: Send {
    fn by_token(&self, token: &str) -> anyhow::Result<Option<Account>>;
    fn by_username(&self, username: &str) -> anyhow::Result<Option<Account>>;
}

/// In-memory directory keyed by token.
#[derive(Debug, Clone, Default)]
pub struct StaticAccounts {
    by_token: HashMap<String, Account>,
}

impl StaticAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, account: Account) {
        self.by_token.insert(token.into(), account);
    }
}

impl AccountDirectory for StaticAccounts {
    fn by_token(&self, token: &str) -> anyhow::Result<Option<Account>> {
        Ok(self.by_token.get(token).cloned())
    }

    fn by_username(&self, username: &str) -> anyhow::Result<Option<Account>> {
        Ok(self
            .by_token
            .values()
            .find(|a| a.username == username)
            .cloned())
    }
}

// ── Admission ────────────────────────────────────────────────────────────

/// Why a connection was refused. The message is shown to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("Server is stopping or restarting")]
    Stopping,
    #[error("Authentication request failed")]
    AuthFailed,
    #[error("Invalid account")]
    InvalidAccount,
    #[error("You are not whitelisted")]
    NotWhitelisted,
    #[error("You are banned from this server")]
    Banned,
    #[error("Your account is disabled")]
    Disabled,
    #[error("Server full")]
    Full,
    #[error("Already connected")]
    AlreadyConnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Stopping,
    Restarting,
}

// ── Server ───────────────────────────────────────────────────────────────

pub struct Server {
    config: ServerConfig,
    access: AccessLists,
    level: Level,
    accounts: Box<dyn AccountDirectory>,
    clients: Vec<Client>,
    next_client: u64,
    outbox: Vec<Envelope>,
    commands: Arc<CommandRegistry<Server>>,
    level_events: Receiver<LevelEvent>,
    /// Client running the current command, `None` for the console.
    caller: Option<ClientId>,
    status: Status,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        access: AccessLists,
        mut level: Level,
        accounts: Box<dyn AccountDirectory>,
    ) -> Result<Self> {
        let mut commands = CommandRegistry::new();
        register_debug_commands(&mut commands, Arc::clone(level.registry()))?;
        register_server_commands(&mut commands)?;
        let level_events = level.events_mut().subscribe();

        Ok(Self {
            config,
            access,
            level,
            accounts,
            clients: Vec::new(),
            next_client: 0,
            outbox: Vec::new(),
            commands: Arc::new(commands),
            level_events,
            caller: None,
            status: Status::Running,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn access(&self) -> &AccessLists {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut AccessLists {
        &mut self.access
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut Level {
        &mut self.level
    }

    pub fn accounts(&self) -> &dyn AccountDirectory {
        self.accounts.as_ref()
    }

    pub fn commands(&self) -> &CommandRegistry<Server> {
        &self.commands
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }

    // ── Roster ───────────────────────────────────────────────────────

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.id == id)
    }

    pub fn client_by_name(&self, name: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.name == name)
    }

    pub fn client_by_account(&self, account: Uuid) -> Option<&Client> {
        self.clients.iter().find(|c| c.account == account)
    }

    pub fn player_list(&self) -> Vec<String> {
        self.clients
            .iter()
            .take(PLAYER_LIST_LEN)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Name of the client running the current command, or the console's.
    pub fn caller_name(&self) -> &str {
        self.caller
            .and_then(|id| self.client(id))
            .map_or(CONSOLE_NAME, |c| c.name.as_str())
    }

    pub fn caller(&self) -> Option<ClientId> {
        self.caller
    }

    // ── Outbox ───────────────────────────────────────────────────────

    pub fn send(&mut self, to: ClientId, message: Outgoing) {
        self.outbox.push(Envelope {
            to: Recipient::Client(to),
            message,
        });
    }

    pub fn broadcast(&mut self, message: Outgoing) {
        self.outbox.push(Envelope {
            to: Recipient::All,
            message,
        });
    }

    /// Everything queued for delivery since the last drain.
    pub fn drain_outgoing(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    fn broadcast_player_list(&mut self) {
        let names = self.player_list();
        self.broadcast(Outgoing::PlayerList(names));
    }

    // ── Connections ──────────────────────────────────────────────────

    /// Authenticate and admit a client.
    pub fn connect(&mut self, token: &str) -> std::result::Result<ClientId, Rejected> {
        let account = self.admit(token)?;
        let id = ClientId(self.next_client);
        self.next_client += 1;

        let mut client = Client::new(id, account.id, account.username);
        client.permission_level = self.access.op(account.id).map(|op| op.oplvl);
        log::info!("{} connected as client {id}", client.name);
        let joined = format!("{} joined", client.name);
        self.clients.push(client);

        self.broadcast(Outgoing::Chat(joined));
        self.broadcast_player_list();
        Ok(id)
    }

    fn admit(&self, token: &str) -> std::result::Result<Account, Rejected> {
        if self.status != Status::Running {
            return Err(Rejected::Stopping);
        }

        let account = match self.accounts.by_token(token) {
            Ok(Some(account)) => account,
            Ok(None) => {
                log::warn!("Invalid account data received");
                return Err(Rejected::InvalidAccount);
            }
            Err(err) => {
                log::warn!("API request for client authentication failed: {err}");
                return Err(Rejected::AuthFailed);
            }
        };

        if self.config.whitelist && !self.access.whitelist.contains(&account.id) {
            return Err(Rejected::NotWhitelisted);
        }
        if self.config.blacklist && self.access.blacklist.contains(&account.id) {
            return Err(Rejected::Banned);
        }
        if account.is_disabled {
            return Err(Rejected::Disabled);
        }
        if self.clients.len() >= self.config.max_clients
            && !self.access.can_bypass_limit(account.id)
        {
            return Err(Rejected::Full);
        }
        if self.client_by_account(account.id).is_some() {
            return Err(Rejected::AlreadyConnected);
        }
        Ok(account)
    }

    /// Remove a client after its connection closed. `reason` is the
    /// transport's reason code. Returns `false` for unknown clients.
    pub fn disconnect(&mut self, id: ClientId, reason: &str) -> bool {
        let Some(index) = self.clients.iter().position(|c| c.id == id) else {
            return false;
        };
        let client = self.clients.remove(index);
        log::info!("{} left ({})", client.name, disconnect_reason(reason));
        self.broadcast(Outgoing::Chat(format!("{} left", client.name)));
        self.broadcast_player_list();
        true
    }

    pub fn kick(&mut self, id: ClientId, message: &str) -> bool {
        if self.client(id).is_none() {
            return false;
        }
        self.send(id, Outgoing::Kick(message.to_string()));
        self.disconnect(id, "server namespace disconnect")
    }

    /// Kick a client and add its account to the blacklist.
    pub fn ban(&mut self, id: ClientId, message: &str) -> bool {
        let Some(account) = self.client(id).map(|c| c.account) else {
            return false;
        };
        self.kick(id, &format!("You have been banned from this server: {message}"));
        self.access.blacklist.insert(account);
        true
    }

    // ── Packets ──────────────────────────────────────────────────────

    /// Handle one packet from a client.
    pub fn receive(&mut self, id: ClientId, packet: Incoming) {
        let Some(client) = self.client_mut(id) else {
            log::warn!("Packet from unknown client {id}");
            return;
        };
        client.sent_packets += 1;
        let name = client.name.clone();

        match packet {
            Incoming::Command(text) => {
                if let Some(reply) = self.exec_command(Some(id), &text) {
                    self.send(id, Outgoing::Chat(reply));
                }
            }
            Incoming::Chat(data) => {
                log::info!("(Chat) {name}: {data}");
                self.broadcast(Outgoing::Chat(format!("{name}: {data}")));
            }
        }
    }

    /// Kick every client over the packet limit and reset all counters.
    /// Call once per second.
    pub fn check_packet_rates(&mut self) {
        let flooding: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|c| c.sent_packets > MAX_PACKETS_PER_SECOND)
            .map(|c| c.id)
            .collect();
        for id in flooding {
            self.kick(id, "Sending to many packets");
        }
        for client in &mut self.clients {
            client.sent_packets = 0;
        }
    }

    /// Run a command line as a client, or as the console when `caller` is
    /// `None`. The console bypasses permission checks.
    pub fn exec_command(&mut self, caller: Option<ClientId>, text: &str) -> Option<String> {
        let commands = Arc::clone(&self.commands);
        let previous = std::mem::replace(&mut self.caller, caller);
        let reply = commands.exec_command_string(text, self, caller.is_none());
        self.caller = previous;
        reply
    }

    // ── Level ────────────────────────────────────────────────────────

    /// Tick the level and forward the events it produced.
    pub fn tick(&mut self) -> Result<()> {
        let result = self.level.tick();
        self.forward_events();
        result
    }

    /// Queue every pending level event for all clients.
    pub fn forward_events(&mut self) {
        while let Ok(event) = self.level_events.try_recv() {
            self.outbox.push(Envelope {
                to: Recipient::All,
                message: Outgoing::Event {
                    name: event.name(),
                    args: event.args(),
                },
            });
        }
    }

    /// Write the level to the configured save path.
    pub fn save(&self) -> Result<()> {
        self.level.save_to_file(&self.config.save_path)?;
        log::info!("Saved the current level to {}", self.config.save_path.display());
        Ok(())
    }

    pub fn stop(&mut self) {
        log::info!("Stopping...");
        self.shut_down(Status::Stopping, "Server shutting down");
        log::info!("Stopped");
    }

    /// Like [`stop`](Self::stop); the host is expected to start a new
    /// process once it sees [`Status::Restarting`].
    pub fn restart(&mut self) {
        log::info!("Restarting...");
        self.shut_down(Status::Restarting, "Server restarting");
        log::info!("Restarted");
    }

    fn shut_down(&mut self, status: Status, message: &str) {
        self.status = status;
        let ids: Vec<ClientId> = self.clients.iter().map(|c| c.id).collect();
        for id in ids {
            self.kick(id, message);
        }
        if let Err(err) = self.level.dispose_all() {
            log::error!("Failed to dispose level: {err}");
        }
        self.forward_events();
    }
}

impl ExecutionContext for Server {
    fn permission_level(&self) -> Option<u32> {
        self.caller
            .and_then(|id| self.client(id))
            .and_then(|c| c.permission_level)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("status", &self.status)
            .field("clients", &self.clients.len())
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpsEntry;
    use crate::ecs::component::CopyData;
    use crate::ecs::registry::{EntityWith, RegistryBuilder};

    struct Offline;

    impl AccountDirectory for Offline {
        fn by_token(&self, _: &str) -> anyhow::Result<Option<Account>> {
            anyhow::bail!("identity service unreachable")
        }
        fn by_username(&self, _: &str) -> anyhow::Result<Option<Account>> {
            anyhow::bail!("identity service unreachable")
        }
    }

    fn account(name: &str) -> Account {
        Account {
            id: Uuid::new_v4(),
            username: name.into(),
            is_disabled: false,
        }
    }

    fn level() -> Level {
        let mut reg = RegistryBuilder::new();
        reg.register_component::<CopyData>().unwrap();
        reg.entity_with(EntityWith {
            name: "Ship".into(),
            components: vec!["CopyData".into()],
            config: serde_json::json!({ "copy_data": ["cargo"] }),
        })
        .unwrap();
        reg.set_loading_order(["Ship"]);
        Level::new(reg.build().unwrap())
    }

    fn server_with(config: ServerConfig, access: AccessLists, accounts: &[&Account]) -> Server {
        let mut directory = StaticAccounts::new();
        for a in accounts {
            directory.insert(format!("token-{}", a.username), (*a).clone());
        }
        Server::new(config, access, level(), Box::new(directory)).unwrap()
    }

    #[test]
    fn join_broadcasts_chat_and_player_list() {
        let alice = account("alice");
        let mut server = server_with(ServerConfig::default(), AccessLists::default(), &[&alice]);
        let id = server.connect("token-alice").unwrap();
        assert_eq!(server.client(id).unwrap().name, "alice");

        let out = server.drain_outgoing();
        assert_eq!(out[0].message, Outgoing::Chat("alice joined".into()));
        assert_eq!(out[1].message, Outgoing::PlayerList(vec!["alice".into()]));
        assert!(server.drain_outgoing().is_empty());
    }

    #[test]
    fn admission_rejections() {
        let alice = account("alice");
        let mut disabled = account("dora");
        disabled.is_disabled = true;
        let banned = account("bob");

        let mut access = AccessLists::default();
        access.blacklist.insert(banned.id);
        let mut server = server_with(ServerConfig::default(), access, &[&alice, &disabled, &banned]);

        assert_eq!(server.connect("nope"), Err(Rejected::InvalidAccount));
        assert_eq!(server.connect("token-bob"), Err(Rejected::Banned));
        assert_eq!(server.connect("token-dora"), Err(Rejected::Disabled));
        server.connect("token-alice").unwrap();
        assert_eq!(server.connect("token-alice"), Err(Rejected::AlreadyConnected));

        server.stop();
        assert_eq!(server.connect("token-alice"), Err(Rejected::Stopping));
    }

    #[test]
    fn whitelist_and_failed_lookup() {
        let alice = account("alice");
        let config = ServerConfig {
            whitelist: true,
            ..ServerConfig::default()
        };
        let mut server = server_with(config, AccessLists::default(), &[&alice]);
        assert_eq!(server.connect("token-alice"), Err(Rejected::NotWhitelisted));

        let mut offline = Server::new(
            ServerConfig::default(),
            AccessLists::default(),
            level(),
            Box::new(Offline),
        )
        .unwrap();
        assert_eq!(offline.connect("token-alice"), Err(Rejected::AuthFailed));
    }

    #[test]
    fn full_server_admits_ops_with_bypass() {
        let alice = account("alice");
        let bob = account("bob");
        let op = account("root");
        let mut access = AccessLists::default();
        access.ops.push(OpsEntry {
            id: op.id,
            bypass_limit: true,
            oplvl: 4,
        });
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let mut server = server_with(config, access, &[&alice, &bob, &op]);

        server.connect("token-alice").unwrap();
        assert_eq!(server.connect("token-bob"), Err(Rejected::Full));
        let root = server.connect("token-root").unwrap();
        assert_eq!(server.client(root).unwrap().permission_level, Some(4));
    }

    #[test]
    fn flooding_client_is_kicked() {
        let alice = account("alice");
        let bob = account("bob");
        let mut server = server_with(ServerConfig::default(), AccessLists::default(), &[&alice, &bob]);
        let a = server.connect("token-alice").unwrap();
        let b = server.connect("token-bob").unwrap();
        for _ in 0..51 {
            server.receive(a, Incoming::Chat("spam".into()));
        }
        for _ in 0..50 {
            server.receive(b, Incoming::Chat("hi".into()));
        }
        server.drain_outgoing();

        server.check_packet_rates();
        assert!(server.client(a).is_none());
        assert_eq!(server.client(b).unwrap().sent_packets, 0);

        let out = server.drain_outgoing();
        assert_eq!(
            out[0],
            Envelope {
                to: Recipient::Client(a),
                message: Outgoing::Kick("Sending to many packets".into()),
            }
        );
        assert_eq!(out[1].message, Outgoing::Chat("alice left".into()));
        assert_eq!(out[2].message, Outgoing::PlayerList(vec!["bob".into()]));
    }

    #[test]
    fn chat_and_command_replies() {
        let alice = account("alice");
        let mut server = server_with(ServerConfig::default(), AccessLists::default(), &[&alice]);
        let a = server.connect("token-alice").unwrap();
        server.drain_outgoing();

        server.receive(a, Incoming::Chat("hello".into()));
        server.receive(a, Incoming::Command("save".into()));
        let out = server.drain_outgoing();
        assert_eq!(out[0].to, Recipient::All);
        assert_eq!(out[0].message, Outgoing::Chat("alice: hello".into()));
        assert_eq!(out[1].to, Recipient::Client(a));
        assert_eq!(
            out[1].message,
            Outgoing::Chat(crate::command::PERMISSION_DENIED.into())
        );
    }

    #[test]
    fn level_events_are_forwarded() {
        let mut server = server_with(ServerConfig::default(), AccessLists::default(), &[]);
        server.level_mut().spawn_ready("Ship").unwrap();
        server.tick().unwrap();
        let names: Vec<&str> = server
            .drain_outgoing()
            .into_iter()
            .filter_map(|e| match e.message {
                Outgoing::Event { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["entity_added", "tick"]);
    }

    #[test]
    fn stop_kicks_everyone_and_empties_level() {
        let alice = account("alice");
        let mut server = server_with(ServerConfig::default(), AccessLists::default(), &[&alice]);
        let a = server.connect("token-alice").unwrap();
        server.level_mut().spawn_ready("Ship").unwrap();
        server.drain_outgoing();

        server.restart();
        assert_eq!(server.status(), Status::Restarting);
        assert!(server.level().is_empty());
        let out = server.drain_outgoing();
        assert_eq!(out[0].to, Recipient::Client(a));
        assert_eq!(out[0].message, Outgoing::Kick("Server restarting".into()));
        assert!(out.iter().any(|e| matches!(
            e.message,
            Outgoing::Event { name: "entity_removed", .. }
        )));
    }
}
