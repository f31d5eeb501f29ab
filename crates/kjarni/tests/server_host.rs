use std::sync::Arc;

use kjarni::command::PERMISSION_DENIED;
use kjarni::config::OpsEntry;
use kjarni::prelude::*;
use kjarni::server::{ClientId, Envelope, Recipient, Rejected, StaticAccounts, Status};
use serde_json::json;
use uuid::Uuid;

struct Session {
    server: Server,
    accounts: Vec<(String, Uuid)>,
    _dir: tempfile::TempDir,
}

fn registry() -> Arc<Registry> {
    let mut reg = RegistryBuilder::new();
    reg.register_component::<CopyData>().unwrap();
    reg.register_entity(
        EntityType::builder("Beacon")
            .with::<CopyData>()
            .config("copy_data", json!({ "signal": 1 })),
    )
    .unwrap();
    reg.set_loading_order(["Beacon"]);
    reg.build().unwrap()
}

/// A server with `admin` (op level 4, may exceed the client limit) plus
/// `alice`, `bob` and `carol`. Each account's token is its name.
fn session(config: impl FnOnce(&mut ServerConfig)) -> Session {
    let dir = tempfile::tempdir().unwrap();
    let mut accounts = StaticAccounts::new();
    let mut ids = Vec::new();
    for name in ["admin", "alice", "bob", "carol"] {
        let id = Uuid::new_v4();
        accounts.insert(
            name,
            Account {
                id,
                username: name.into(),
                is_disabled: false,
            },
        );
        ids.push((name.to_string(), id));
    }

    let mut access = AccessLists::default();
    access.ops.push(OpsEntry {
        id: ids[0].1,
        bypass_limit: true,
        oplvl: 4,
    });

    let mut cfg = ServerConfig {
        save_path: dir.path().join("level.json"),
        ..ServerConfig::default()
    };
    config(&mut cfg);

    let mut level = Level::new(registry());
    level.spawn_ready("Beacon").unwrap();
    let server = Server::new(cfg, access, level, Box::new(accounts)).unwrap();
    Session {
        server,
        accounts: ids,
        _dir: dir,
    }
}

impl Session {
    fn account(&self, name: &str) -> Uuid {
        self.accounts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .unwrap()
    }
}

fn chats_to(envelopes: &[Envelope], id: ClientId) -> Vec<String> {
    envelopes
        .iter()
        .filter(|e| matches!(e.to, Recipient::Client(to) if to == id))
        .filter_map(|e| match &e.message {
            Outgoing::Chat(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn kicks_to(envelopes: &[Envelope], id: ClientId) -> Vec<String> {
    envelopes
        .iter()
        .filter(|e| matches!(e.to, Recipient::Client(to) if to == id))
        .filter_map(|e| match &e.message {
            Outgoing::Kick(reason) => Some(reason.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn players_chat_and_message_each_other() {
    let mut s = session(|_| {});
    let alice = s.server.connect("alice").unwrap();
    let bob = s.server.connect("bob").unwrap();
    s.server.drain_outgoing();

    s.server.receive(alice, Incoming::Chat("anyone near the beacon?".into()));
    s.server
        .receive(bob, Incoming::Command("msg alice on my way".into()));
    s.server.receive(alice, Incoming::Command("reply thanks".into()));

    let out = s.server.drain_outgoing();
    assert!(out.iter().any(|e| e.to == Recipient::All
        && e.message == Outgoing::Chat("alice: anyone near the beacon?".into())));
    assert_eq!(
        chats_to(&out, alice),
        vec!["[bob -> me] on my way", "[me -> bob] thanks"]
    );
    assert_eq!(
        chats_to(&out, bob),
        vec!["[me -> alice] on my way", "[alice -> me] thanks"]
    );
}

#[test]
fn ops_moderate_and_players_cannot() {
    let mut s = session(|_| {});
    let admin = s.server.connect("admin").unwrap();
    let alice = s.server.connect("alice").unwrap();
    let bob = s.server.connect("bob").unwrap();
    s.server.drain_outgoing();

    s.server.receive(alice, Incoming::Command("kick bob".into()));
    assert!(s.server.client(bob).is_some());
    assert_eq!(
        chats_to(&s.server.drain_outgoing(), alice),
        vec![PERMISSION_DENIED]
    );

    s.server
        .receive(admin, Incoming::Command("ban bob griefing".into()));
    let out = s.server.drain_outgoing();
    assert_eq!(
        kicks_to(&out, bob),
        vec!["You have been banned from this server: griefing"]
    );
    assert!(s.server.client(bob).is_none());
    assert!(s.server.access().blacklist.contains(&s.account("bob")));
    assert_eq!(s.server.connect("bob"), Err(Rejected::Banned));

    assert_eq!(
        s.server.exec_command(None, "unban bob"),
        Some("Unbanned bob".into())
    );
    assert!(s.server.connect("bob").is_ok());
}

#[test]
fn admission_follows_lists_and_limits() {
    let mut s = session(|cfg| {
        cfg.whitelist = true;
        cfg.max_clients = 2;
    });
    let ids = [s.account("admin"), s.account("alice"), s.account("bob")];
    s.server.access_mut().whitelist.extend(ids);

    assert_eq!(s.server.connect("nobody"), Err(Rejected::InvalidAccount));
    assert_eq!(s.server.connect("carol"), Err(Rejected::NotWhitelisted));
    let alice = s.server.connect("alice").unwrap();
    assert_eq!(s.server.connect("alice"), Err(Rejected::AlreadyConnected));
    s.server.connect("bob").unwrap();

    let carol = s.account("carol");
    s.server.access_mut().whitelist.insert(carol);
    assert_eq!(s.server.connect("carol"), Err(Rejected::Full));
    // Ops with bypassLimit get in regardless.
    assert!(s.server.connect("admin").is_ok());

    s.server.disconnect(alice, "transport close");
    assert_eq!(s.server.player_list(), vec!["bob", "admin"]);
}

#[test]
fn flooding_client_is_kicked_on_rate_check() {
    let mut s = session(|_| {});
    let alice = s.server.connect("alice").unwrap();
    let bob = s.server.connect("bob").unwrap();

    for _ in 0..51 {
        s.server.receive(alice, Incoming::Chat("spam".into()));
    }
    for _ in 0..50 {
        s.server.receive(bob, Incoming::Chat("busy".into()));
    }
    s.server.drain_outgoing();
    s.server.check_packet_rates();

    assert!(s.server.client(alice).is_none());
    assert!(s.server.client(bob).is_some());
    assert_eq!(
        kicks_to(&s.server.drain_outgoing(), alice),
        vec!["Sending to many packets"]
    );
    assert_eq!(s.server.client(bob).map(|c| c.sent_packets), Some(0));
}

#[test]
fn level_events_reach_clients_and_saves_restore() {
    let mut s = session(|_| {});
    let alice = s.server.connect("alice").unwrap();
    s.server.drain_outgoing();

    s.server.tick().unwrap();
    let events: Vec<&str> = s
        .server
        .drain_outgoing()
        .iter()
        .filter_map(|e| match e.message {
            Outgoing::Event { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(events, vec!["tick"]);

    s.server.receive(alice, Incoming::Command("save".into()));
    assert_eq!(
        chats_to(&s.server.drain_outgoing(), alice),
        vec![PERMISSION_DENIED]
    );
    assert_eq!(
        s.server.exec_command(None, "save"),
        Some("Saved the current level".into())
    );

    let restored = Level::load_from_file(registry(), &s.server.config().save_path).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.id, s.server.level().id);
}

#[test]
fn stop_from_console_shuts_everything_down() {
    let mut s = session(|_| {});
    let alice = s.server.connect("alice").unwrap();
    s.server.drain_outgoing();

    assert_eq!(s.server.exec_command(None, "stop"), None);
    assert_eq!(s.server.status(), Status::Stopping);
    assert!(!s.server.is_running());
    assert!(s.server.level().is_empty());
    assert_eq!(s.server.clients().count(), 0);

    let out = s.server.drain_outgoing();
    assert_eq!(kicks_to(&out, alice), vec!["Server shutting down"]);
    assert!(out
        .iter()
        .any(|e| matches!(e.message, Outgoing::Event { name: "entity_removed", .. })));
    assert_eq!(s.server.connect("bob"), Err(Rejected::Stopping));
}
