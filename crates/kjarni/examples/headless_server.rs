//! Headless Server: host a level with no transport, driven from stdin.
//!
//! Every line typed on stdin runs as a console command (`save`, `stop`,
//! `debug:list_entities true`, ...). Lines starting with `>` are sent as a
//! demo player instead, e.g. `>msg console hello` or `>hello everyone`.
//!
//! Reads `server.toml` (or the path given as the first argument), plus
//! `whitelist.json`, `blacklist.json`, and `ops.json` from the working
//! directory. All of them are optional.
//!
//! Run with: `cargo run -p kjarni --example headless_server`
//! and in a second terminal: `cargo run -p kjarni-telemetry`

use std::io::BufRead;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Context;
use kjarni::prelude::*;
use kjarni::server::{ClientId, Envelope, Recipient, StaticAccounts, Status};
use serde_json::json;
use uuid::Uuid;

fn make_registry() -> kjarni::Result<Arc<Registry>> {
    let mut reg = RegistryBuilder::new();
    reg.register_component::<CopyData>()?;
    reg.entity_with(EntityWith {
        name: "Station".into(),
        components: vec!["CopyData".into()],
        config: json!({ "copy_data": { "docks": 4 } }),
    })?;
    reg.register_entity(
        EntityType::builder("Drone")
            .config("copy_data", json!({ "heading": 0.0 }))
            .with::<CopyData>()
            .on_tick(|drone, _ctx| {
                let core = drone.core_mut();
                core.rotation.y += 0.05;
                core.position += Vec3::new(core.rotation.y.cos(), 0.0, core.rotation.y.sin()) * 0.1;
                Ok(())
            }),
    )?;
    reg.set_loading_order(["Station", "Drone"]);
    reg.build()
}

fn load_level(registry: Arc<Registry>, config: &ServerConfig) -> anyhow::Result<Level> {
    if config.save_path.is_file() {
        log::info!("Loading level from {}", config.save_path.display());
        return Level::load_from_file(registry, &config.save_path)
            .with_context(|| format!("load {}", config.save_path.display()));
    }

    log::info!("No level detected. Generating...");
    let mut level = Level::new(registry);
    level.name = "Headless".into();
    let station = level.spawn_ready("Station")?;
    for _ in 0..3 {
        let drone = level.spawn_ready("Drone")?;
        level.set_parent(drone, Some(station))?;
    }
    Ok(level)
}

fn print_outgoing(envelopes: Vec<Envelope>, demo: Option<ClientId>) {
    for Envelope { to, message } in envelopes {
        let visible = match to {
            Recipient::All => true,
            Recipient::Client(id) => Some(id) == demo,
        };
        if !visible {
            continue;
        }
        match message {
            Outgoing::Chat(text) => println!("[chat] {text}"),
            Outgoing::Kick(reason) => println!("[kick] {reason}"),
            Outgoing::PlayerList(names) => println!("[players] {}", names.join(", ")),
            // Events would flood the console at 60 Hz.
            Outgoing::Event { .. } => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "diagnostics")]
    kjarni::diag::init_logger();
    #[cfg(not(feature = "diagnostics"))]
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "server.toml".into());
    let config = ServerConfig::load(&config_path)?;
    let access = AccessLists::load_dir(".")?;
    let level = load_level(make_registry()?, &config)?;

    let mut accounts = StaticAccounts::new();
    accounts.insert(
        "demo-token",
        Account {
            id: Uuid::new_v4(),
            username: "demo".into(),
            is_disabled: false,
        },
    );

    let tick_rate = config.tick_rate;
    let mut server = Server::new(config, access, level, Box::new(accounts))?;
    let demo = match server.connect("demo-token") {
        Ok(id) => Some(id),
        Err(reason) => {
            log::warn!("Demo client rejected: {reason}");
            None
        }
    };

    #[cfg(feature = "diagnostics")]
    let mut diag = kjarni::diag::DiagSender::new(server.level_mut());

    // Stdin is read on its own thread; the level stays on this one.
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut ticker = Ticker::from_rate(tick_rate);
    let mut rate_check = Ticker::starting_at(Duration::from_secs(1), Instant::now() + Duration::from_secs(1));
    log::info!("Server running at {tick_rate} ticks per second");

    while server.is_running() {
        ticker.wait();

        while let Ok(line) = rx.try_recv() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match (line.strip_prefix('>'), demo) {
                (Some(text), Some(id)) => {
                    let packet = match text.split_whitespace().next() {
                        Some(first) if server.commands().get(first).is_some() => {
                            Incoming::Command(text.to_string())
                        }
                        _ => Incoming::Chat(text.to_string()),
                    };
                    server.receive(id, packet);
                }
                _ => {
                    if let Some(reply) = server.exec_command(None, line) {
                        println!("{reply}");
                    }
                }
            }
        }

        if let Err(err) = server.tick() {
            log::error!("Tick failed: {err}");
        }
        if rate_check.poll(Instant::now()) {
            server.check_packet_rates();
        }

        #[cfg(feature = "diagnostics")]
        if let Some(diag) = diag.as_mut() {
            diag.send(server.level(), server.clients().count());
        }

        print_outgoing(server.drain_outgoing(), demo);
    }

    if server.status() == Status::Restarting {
        log::info!("Restart requested; start the server again to continue");
    }
    Ok(())
}
