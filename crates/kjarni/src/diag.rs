//! Diagnostics sender. Ships level metrics to `kjarni-telemetry` over UDP.
//!
//! Enabled by the `diagnostics` feature flag. The host creates a
//! [`DiagSender`] next to its level and calls [`DiagSender::send`] after
//! every tick; sends are throttled to 10 Hz. Each datagram is one JSON
//! snapshot sent to `127.0.0.1:9100`.
//!
//! A second socket on port 9101 receives inspection requests from the TUI
//! (the entity types whose entities should be listed in full).

use std::collections::{BTreeMap, VecDeque};
use std::net::UdpSocket;
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::events::{LevelEvent, LEVEL_EVENT_NAMES};
use crate::level::Level;

pub const METRICS_ADDR: &str = "127.0.0.1:9100";
pub const REQUEST_ADDR: &str = "127.0.0.1:9101";

const SEND_INTERVAL: Duration = Duration::from_millis(100);
const RECENT_EVENTS: usize = 20;
const LOG_CAPACITY: usize = 500;
const LOGS_PER_SEND: usize = 50;

// ── DiagSender ───────────────────────────────────────────────────────────

pub struct DiagSender {
    /// Outbound metrics (level → TUI).
    socket: UdpSocket,
    /// Inbound inspection requests (TUI → level).
    request_socket: UdpSocket,
    last_send: Instant,
    /// Entity types whose entities are listed in full.
    expanded_types: Vec<String>,
    events: Receiver<LevelEvent>,
    event_counts: BTreeMap<&'static str, u64>,
    recent_events: VecDeque<String>,
}

impl DiagSender {
    /// Bind the sockets and subscribe to the level's events. Returns `None`
    /// if either socket cannot be set up (e.g. another server owns 9101).
    pub fn new(level: &mut Level) -> Option<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").ok()?;
        socket.connect(METRICS_ADDR).ok()?;
        socket.set_nonblocking(true).ok()?;

        let request_socket = UdpSocket::bind(REQUEST_ADDR).ok()?;
        request_socket.set_nonblocking(true).ok()?;

        Some(Self {
            socket,
            request_socket,
            // Send on the first call.
            last_send: Instant::now() - SEND_INTERVAL,
            expanded_types: Vec::new(),
            events: level.events_mut().subscribe(),
            event_counts: LEVEL_EVENT_NAMES.iter().map(|n| (*n, 0)).collect(),
            recent_events: VecDeque::with_capacity(RECENT_EVENTS),
        })
    }

    fn process_requests(&mut self) {
        let mut buf = [0u8; 4096];
        while let Ok(n) = self.request_socket.recv(&mut buf) {
            if let Ok(req) = serde_json::from_slice::<InspectRequest>(&buf[..n]) {
                self.expanded_types = req.expanded_types;
            }
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            *self.event_counts.entry(event.name()).or_insert(0) += 1;
            if matches!(event, LevelEvent::Tick) {
                continue;
            }
            if self.recent_events.len() == RECENT_EVENTS {
                self.recent_events.pop_front();
            }
            self.recent_events.push_back(describe_event(&event));
        }
    }

    /// Call once per tick. `clients` is the connected client count.
    pub fn send(&mut self, level: &Level, clients: usize) {
        self.process_requests();
        self.drain_events();

        let now = Instant::now();
        if now.duration_since(self.last_send) < SEND_INTERVAL {
            return;
        }
        self.last_send = now;

        let mut snapshot = level_snapshot(level, &self.expanded_types);
        snapshot.client_count = clients;
        snapshot.events = self
            .event_counts
            .iter()
            .map(|(name, count)| EventCount {
                name: name.to_string(),
                count: *count,
            })
            .collect();
        snapshot.recent_events = self.recent_events.iter().cloned().collect();
        snapshot.logs = drain_captured_logs(LOGS_PER_SEND);

        // Fire and forget.
        if let Ok(json) = serde_json::to_vec(&snapshot) {
            let _ = self.socket.send(&json);
        }
    }
}

/// An inspection request from the TUI.
#[derive(Debug, Serialize, Deserialize)]
pub struct InspectRequest {
    pub expanded_types: Vec<String>,
}

fn describe_event(event: &LevelEvent) -> String {
    match event {
        LevelEvent::EntityAdded(json)
        | LevelEvent::EntityRemoved(json)
        | LevelEvent::EntityDeath(json) => {
            format!("{} {} {}", event.name(), json.entity_type, json.id)
        }
        LevelEvent::EntityPathStart { id, path } => {
            format!("{} {id} ({} points)", event.name(), path.len())
        }
        LevelEvent::Tick => event.name().to_string(),
    }
}

// ── Snapshot types (wire format) ────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
pub struct DiagSnapshot {
    pub tps: f32,
    pub delta_ms: f32,
    pub tick_count: u64,
    pub elapsed_secs: f32,
    pub level_name: String,
    pub level_id: String,
    pub entity_count: usize,
    pub client_count: usize,
    pub entity_types: Vec<EntityTypeInfo>,
    pub events: Vec<EventCount>,
    pub recent_events: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntrySnapshot>,
}

#[derive(Debug, Serialize)]
pub struct EntityTypeInfo {
    pub name: String,
    pub count: usize,
    pub components: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntityInfo>>,
}

#[derive(Debug, Serialize)]
pub struct EntityInfo {
    pub id: String,
    pub name: String,
    pub state: String,
    /// Multi-line `Display` text of the entity.
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct EventCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct LogEntrySnapshot {
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp_secs: f32,
}

/// Timing and per-type entity stats. Types named in `expanded` list their
/// entities in full.
pub fn level_snapshot(level: &Level, expanded: &[String]) -> DiagSnapshot {
    let monitor = level.monitor();
    let counts = level.count_by_type();
    let entity_types = level
        .registry()
        .entities()
        .iter()
        .map(|ty| {
            let entities = expanded.iter().any(|e| e == ty.name()).then(|| {
                level
                    .entities()
                    .filter(|e| e.type_name() == ty.name())
                    .map(|e| EntityInfo {
                        id: e.id().to_string(),
                        name: e.name().to_string(),
                        state: e.state().as_str().to_string(),
                        description: e.to_string(),
                    })
                    .collect()
            });
            EntityTypeInfo {
                name: ty.name().to_string(),
                count: counts.get(ty.name()).copied().unwrap_or(0),
                components: ty.component_names().map(str::to_string).collect(),
                entities,
            }
        })
        .collect();

    DiagSnapshot {
        tps: monitor.tps(),
        delta_ms: monitor.delta().as_secs_f32() * 1000.0,
        tick_count: monitor.tick_count(),
        elapsed_secs: monitor.elapsed().as_secs_f32(),
        level_name: level.name.clone(),
        level_id: level.id.to_string(),
        entity_count: level.len(),
        entity_types,
        ..DiagSnapshot::default()
    }
}

// ── Log Capture ──────────────────────────────────────────────────────────

struct CapturedLog {
    level: log::Level,
    target: String,
    message: String,
    timestamp_secs: f32,
}

/// Ring buffer of captured log lines.
struct LogRing {
    entries: VecDeque<CapturedLog>,
    capacity: usize,
}

impl LogRing {
    const fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    fn push(&mut self, entry: CapturedLog) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn drain(&mut self, max: usize) -> Vec<CapturedLog> {
        let n = self.entries.len().min(max);
        self.entries.drain(..n).collect()
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new(LOG_CAPACITY));
static LOG_START: OnceLock<Instant> = OnceLock::new();
static DIAG_LOGGER: OnceLock<DiagLogger> = OnceLock::new();

/// Captures records into the ring buffer and delegates to env_logger for
/// stderr output.
struct DiagLogger {
    inner: env_logger::Logger,
}

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }

        let entry = CapturedLog {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp_secs: LOG_START
                .get()
                .map_or(0.0, |start| start.elapsed().as_secs_f32()),
        };
        if let Ok(mut ring) = LOG_RING.lock() {
            ring.push(entry);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the capturing logger. Info and above are always captured;
/// `RUST_LOG` controls what reaches stderr.
///
/// Call this before anything logs.
pub fn init_logger() {
    LOG_START.get_or_init(Instant::now);

    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = DIAG_LOGGER.get_or_init(|| DiagLogger { inner });

    if log::set_logger(logger).is_err() {
        eprintln!("[kjarni] Warning: a logger is already set. Log capture disabled.");
        return;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
}

/// Drain up to `max` captured log lines.
pub fn drain_captured_logs(max: usize) -> Vec<LogEntrySnapshot> {
    let Ok(mut ring) = LOG_RING.lock() else {
        return Vec::new();
    };
    ring.drain(max)
        .into_iter()
        .map(|e| LogEntrySnapshot {
            level: e.level.to_string(),
            target: e.target,
            message: e.message,
            timestamp_secs: e.timestamp_secs,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::CopyData;
    use crate::ecs::registry::{EntityType, RegistryBuilder};

    fn captured(message: &str) -> CapturedLog {
        CapturedLog {
            level: log::Level::Info,
            target: "test".into(),
            message: message.into(),
            timestamp_secs: 0.0,
        }
    }

    #[test]
    fn log_ring_drops_oldest() {
        let mut ring = LogRing::new(3);
        for m in ["a", "b", "c", "d"] {
            ring.push(captured(m));
        }
        let drained: Vec<String> = ring.drain(2).into_iter().map(|e| e.message).collect();
        assert_eq!(drained, vec!["b", "c"]);
        assert_eq!(ring.drain(10).len(), 1);
    }

    #[test]
    fn snapshot_counts_and_expands() {
        let mut reg = RegistryBuilder::new();
        reg.register_component::<CopyData>().unwrap();
        reg.register_entity(
            EntityType::builder("Ship")
                .with::<CopyData>()
                .config("copy_data", serde_json::json!(["cargo"])),
        )
        .unwrap();
        reg.entity_with_components("Station", Vec::<String>::new())
            .unwrap();
        let mut level = Level::new(reg.build().unwrap());
        level.name = "Sector 7".into();
        level.spawn_ready("Ship").unwrap();
        level.spawn_ready("Ship").unwrap();

        let snapshot = level_snapshot(&level, &["Ship".to_string()]);
        assert_eq!(snapshot.level_name, "Sector 7");
        assert_eq!(snapshot.entity_count, 2);

        let ship = &snapshot.entity_types[0];
        assert_eq!(ship.name, "Ship");
        assert_eq!(ship.count, 2);
        assert_eq!(ship.components, vec!["CopyData"]);
        assert_eq!(ship.entities.as_ref().map(Vec::len), Some(2));

        let station = &snapshot.entity_types[1];
        assert_eq!(station.count, 0);
        assert!(station.entities.is_none());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("logs").is_none());
    }

    #[test]
    fn describe_events() {
        let id = uuid::Uuid::nil();
        let event = LevelEvent::EntityPathStart { id, path: vec![] };
        assert_eq!(
            describe_event(&event),
            format!("entity_path_start {id} (0 points)")
        );
    }
}
