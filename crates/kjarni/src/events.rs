//! Level events and the bus that delivers them.
//!
//! Listeners run synchronously inside [`EventBus::emit`]. A transport that
//! lives elsewhere (another thread, a socket loop) can [`subscribe`](EventBus::subscribe)
//! instead and drain an `mpsc` receiver at its own pace.

use std::sync::mpsc::{self, Receiver, Sender};

use serde_json::Value;
use uuid::Uuid;

use crate::ecs::entity::EntityJson;
use crate::math::Vec3;

/// Names of every event a level can emit, in declaration order.
pub const LEVEL_EVENT_NAMES: [&str; 5] = [
    "entity_added",
    "entity_removed",
    "entity_death",
    "entity_path_start",
    "tick",
];

#[derive(Debug, Clone, PartialEq)]
pub enum LevelEvent {
    EntityAdded(EntityJson),
    EntityRemoved(EntityJson),
    EntityDeath(EntityJson),
    EntityPathStart { id: Uuid, path: Vec<Vec3> },
    Tick,
}

impl LevelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LevelEvent::EntityAdded(_) => "entity_added",
            LevelEvent::EntityRemoved(_) => "entity_removed",
            LevelEvent::EntityDeath(_) => "entity_death",
            LevelEvent::EntityPathStart { .. } => "entity_path_start",
            LevelEvent::Tick => "tick",
        }
    }

    /// Positional arguments as forwarded to clients.
    pub fn args(&self) -> Vec<Value> {
        match self {
            LevelEvent::EntityAdded(json)
            | LevelEvent::EntityRemoved(json)
            | LevelEvent::EntityDeath(json) => {
                vec![serde_json::to_value(json).unwrap_or(Value::Null)]
            }
            LevelEvent::EntityPathStart { id, path } => vec![
                Value::String(id.to_string()),
                Value::Array(
                    path.iter()
                        .map(|p| serde_json::json!({ "x": p.x, "y": p.y, "z": p.z }))
                        .collect(),
                ),
            ],
            LevelEvent::Tick => Vec::new(),
        }
    }
}

pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&LevelEvent) + Send>;

struct Registered {
    id: ListenerId,
    filter: Option<&'static str>,
    listener: Listener,
}

/// Synchronous listeners plus channel subscribers.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Registered>,
    subscribers: Vec<Sender<LevelEvent>>,
    next_id: ListenerId,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to every event.
    pub fn on<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&LevelEvent) + Send + 'static,
    {
        self.add(None, Box::new(listener))
    }

    /// Listen to one event by name. Unknown names are rejected.
    pub fn on_event<F>(&mut self, name: &str, listener: F) -> Option<ListenerId>
    where
        F: FnMut(&LevelEvent) + Send + 'static,
    {
        let name = LEVEL_EVENT_NAMES.iter().copied().find(|n| *n == name)?;
        Some(self.add(Some(name), Box::new(listener)))
    }

    fn add(&mut self, filter: Option<&'static str>, listener: Listener) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push(Registered {
            id,
            filter,
            listener,
        });
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// A channel that receives a clone of every event from now on.
    pub fn subscribe(&mut self) -> Receiver<LevelEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn emit(&mut self, event: &LevelEvent) {
        let name = event.name();
        for registered in &mut self.listeners {
            if registered.filter.is_none_or(|f| f == name) {
                (registered.listener)(event);
            }
        }
        // Drop subscribers whose receiver is gone.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len() + self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn names_match_table() {
        let events = [
            LevelEvent::Tick,
            LevelEvent::EntityPathStart {
                id: Uuid::nil(),
                path: vec![],
            },
        ];
        for event in &events {
            assert!(LEVEL_EVENT_NAMES.contains(&event.name()));
        }
        assert!(LevelEvent::Tick.args().is_empty());
    }

    #[test]
    fn path_start_args() {
        let id = Uuid::new_v4();
        let args = LevelEvent::EntityPathStart {
            id,
            path: vec![Vec3::new(1.0, 2.0, 3.0)],
        }
        .args();
        assert_eq!(args[0], Value::String(id.to_string()));
        assert_eq!(args[1], serde_json::json!([{ "x": 1.0, "y": 2.0, "z": 3.0 }]));
    }

    #[test]
    fn filtered_listeners_and_off() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let all = {
            let seen = Arc::clone(&seen);
            bus.on(move |e| seen.lock().unwrap().push(format!("all:{}", e.name())))
        };
        {
            let seen = Arc::clone(&seen);
            bus.on_event("tick", move |e| seen.lock().unwrap().push(format!("tick:{}", e.name())))
                .unwrap();
        }
        assert!(bus.on_event("explode", |_| {}).is_none());

        bus.emit(&LevelEvent::Tick);
        assert!(bus.off(all));
        assert!(!bus.off(all));
        bus.emit(&LevelEvent::Tick);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["all:tick", "tick:tick", "tick:tick"]
        );
    }

    #[test]
    fn subscribers_are_pruned_when_dropped() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        bus.emit(&LevelEvent::Tick);
        assert_eq!(rx.try_recv().unwrap(), LevelEvent::Tick);
        drop(rx);
        bus.emit(&LevelEvent::Tick);
        assert_eq!(bus.listener_count(), 0);
    }
}
