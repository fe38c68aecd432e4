//! A fake theater: entities walk in, browse, leave, and sometimes vanish
//! without a release event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;
use viewer_pool::{EntityDirectory, EntityId, EntityState, Identifier, Simulation};

/// Hook points the theater fires, routed to the lifecycle handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TheaterEvent {
    Created(EntityId),
    BecameInteractive(EntityId),
    Left(EntityId),
}

const ENTERING: &str = "entering";
const BROWSING: &str = "browsing";
const LEAVING: &str = "leaving";

/// Per-step transition odds, in percent.
const SETTLE_CHANCE: u32 = 40;
const LEAVE_CHANCE: u32 = 5;
const EXIT_CHANCE: u32 = 50;
const VANISH_CHANCE: u32 = 1;

pub struct Theater {
    entities: DashMap<EntityId, EntityState>,
    labels: DashMap<EntityId, String>,
    next_id: AtomicU64,
    capacity: usize,
    events: mpsc::UnboundedSender<TheaterEvent>,
}

impl Theater {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<TheaterEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let theater = Arc::new(Self {
            entities: DashMap::new(),
            labels: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity,
            events,
        });
        (theater, rx)
    }

    fn emit(&self, event: TheaterEvent) {
        // Receiver gone means the host is shutting down.
        let _ = self.events.send(event);
    }

    pub fn population(&self) -> usize {
        self.entities.len()
    }

    pub fn label(&self, entity: EntityId) -> Option<String> {
        self.labels.get(&entity).map(|r| r.value().clone())
    }

    /// Create an entity if there is room, the way a natural walk-in does.
    pub fn walk_in(&self) -> Option<EntityId> {
        if self.entities.len() >= self.capacity {
            return None;
        }
        let entity = EntityId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entities.insert(entity, EntityState::new(ENTERING));
        self.emit(TheaterEvent::Created(entity));
        Some(entity)
    }

    fn remove(&self, entity: EntityId) {
        self.entities.remove(&entity);
        self.labels.remove(&entity);
    }

    /// Advance every entity one step.
    pub fn step(&self) {
        let snapshot: Vec<(EntityId, EntityState)> = self
            .entities
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();

        let mut rng = rand::rng();
        for (entity, state) in snapshot {
            if rng.random_range(0..100) < VANISH_CHANCE {
                tracing::debug!(entity = %entity, "Entity vanished without a release event");
                self.remove(entity);
                continue;
            }

            let roll = rng.random_range(0..100);
            match state.as_str() {
                ENTERING if roll < SETTLE_CHANCE => {
                    self.entities.insert(entity, EntityState::new(BROWSING));
                    self.emit(TheaterEvent::BecameInteractive(entity));
                }
                BROWSING if roll < LEAVE_CHANCE => {
                    self.entities.insert(entity, EntityState::new(LEAVING));
                }
                LEAVING if roll < EXIT_CHANCE => {
                    self.remove(entity);
                    self.emit(TheaterEvent::Left(entity));
                }
                _ => {}
            }
        }
    }
}

impl EntityDirectory for Theater {
    fn live_entities(&self) -> Vec<EntityId> {
        self.entities.iter().map(|r| *r.key()).collect()
    }

    fn is_live(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    fn current_state(&self, entity: EntityId) -> Option<EntityState> {
        self.entities.get(&entity).map(|r| r.value().clone())
    }
}

impl Simulation for Theater {
    fn spawn_entity(&self) -> Option<EntityId> {
        self.walk_in()
    }

    fn on_assigned(&self, entity: EntityId, identifier: &Identifier) {
        if self.is_live(entity) {
            self.labels.insert(entity, identifier.to_string());
        }
    }
}
