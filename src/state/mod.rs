pub mod audio;
pub mod broadcast;
pub mod buzzer;
pub mod context;
pub mod game;
pub mod timer;

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use rand::{Rng, distr::Alphanumeric};
use uuid::Uuid;

use crate::config::MatchConfig;

pub use self::broadcast::{BroadcastHub, Broadcaster};
pub use self::context::{MatchContext, SharedMatch};

pub type SharedState = Arc<AppState>;

const JOIN_CODE_LEN: usize = 6;

/// Registry of every match hosted by this process.
pub struct AppState {
    config: Arc<MatchConfig>,
    hub: Arc<BroadcastHub>,
    matches: DashMap<Uuid, SharedMatch>,
    codes: DashMap<String, Uuid>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: MatchConfig) -> SharedState {
        Arc::new(Self {
            config: Arc::new(config),
            hub: Arc::new(BroadcastHub::new(256)),
            matches: DashMap::new(),
            codes: DashMap::new(),
        })
    }

    /// Configuration handed to every new match.
    pub fn config(&self) -> Arc<MatchConfig> {
        Arc::clone(&self.config)
    }

    /// Broadcast hub shared by every match; events carry their room.
    pub fn hub(&self) -> Arc<BroadcastHub> {
        Arc::clone(&self.hub)
    }

    /// Reserve an unused join code. It resolves to no match until [`AppState::insert`].
    pub fn allocate_code(&self) -> String {
        let mut rng = rand::rng();
        loop {
            let code: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(JOIN_CODE_LEN)
                .map(|byte| char::from(byte).to_ascii_uppercase())
                .collect();
            if let Entry::Vacant(slot) = self.codes.entry(code.clone()) {
                slot.insert(Uuid::nil());
                return code;
            }
        }
    }

    /// Register a match under its id and join code.
    pub fn insert(&self, ctx: SharedMatch) {
        self.codes.insert(ctx.code().to_string(), ctx.id());
        self.matches.insert(ctx.id(), ctx);
    }

    /// Match by identifier.
    pub fn get(&self, id: Uuid) -> Option<SharedMatch> {
        self.matches.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Match by join code, case-insensitively.
    pub fn find_by_code(&self, code: &str) -> Option<SharedMatch> {
        let id = *self.codes.get(&code.trim().to_ascii_uppercase())?;
        self.get(id)
    }

    /// Unregister a match, returning it so the caller can stop it.
    pub fn remove(&self, id: Uuid) -> Option<SharedMatch> {
        let (_, ctx) = self.matches.remove(&id)?;
        self.codes.remove(ctx.code());
        Some(ctx)
    }

    /// Snapshot of every registered match.
    pub fn matches(&self) -> Vec<SharedMatch> {
        self.matches
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
