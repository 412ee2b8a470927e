//! Durable registry of tracked drivers.
//!
//! Owns its mutex and its persistence: every mutating operation flushes the
//! full document to disk before returning, so a crash right after a
//! successful call never loses that mutation. Process restarts resume from
//! the last acknowledged state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    domain::{ChannelId, DriverId, RaceId, Registration},
    Result,
};

/// Persisted document layout. `last_race: null` (never omitted) keeps the
/// schema stable for drivers that were never notified.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    drivers: Vec<Registration>,
}

pub struct TrackerRegistry {
    path: PathBuf,
    // Vec keeps insertion order for `list()`; lookups are by normalized id.
    state: Mutex<Vec<Registration>>,
}

impl TrackerRegistry {
    /// Load the registry from `path`.
    ///
    /// A missing store starts empty; an unreadable or corrupt store is logged
    /// and also starts empty so a bad file never prevents startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let drivers = match read_store(&path) {
            Ok(doc) => doc.drivers,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load tracked drivers, starting empty");
                Vec::new()
            }
        };

        Self {
            path,
            state: Mutex::new(drivers),
        }
    }

    /// Start tracking `display_name`, posting to `channel`.
    ///
    /// Re-tracking an already-tracked name overwrites the record in place
    /// (same id, marker reset to "never notified"). No error conditions
    /// besides a failed flush.
    pub async fn register(&self, display_name: &str, channel: ChannelId) -> Result<Registration> {
        let reg = Registration {
            driver_id: DriverId::normalize(display_name),
            display_name: display_name.trim().to_string(),
            channel_id: channel,
            last_race: None,
        };

        let mut state = self.state.lock().await;
        match state.iter_mut().find(|r| r.driver_id == reg.driver_id) {
            Some(existing) => *existing = reg.clone(),
            None => state.push(reg.clone()),
        }
        flush(&self.path, &state)?;
        Ok(reg)
    }

    /// Stop tracking `display_name`. Returns whether a record was removed;
    /// an unknown driver is a normal `false`, not an error.
    pub async fn unregister(&self, display_name: &str) -> Result<bool> {
        let id = DriverId::normalize(display_name);

        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|r| r.driver_id != id);
        let removed = state.len() != before;
        if removed {
            flush(&self.path, &state)?;
        }
        Ok(removed)
    }

    /// Snapshot of all registrations in insertion order.
    ///
    /// Callers get clones, never the live structure, so a poll tick can
    /// iterate while commands mutate concurrently.
    pub async fn list(&self) -> Vec<Registration> {
        self.state.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    /// Record that `race` has been notified for `driver`.
    ///
    /// Returns `false` without touching the store when the driver vanished
    /// between poll-start and marker-update (unregister-during-poll race).
    pub async fn update_marker(&self, driver: &DriverId, race: RaceId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.iter_mut().find(|r| &r.driver_id == driver) else {
            return Ok(false);
        };
        entry.last_race = Some(race);
        flush(&self.path, &state)?;
        Ok(true)
    }
}

fn read_store(path: &Path) -> Result<StoreDocument> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    let doc: StoreDocument = serde_json::from_str(&txt)?;
    Ok(doc)
}

fn flush(path: &Path, drivers: &[Registration]) -> Result<()> {
    let doc = StoreDocument {
        drivers: drivers.to_vec(),
    };
    let txt = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, txt)?;
    Ok(())
}
