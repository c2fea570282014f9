//! Durable JSON store for wheel positions.
//!
//! The whole document is rewritten on every mutation: serialized to a
//! sibling `.tmp` file, synced, then renamed over the primary file, so a
//! reader never observes a partial write. A document that cannot be parsed
//! on open is moved aside to `<file>.corrupt-<timestamp>` and the store
//! starts empty.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wheel_trade_core::{WheelError, WheelResult};

use crate::position::{Trade, Transition, WheelPosition, WheelState};

/// Current on-disk document version.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    positions: BTreeMap<String, WheelPosition>,
}

const fn default_version() -> u32 {
    STATE_VERSION
}

/// A trade tagged with the position it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub underlying: String,
    #[serde(flatten)]
    pub trade: Trade,
}

/// Aggregate view used by `status` and the daily summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub total_positions: usize,
    pub active_positions: usize,
    pub total_premium: Decimal,
    pub total_cycles: u32,
    pub by_state: BTreeMap<WheelState, usize>,
}

/// Single-writer store of every [`WheelPosition`], keyed by upper-case symbol.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    positions: Mutex<BTreeMap<String, WheelPosition>>,
}

fn key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl StateStore {
    /// Opens the store at `path`, loading any existing document.
    ///
    /// # Errors
    ///
    /// Only if a corrupt document cannot be moved aside. A missing file is
    /// an empty store.
    pub fn open(path: impl Into<PathBuf>) -> WheelResult<Self> {
        let path = path.into();
        let positions = Self::load(&path)?;
        info!(path = %path.display(), positions = positions.len(), "state store opened");
        Ok(Self {
            path,
            positions: Mutex::new(positions),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> WheelResult<BTreeMap<String, WheelPosition>> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        // bytes, not a String: invalid UTF-8 is corruption like any other
        match serde_json::from_slice::<StateDocument>(&raw) {
            Ok(doc) => {
                if doc.version > STATE_VERSION {
                    warn!(version = doc.version, "state document is newer than this build");
                }
                Ok(doc
                    .positions
                    .into_iter()
                    .map(|(k, mut p)| {
                        if p.symbol.is_empty() {
                            p.symbol = key(&k);
                        }
                        (key(&k), p)
                    })
                    .collect())
            }
            Err(e) => {
                let quarantine = Self::quarantine_path(path, Utc::now());
                fs::rename(path, &quarantine)?;
                warn!(
                    error = %e,
                    moved_to = %quarantine.display(),
                    "state document corrupt, starting with an empty store"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn quarantine_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", at.format("%Y%m%dT%H%M%SZ")));
        path.with_file_name(name)
    }

    fn write(&self, positions: &BTreeMap<String, WheelPosition>) -> WheelResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let doc = StateDocument {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            positions: positions.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| WheelError::Persistence(e.to_string()))?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        if let Err(e) = Self::replace(&tmp, &self.path, json.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            warn!(path = %self.path.display(), error = %e, "state save failed");
            return Err(e.into());
        }

        debug!(path = %self.path.display(), positions = positions.len(), "state saved");
        Ok(())
    }

    fn replace(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(tmp, target)
    }

    /// Writes `map` with `position` inserted, then commits it in memory.
    fn commit(
        &self,
        map: &mut BTreeMap<String, WheelPosition>,
        position: WheelPosition,
    ) -> WheelResult<()> {
        let mut next = map.clone();
        next.insert(key(&position.symbol), position);
        self.write(&next)?;
        *map = next;
        Ok(())
    }

    /// Returns the position for `symbol`, creating and persisting an IDLE
    /// one the first time.
    ///
    /// # Errors
    ///
    /// Returns [`WheelError::Persistence`] if a new position cannot be saved.
    pub fn get(&self, symbol: &str) -> WheelResult<WheelPosition> {
        let mut map = self.positions.lock();
        if let Some(existing) = map.get(&key(symbol)) {
            return Ok(existing.clone());
        }
        let position = WheelPosition::new(key(symbol));
        self.commit(&mut map, position.clone())?;
        info!(symbol = %position.symbol, "created new wheel position");
        Ok(position)
    }

    /// Replaces the stored position, stamping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`WheelError::Persistence`] if the write fails; the stored
    /// copy is then left unchanged.
    pub fn update(&self, position: &mut WheelPosition) -> WheelResult<()> {
        position.updated_at = Utc::now();
        let mut map = self.positions.lock();
        self.commit(&mut map, position.clone())
    }

    /// Applies `transition` to a copy of `position` and persists it.
    ///
    /// The in-memory store only changes once the write succeeded, so a
    /// failed save leaves the last persisted snapshot in place.
    ///
    /// # Errors
    ///
    /// Returns [`WheelError::Persistence`] if the write fails.
    pub fn transition_to(
        &self,
        position: &WheelPosition,
        transition: Transition,
    ) -> WheelResult<WheelPosition> {
        let mut next = position.clone();
        next.apply(transition, Utc::now());
        let mut map = self.positions.lock();
        self.commit(&mut map, next.clone())?;
        Ok(next)
    }

    /// Every position, ordered by symbol.
    #[must_use]
    pub fn all(&self) -> Vec<WheelPosition> {
        self.positions.lock().values().cloned().collect()
    }

    /// Positions not in IDLE.
    #[must_use]
    pub fn active(&self) -> Vec<WheelPosition> {
        self.positions
            .lock()
            .values()
            .filter(|p| p.state != WheelState::Idle)
            .cloned()
            .collect()
    }

    /// Deletes a position and its trade history. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`WheelError::Persistence`] if the write fails.
    pub fn remove(&self, symbol: &str) -> WheelResult<bool> {
        let mut map = self.positions.lock();
        let k = key(symbol);
        if !map.contains_key(&k) {
            return Ok(false);
        }
        let mut next = map.clone();
        next.remove(&k);
        self.write(&next)?;
        *map = next;
        warn!(symbol = %k, "position removed");
        Ok(true)
    }

    /// Trades across one or all positions, oldest first.
    #[must_use]
    pub fn export_trades(&self, symbol: Option<&str>) -> Vec<TradeRecord> {
        let map = self.positions.lock();
        let wanted = symbol.map(key);
        let mut records: Vec<TradeRecord> = map
            .iter()
            .filter(|(k, _)| wanted.as_ref().map_or(true, |w| w == *k))
            .flat_map(|(_, p)| {
                p.trades.iter().map(|t| TradeRecord {
                    underlying: p.symbol.clone(),
                    trade: t.clone(),
                })
            })
            .collect();
        // stable, so per-position order survives timestamp ties
        records.sort_by_key(|r| r.trade.timestamp);
        records
    }

    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        let map = self.positions.lock();
        let mut by_state: BTreeMap<WheelState, usize> =
            WheelState::ALL.iter().map(|s| (*s, 0)).collect();
        for p in map.values() {
            *by_state.entry(p.state).or_default() += 1;
        }
        StoreSummary {
            total_positions: map.len(),
            active_positions: map.values().filter(|p| p.state != WheelState::Idle).count(),
            total_premium: map.values().map(|p| p.total_premium_collected).sum(),
            total_cycles: map.values().map(|p| p.cycle_count).sum(),
            by_state,
        }
    }
}
