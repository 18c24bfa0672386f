use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::models::MovieId;

/// Name of the slot holding the favorites array.
pub const FAVORITES_SLOT: &str = "movie_favorites";
const DEFAULT_DIR: &str = "data";

/// A single durable string slot. Reads and writes may fail.
pub trait FavoritesSlot: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, value: &str) -> Result<()>;
}

/// Slot backed by a JSON file on disk.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `FAVORITES_PATH`, or `data/movie_favorites.json`.
    pub fn from_env() -> Self {
        let path = env::var("FAVORITES_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(DEFAULT_DIR).join(format!("{FAVORITES_SLOT}.json")));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FavoritesSlot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn write(&self, value: &str) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        // Write then rename so a failed write never truncates the existing slot.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, value).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

/// The user's favorite movie ids.
///
/// Storage is the source of truth: every call re-reads the slot, and the
/// mutating calls return the membership that storage ended up with. Storage
/// failures are logged and swallowed; nothing here returns an error.
pub struct FavoritesStore {
    slot: Box<dyn FavoritesSlot>,
    // Serializes read-modify-write cycles.
    lock: Mutex<()>,
}

impl FavoritesStore {
    pub fn new(slot: impl FavoritesSlot + 'static) -> Self {
        Self {
            slot: Box::new(slot),
            lock: Mutex::new(()),
        }
    }

    pub fn from_env() -> Self {
        let slot = FileSlot::from_env();
        debug!("Favorites slot at {}", slot.path().display());
        Self::new(slot)
    }

    /// All favorite ids in the order they were added.
    pub fn get_all(&self) -> Vec<MovieId> {
        let _guard = self.guard();
        self.load()
    }

    pub fn contains(&self, id: MovieId) -> bool {
        self.get_all().contains(&id)
    }

    /// Returns whether `id` is a favorite afterwards.
    pub fn add(&self, id: MovieId) -> bool {
        let _guard = self.guard();
        let mut ids = self.load();
        if ids.contains(&id) {
            return true;
        }
        ids.push(id);
        self.persist(&ids)
    }

    /// Returns whether `id` is still a favorite afterwards.
    pub fn remove(&self, id: MovieId) -> bool {
        let _guard = self.guard();
        let mut ids = self.load();
        if !ids.contains(&id) {
            return false;
        }
        ids.retain(|existing| *existing != id);
        !self.persist(&ids)
    }

    /// Flip membership of `id` and return the new membership.
    pub fn toggle(&self, id: MovieId) -> bool {
        let _guard = self.guard();
        let mut ids = self.load();
        let was_favorite = ids.contains(&id);
        if was_favorite {
            ids.retain(|existing| *existing != id);
        } else {
            ids.push(id);
        }
        if self.persist(&ids) {
            !was_favorite
        } else {
            was_favorite
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Vec<MovieId> {
        let raw = match self.slot.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Favorites slot unreadable, treating as empty: {:#}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<MovieId>>(&raw) {
            Ok(ids) => dedupe_preserve_order(ids),
            Err(e) => {
                warn!("Favorites slot is corrupt, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    fn persist(&self, ids: &[MovieId]) -> bool {
        let encoded = match serde_json::to_string(ids) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to encode favorites: {}", e);
                return false;
            }
        };
        match self.slot.write(&encoded) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to persist favorites: {:#}", e);
                false
            }
        }
    }
}

fn dedupe_preserve_order(ids: Vec<MovieId>) -> Vec<MovieId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
