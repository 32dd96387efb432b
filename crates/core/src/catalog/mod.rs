use serde::{Deserialize, Serialize};

use crate::channel::TrackId;

/// Resolves track numbers to playable resource names.
///
/// Implementations own enumeration and ordering of the underlying files.
/// Names must be stable across calls for a given catalog snapshot. Lookups
/// that fall outside the catalog return `None` rather than clamping.
pub trait TrackCatalog {
    /// Name of the fixed resource played for `track`.
    fn file_name(&self, track: TrackId) -> Option<&str>;

    /// Name of entry `index` within random-selection collection `collection`.
    fn file_name_in(&self, collection: usize, index: usize) -> Option<&str>;

    /// Number of entries in `collection`; 0 for unknown collections.
    fn file_count(&self, collection: usize) -> usize;
}

/// Catalog held in memory, typically populated from configuration.
///
/// `tracks[i]` is the fixed resource of track `i`; `collections[i]` holds the
/// random-selection pool of track `i`. Empty names count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCatalog {
    pub tracks: Vec<String>,
    pub collections: Vec<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks<I, T>(tracks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tracks: tracks.into_iter().map(Into::into).collect(),
            collections: Vec::new(),
        }
    }

    pub fn register_track(&mut self, track: TrackId, name: impl Into<String>) {
        let index = track.index();
        if self.tracks.len() <= index {
            self.tracks.resize(index + 1, String::new());
        }
        self.tracks[index] = name.into();
    }

    pub fn register_collection<I, T>(&mut self, collection: usize, names: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        if self.collections.len() <= collection {
            self.collections.resize_with(collection + 1, Vec::new);
        }
        self.collections[collection] = names.into_iter().map(Into::into).collect();
    }
}

fn non_empty(name: &str) -> Option<&str> {
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

impl TrackCatalog for MemoryCatalog {
    fn file_name(&self, track: TrackId) -> Option<&str> {
        self.tracks
            .get(track.index())
            .and_then(|name| non_empty(name))
    }

    fn file_name_in(&self, collection: usize, index: usize) -> Option<&str> {
        self.collections
            .get(collection)
            .and_then(|names| names.get(index))
            .and_then(|name| non_empty(name))
    }

    fn file_count(&self, collection: usize) -> usize {
        self.collections.get(collection).map(Vec::len).unwrap_or(0)
    }
}
