//! Deterministic track selection (spec §4.7).

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

/// Bounded ring buffer of recently played track ids (spec §4.7: "bounded
/// size 5").
#[derive(Debug, Clone, Default)]
pub struct RecentHistory {
    entries: VecDeque<String>,
}

const HISTORY_CAPACITY: usize = 5;

impl RecentHistory {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(HISTORY_CAPACITY) }
    }

    pub fn push(&mut self, track_id: impl Into<String>) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(track_id.into());
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.entries.iter().any(|t| t == track_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stable hash of `(track_id, now_bucket)`. `DefaultHasher` is seeded with a
/// fixed key, so this is reproducible across runs for a fixed `now_bucket` —
/// exactly the property the selection policy needs for deterministic tests.
fn stable_hash(track_id: &str, now_bucket: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    track_id.hash(&mut hasher);
    now_bucket.hash(&mut hasher);
    hasher.finish()
}

/// Pick the next track per spec §4.7: exclude history (and, for the
/// commentary loop, the current track) from the library, falling back to the
/// full library if that leaves nothing, then choose the smallest stable hash.
pub fn select_track<'a>(
    library: &'a [String],
    history: &RecentHistory,
    exclude: Option<&str>,
    now_bucket: u64,
) -> Option<&'a str> {
    let filtered: Vec<&str> = library
        .iter()
        .map(String::as_str)
        .filter(|t| !history.contains(t) && Some(*t) != exclude)
        .collect();

    let pool: Vec<&str> = if filtered.is_empty() {
        library.iter().map(String::as_str).collect()
    } else {
        filtered
    };

    pool.into_iter().min_by_key(|track_id| stable_hash(track_id, now_bucket))
}
