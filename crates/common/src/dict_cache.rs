//! Generic key/value cache with "delete behind" iteration safety.
//!
//! Grounded on `util/dict_cache.c`. Some backing stores misbehave when the
//! entry the iteration cursor currently points at is deleted mid-scan (the
//! C comment calls out Berkeley DB < 2 producing garbage on `next` in that
//! case). Instead of deleting immediately, a delete of the "current" entry
//! is deferred until the cursor advances past it.

use std::collections::BTreeMap;

const LAST_CLEANUP_KEY: &str = "_LAST_CACHE_CLEANUP_COMPLETED_";

pub enum SeqStart {
    First,
    Next,
}

pub struct DictCache {
    name: String,
    store: BTreeMap<String, String>,
    saved_current: Option<(String, String)>,
    delete_behind: bool,
    retained: u64,
    dropped: u64,
}

impl DictCache {
    pub fn new(name: impl Into<String>) -> Self {
        DictCache {
            name: name.into(),
            store: BTreeMap::new(),
            saved_current: None,
            delete_behind: false,
            retained: 0,
            dropped: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn matches_current(&self, key: &str) -> bool {
        self.saved_current
            .as_ref()
            .is_some_and(|(curr, _)| curr == key)
    }

    /// Returns `None` when the entry was found but is scheduled for
    /// delete-behind.
    pub fn lookup(&self, key: &str) -> Option<&str> {
        if self.delete_behind && self.matches_current(key) {
            return None;
        }
        self.store.get(key).map(|s| s.as_str())
    }

    /// Cancels a pending delete-behind for `key` if it is the current
    /// iterator entry, matching `dict_cache_update`'s resurrection rule.
    pub fn update(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.delete_behind && self.matches_current(&key) {
            self.delete_behind = false;
        }
        self.store.insert(key, value.into());
    }

    /// Returns `true` when the entry existed (matching the C convention
    /// would be inverted - zero means found - but Rust code reads clearer
    /// the other way around; callers should not rely on the C sense).
    pub fn delete(&mut self, key: &str) -> bool {
        if self.matches_current(key) {
            self.delete_behind = true;
            true
        } else {
            self.store.remove(key).is_some()
        }
    }

    fn apply_delete_behind(&mut self) {
        if self.delete_behind {
            self.delete_behind = false;
            if let Some((key, _)) = &self.saved_current {
                self.store.remove(key);
            }
        }
    }

    /// Advances the iterator. Hides the reserved cleanup-timestamp key.
    pub fn sequence(&mut self, start: SeqStart) -> Option<(String, String)> {
        loop {
            let next = match start {
                SeqStart::First => self.store.iter().next(),
                SeqStart::Next => match &self.saved_current {
                    Some((curr, _)) => self
                        .store
                        .range::<String, _>((
                            std::ops::Bound::Excluded(curr.clone()),
                            std::ops::Bound::Unbounded,
                        ))
                        .next(),
                    None => self.store.iter().next(),
                },
            };
            let found = next.map(|(k, v)| (k.clone(), v.clone()));

            self.apply_delete_behind();

            match found {
                Some((key, _)) if key == LAST_CLEANUP_KEY => {
                    self.saved_current = Some((key, String::new()));
                    continue;
                }
                Some(pair) => {
                    self.saved_current = Some(pair.clone());
                    return Some(pair);
                }
                None => {
                    self.saved_current = None;
                    return None;
                }
            }
        }
    }

    /// One step of a periodic cleanup pass: examine (at most) one entry
    /// per call, so the cache stays responsive to ordinary lookups while a
    /// full scan is in progress. `now` is recorded under the reserved
    /// cleanup-timestamp key once the scan completes, so a process that
    /// gets killed mid-cleanup can tell on restart how stale the cache is.
    pub fn expire_step(&mut self, now: u64, mut keep: impl FnMut(&str, &str) -> bool) -> ExpireStep {
        let start = if self.saved_current.is_none() {
            self.retained = 0;
            self.dropped = 0;
            SeqStart::First
        } else {
            SeqStart::Next
        };
        match self.sequence(start) {
            Some((key, value)) => {
                if keep(&key, &value) {
                    self.retained += 1;
                    ExpireStep::Kept(key)
                } else {
                    self.delete_behind = true;
                    self.dropped += 1;
                    ExpireStep::Dropped(key)
                }
            }
            None => {
                let stats = (self.retained, self.dropped);
                self.retained = 0;
                self.dropped = 0;
                self.store.insert(LAST_CLEANUP_KEY.to_string(), now.to_string());
                ExpireStep::Done {
                    retained: stats.0,
                    dropped: stats.1,
                }
            }
        }
    }

    /// Reads back the timestamp `expire_step` recorded on the last
    /// completed scan, if any.
    pub fn last_cleanup_completed(&self) -> Option<u64> {
        self.store.get(LAST_CLEANUP_KEY).and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExpireStep {
    Kept(String),
    Dropped(String),
    Done { retained: u64, dropped: u64 },
}
