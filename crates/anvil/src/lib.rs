//! Connection count/rate accounting (§4.5).
//!
//! Grounded on `anvil/anvil.c`. Two tables: a remote table keyed by
//! `service+client` identity tracking live connection count and a
//! per-time-unit rate, and a local table keyed by the reporting server's
//! connection handle so that a crashed local server's recorded
//! connections can be dropped exactly once.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStatus {
    pub count: i64,
    pub rate: i64,
}

#[derive(Debug, Clone)]
struct RemoteEntry {
    count: i64,
    rate: i64,
    start: u64,
}

/// Emitted when a disconnect drops a remote entry's count to zero - the
/// caller is expected to arm a timer that calls [`AnvilTable::expire`]
/// after `time_unit` seconds, canceling it early if another connect
/// arrives first (handled internally by `connect`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpireAt {
    pub ident: String,
    pub at: u64,
}

pub struct HighWaterMarks {
    pub max_count: i64,
    pub max_count_user: Option<String>,
    pub max_count_time: u64,
    pub max_rate: i64,
    pub max_rate_user: Option<String>,
    pub max_rate_time: u64,
}

impl Default for HighWaterMarks {
    fn default() -> Self {
        HighWaterMarks {
            max_count: 0,
            max_count_user: None,
            max_count_time: 0,
            max_rate: 0,
            max_rate_user: None,
            max_rate_time: 0,
        }
    }
}

impl HighWaterMarks {
    /// Logs and resets the extreme values, matching `anvil_status_dump`'s
    /// "only log if it ever exceeded 1" rule (a single connection is not
    /// noteworthy).
    pub fn dump_and_reset(&mut self, time_unit: u64) -> Vec<String> {
        let mut lines = Vec::new();
        if self.max_rate > 1 {
            lines.push(format!(
                "statistics: max connection rate {}/{}s for ({}) at {}",
                self.max_rate,
                time_unit,
                self.max_rate_user.as_deref().unwrap_or(""),
                self.max_rate_time
            ));
            self.max_rate = 0;
        }
        if self.max_count > 1 {
            lines.push(format!(
                "statistics: max connection count {} for ({}) at {}",
                self.max_count,
                self.max_count_user.as_deref().unwrap_or(""),
                self.max_count_time
            ));
            self.max_count = 0;
        }
        lines
    }
}

pub struct AnvilTable {
    time_unit: u64,
    remote: HashMap<String, RemoteEntry>,
    local: HashMap<u64, Option<String>>,
    pub high_water: HighWaterMarks,
}

impl AnvilTable {
    pub fn new(time_unit: u64) -> Self {
        AnvilTable {
            time_unit,
            remote: HashMap::new(),
            local: HashMap::new(),
            high_water: HighWaterMarks::default(),
        }
    }

    /// `request=connect`: registers one new connection for `ident`,
    /// updates the rate window, and returns the post-update status.
    pub fn connect(&mut self, local_id: u64, ident: &str, now: u64) -> RemoteStatus {
        let cancel_expiry = match self.remote.get_mut(ident) {
            None => {
                self.remote.insert(
                    ident.to_string(),
                    RemoteEntry {
                        count: 1,
                        rate: 1,
                        start: now,
                    },
                );
                false
            }
            Some(entry) => {
                if entry.start + self.time_unit < now {
                    entry.rate = 1;
                    entry.start = now;
                } else {
                    entry.rate = entry.rate.saturating_add(1);
                }
                let was_idle = entry.count == 0;
                entry.count += 1;
                was_idle
            }
        };
        let _ = cancel_expiry; // caller cancels any pending timer for `ident`

        self.local
            .entry(local_id)
            .and_modify(|current| {
                if let Some(prev) = current.take() {
                    if prev != ident {
                        self.drop_one(&prev);
                    }
                }
                *current = Some(ident.to_string());
            })
            .or_insert_with(|| Some(ident.to_string()));

        let entry = self.remote.get(ident).expect("just inserted or updated");
        let status = RemoteStatus {
            count: entry.count,
            rate: entry.rate,
        };

        if status.rate > self.high_water.max_rate {
            self.high_water.max_rate = status.rate;
            self.high_water.max_rate_user = Some(ident.to_string());
            self.high_water.max_rate_time = now;
        }
        if status.count > self.high_water.max_count {
            self.high_water.max_count = status.count;
            self.high_water.max_count_user = Some(ident.to_string());
            self.high_water.max_count_time = now;
        }
        status
    }

    /// `request=disconnect`: drops one connection for `ident`. Returns an
    /// [`ExpireAt`] when this was the last connection and the caller
    /// should arm an expiry timer.
    pub fn disconnect(&mut self, local_id: u64, ident: &str, now: u64) -> Option<ExpireAt> {
        if let Some(current) = self.local.get_mut(&local_id) {
            if current.as_deref() == Some(ident) {
                *current = None;
            }
        }
        self.drop_one_with_expiry(ident, now)
    }

    fn drop_one(&mut self, ident: &str) {
        let _ = self.drop_one_with_expiry(ident, 0);
    }

    fn drop_one_with_expiry(&mut self, ident: &str, now: u64) -> Option<ExpireAt> {
        let entry = self.remote.get_mut(ident)?;
        if entry.count <= 0 {
            return None;
        }
        entry.count -= 1;
        if entry.count == 0 {
            Some(ExpireAt {
                ident: ident.to_string(),
                at: now + self.time_unit,
            })
        } else {
            None
        }
    }

    /// Purges an entry whose expiry timer fired. Panics if another
    /// connect raced in without canceling the timer - an invariant
    /// violation, matching `msg_panic` in the original.
    pub fn expire(&mut self, ident: &str) {
        if let Some(entry) = self.remote.get(ident) {
            assert_eq!(entry.count, 0, "anvil: expiring entry with live connections");
            self.remote.remove(ident);
        }
    }

    pub fn lookup(&self, ident: &str) -> Option<RemoteStatus> {
        self.remote.get(ident).map(|e| RemoteStatus {
            count: e.count,
            rate: e.rate,
        })
    }

    pub fn lookup_all(&self) -> Vec<(String, RemoteStatus)> {
        self.remote
            .iter()
            .map(|(ident, e)| {
                (
                    ident.clone(),
                    RemoteStatus {
                        count: e.count,
                        rate: e.rate,
                    },
                )
            })
            .collect()
    }

    /// Drops all connections still attributed to `local_id` (a local
    /// server that disconnected without reporting each of its remote
    /// clients individually).
    pub fn service_done(&mut self, local_id: u64, now: u64) -> Option<ExpireAt> {
        let ident = self.local.remove(&local_id).flatten()?;
        self.drop_one_with_expiry(&ident, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connect_starts_count_and_rate_at_one() {
        let mut table = AnvilTable::new(60);
        let status = table.connect(1, "smtp:1.2.3.4", 1000);
        assert_eq!(status, RemoteStatus { count: 1, rate: 1 });
    }

    #[test]
    fn repeated_connects_within_window_accumulate_rate() {
        let mut table = AnvilTable::new(60);
        table.connect(1, "smtp:1.2.3.4", 1000);
        let status = table.connect(2, "smtp:1.2.3.4", 1010);
        assert_eq!(status, RemoteStatus { count: 2, rate: 2 });
    }

    #[test]
    fn connect_outside_window_resets_rate_but_not_count() {
        let mut table = AnvilTable::new(60);
        table.connect(1, "smtp:1.2.3.4", 1000);
        let status = table.connect(2, "smtp:1.2.3.4", 1070);
        assert_eq!(status, RemoteStatus { count: 2, rate: 1 });
    }

    #[test]
    fn disconnect_to_zero_schedules_expiry() {
        let mut table = AnvilTable::new(60);
        table.connect(1, "smtp:1.2.3.4", 1000);
        let expiry = table.disconnect(1, "smtp:1.2.3.4", 1005);
        assert_eq!(
            expiry,
            Some(ExpireAt {
                ident: "smtp:1.2.3.4".to_string(),
                at: 1065
            })
        );
    }

    #[test]
    fn expire_removes_idle_entry() {
        let mut table = AnvilTable::new(60);
        table.connect(1, "smtp:1.2.3.4", 1000);
        table.disconnect(1, "smtp:1.2.3.4", 1005);
        table.expire("smtp:1.2.3.4");
        assert_eq!(table.lookup("smtp:1.2.3.4"), None);
    }

    #[test]
    fn service_done_drops_the_local_servers_open_connection() {
        let mut table = AnvilTable::new(60);
        table.connect(1, "smtp:1.2.3.4", 1000);
        let expiry = table.service_done(1, 1005);
        assert_eq!(
            expiry,
            Some(ExpireAt {
                ident: "smtp:1.2.3.4".to_string(),
                at: 1065
            })
        );
    }

    #[test]
    fn high_water_marks_track_the_largest_observed_values() {
        let mut table = AnvilTable::new(60);
        table.connect(1, "a", 1000);
        table.connect(2, "a", 1001);
        table.connect(3, "a", 1002);
        let lines = table.high_water.dump_and_reset(60);
        assert!(lines.iter().any(|l| l.contains("max connection rate 3")));
        assert!(lines.iter().any(|l| l.contains("max connection count 3")));
    }
}
