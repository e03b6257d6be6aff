//! Fast-flush service (§4.11).
//!
//! Per-site logs under the `flush` queue record queue-ids so a later
//! `SEND` can touch exactly the deferred mail for that site instead of
//! rescanning everything. Unknown sites (absent from the flush-domain
//! map entirely) return `UNKNOWN`; sites that are listed but have no
//! log file yet are a no-op success on `SEND`.

use std::collections::HashSet;

/// Touches the files backing one logged queue-id so the queue manager
/// picks them up on its next scan. Implemented by the caller so the
/// log-replay logic here stays testable without a filesystem.
pub trait QueueTouch {
    fn touch(&mut self, queue_id: &str);
    fn request_rescan(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Ok,
    UnknownSite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    UnknownSite,
}

struct SiteLog {
    entries: Vec<String>,
    appends_since_send: u32,
}

impl SiteLog {
    fn new() -> Self {
        SiteLog {
            entries: Vec::new(),
            appends_since_send: 0,
        }
    }
}

pub struct FlushService {
    known_sites: HashSet<String>,
    logs: std::collections::HashMap<String, SiteLog>,
    /// Every this many appends to one site's log, a proactive SEND
    /// bounds how large that log can grow.
    proactive_send_every: u32,
}

pub enum Trigger {
    None,
    ProactiveSend(String),
}

impl FlushService {
    pub fn new(known_sites: impl IntoIterator<Item = String>, proactive_send_every: u32) -> Self {
        FlushService {
            known_sites: known_sites.into_iter().collect(),
            logs: std::collections::HashMap::new(),
            proactive_send_every,
        }
    }

    /// `ADD site qid`.
    pub fn add(&mut self, site: &str, queue_id: &str) -> (AddOutcome, Trigger) {
        if !self.known_sites.contains(site) {
            return (AddOutcome::UnknownSite, Trigger::None);
        }
        let log = self.logs.entry(site.to_string()).or_insert_with(SiteLog::new);
        log.entries.push(queue_id.to_string());
        log.appends_since_send += 1;

        let trigger = if log.appends_since_send >= self.proactive_send_every {
            Trigger::ProactiveSend(site.to_string())
        } else {
            Trigger::None
        };
        (AddOutcome::Ok, trigger)
    }

    /// `SEND site`: de-duplicates the logged queue-ids, touches each
    /// one via `touch`, and truncates the log.
    pub fn send(&mut self, site: &str, touch: &mut impl QueueTouch) -> SendOutcome {
        if !self.known_sites.contains(site) {
            return SendOutcome::UnknownSite;
        }
        let Some(log) = self.logs.get_mut(site) else {
            return SendOutcome::Ok;
        };

        let mut seen = HashSet::new();
        for queue_id in log.entries.drain(..) {
            if seen.insert(queue_id.clone()) {
                touch.touch(&queue_id);
            }
        }
        log.appends_since_send = 0;
        touch.request_rescan();
        SendOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingTouch {
        touched: Vec<String>,
        rescans: u32,
    }

    impl QueueTouch for RecordingTouch {
        fn touch(&mut self, queue_id: &str) {
            self.touched.push(queue_id.to_string());
        }
        fn request_rescan(&mut self) {
            self.rescans += 1;
        }
    }

    fn service() -> FlushService {
        FlushService::new(["mail.example.com".to_string()], 1000)
    }

    #[test]
    fn add_to_unknown_site_is_rejected() {
        let mut svc = service();
        let (outcome, _) = svc.add("nowhere.example", "ABC123");
        assert_eq!(outcome, AddOutcome::UnknownSite);
    }

    #[test]
    fn send_deduplicates_queue_ids_before_touching() {
        let mut svc = service();
        svc.add("mail.example.com", "ABC123");
        svc.add("mail.example.com", "DEF456");
        svc.add("mail.example.com", "ABC123");
        let mut touch = RecordingTouch::default();
        let outcome = svc.send("mail.example.com", &mut touch);
        assert_eq!(outcome, SendOutcome::Ok);
        assert_eq!(touch.touched, vec!["ABC123".to_string(), "DEF456".to_string()]);
        assert_eq!(touch.rescans, 1);
    }

    #[test]
    fn send_on_listed_site_with_no_log_is_an_empty_success() {
        let mut svc = service();
        let mut touch = RecordingTouch::default();
        let outcome = svc.send("mail.example.com", &mut touch);
        assert_eq!(outcome, SendOutcome::Ok);
        assert!(touch.touched.is_empty());
    }

    #[test]
    fn send_on_unknown_site_returns_unknown() {
        let mut svc = service();
        let mut touch = RecordingTouch::default();
        let outcome = svc.send("nowhere.example", &mut touch);
        assert_eq!(outcome, SendOutcome::UnknownSite);
    }

    #[test]
    fn proactive_send_triggers_after_configured_append_count() {
        let mut svc = FlushService::new(["site.example".to_string()], 3);
        svc.add("site.example", "Q1");
        svc.add("site.example", "Q2");
        let (_, trigger) = svc.add("site.example", "Q3");
        assert!(matches!(trigger, Trigger::ProactiveSend(_)));
    }

    #[test]
    fn log_is_truncated_after_send() {
        let mut svc = service();
        svc.add("mail.example.com", "ABC123");
        let mut touch = RecordingTouch::default();
        svc.send("mail.example.com", &mut touch);
        let mut touch2 = RecordingTouch::default();
        svc.send("mail.example.com", &mut touch2);
        assert!(touch2.touched.is_empty());
    }
}
