//! DNSBL score aggregation (§4.7).
//!
//! Grounded on `postscreen/postscreen_dnsbl.c`. Multiple DNSBL site
//! entries can share a domain, each with its own `(filter, weight)`; a
//! client IP gets one ref-counted score record combining every site's
//! contribution. Requests are answered asynchronously even when the
//! result is already cached, so callers never have to distinguish a
//! synchronous hit from a pending lookup.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DnsblSite {
    pub filter: Option<String>,
    pub weight: i32,
}

#[derive(Debug, Clone)]
pub struct DnsblHead {
    pub safe_name: String,
    pub sites: Vec<DnsblSite>,
}

pub struct DnsblConfig {
    by_domain: HashMap<String, DnsblHead>,
}

fn parse_weight(text: &str) -> Result<i32, String> {
    text.parse()
        .map_err(|_| format!("bad DNSBL weight factor \"{text}\""))
}

impl DnsblConfig {
    /// Parses entries of the form `domain[=filter][*weight]`, coalescing
    /// repeats of the same domain under one head. `reply_map` supplies a
    /// credential-free display name per domain (so a URL-embedded
    /// password never reaches the logs); domains absent from it use the
    /// domain name itself.
    pub fn from_specs(specs: &[&str], reply_map: &HashMap<String, String>) -> Result<Self, String> {
        let mut by_domain: HashMap<String, DnsblHead> = HashMap::new();
        for spec in specs {
            let (domain_and_filter, weight) = match spec.split_once('*') {
                Some((d, w)) => (d, parse_weight(w)?),
                None => (*spec, 1),
            };
            let (domain, filter) = match domain_and_filter.split_once('=') {
                Some((d, f)) => (d.to_string(), Some(f.to_string())),
                None => (domain_and_filter.to_string(), None),
            };
            let head = by_domain.entry(domain.clone()).or_insert_with(|| DnsblHead {
                safe_name: reply_map.get(&domain).cloned().unwrap_or_else(|| domain.clone()),
                sites: Vec::new(),
            });
            head.sites.push(DnsblSite { filter, weight });
        }
        Ok(DnsblConfig { by_domain })
    }

    pub fn site_count(&self) -> usize {
        self.by_domain.len()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.by_domain.keys().map(|s| s.as_str())
    }
}

/// Matches one returned A-record against a reply filter. A filter is
/// either an exact address or a dotted address with one octet replaced
/// by a `[lo..hi]` range, e.g. `127.0.0.[1..255]` matching any of
/// `127.0.0.1` through `127.0.0.255`.
fn filter_matches(filter: &str, a_record: &str) -> bool {
    if filter == a_record {
        return true;
    }
    let Some(open) = filter.find('[') else {
        return false;
    };
    let Some(close) = filter[open..].find(']').map(|i| i + open) else {
        return false;
    };
    let Some((lo, hi)) = filter[open + 1..close].split_once("..") else {
        return false;
    };
    let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) else {
        return false;
    };

    let prefix = &filter[..open];
    let suffix = &filter[close + 1..];
    let Some(middle) = a_record.strip_prefix(prefix).and_then(|rest| rest.strip_suffix(suffix)) else {
        return false;
    };
    middle.parse::<u32>().is_ok_and(|value| value >= lo && value <= hi)
}

#[derive(Debug, Clone)]
struct ScoreRecord {
    dnsbl: Option<String>,
    total: i32,
    refcount: i32,
    pending_lookups: u32,
    largest_weight_seen: i32,
    callbacks: Vec<u64>,
}

/// Result of a `request()` call telling the caller what to do next.
pub enum RequestOutcome {
    /// A lookup is already in flight; the caller is queued and will be
    /// notified when it completes.
    Pending,
    /// The result is already known; the caller should schedule a
    /// zero-delay callback rather than notify synchronously (re-entrancy
    /// safety, per §4.7).
    DeliverNow,
    /// A brand-new record was created; the caller must query every
    /// returned domain.
    New(Vec<String>),
}

pub struct DnsblAggregator {
    config: DnsblConfig,
    scores: HashMap<String, ScoreRecord>,
}

impl DnsblAggregator {
    pub fn new(config: DnsblConfig) -> Self {
        DnsblAggregator {
            config,
            scores: HashMap::new(),
        }
    }

    pub fn request(&mut self, client_addr: &str, callback_ctx: u64) -> RequestOutcome {
        if let Some(score) = self.scores.get_mut(client_addr) {
            score.refcount += 1;
            score.callbacks.push(callback_ctx);
            return if score.pending_lookups == 0 {
                RequestOutcome::DeliverNow
            } else {
                RequestOutcome::Pending
            };
        }

        let domains: Vec<String> = self.config.domains().map(|s| s.to_string()).collect();
        self.scores.insert(
            client_addr.to_string(),
            ScoreRecord {
                dnsbl: None,
                total: 0,
                refcount: 1,
                pending_lookups: domains.len() as u32,
                largest_weight_seen: 0,
                callbacks: vec![callback_ctx],
            },
        );
        RequestOutcome::New(domains)
    }

    /// Processes one DNSBL reply. Returns `true` when `pending_lookups`
    /// has just reached zero and every queued callback should now fire.
    ///
    /// Score changes here never invalidate any scheduler-side cache -
    /// there is nothing downstream of a DNSBL score update that needs
    /// same-tick invalidation, and nothing here should be made to drive
    /// one. See the per-destination queue scheduler's candidate cache
    /// for the one place that distinction actually matters.
    pub fn receive(&mut self, client_addr: &str, domain: &str, a_records: &[String]) -> bool {
        let Some(score) = self.scores.get_mut(client_addr) else {
            return false;
        };
        if let Some(head) = self.config.by_domain.get(domain) {
            for site in &head.sites {
                let matched = match &site.filter {
                    None => true,
                    Some(filter) => a_records.iter().any(|a| filter_matches(filter, a)),
                };
                if matched {
                    score.total += site.weight;
                    if site.weight > score.largest_weight_seen {
                        score.largest_weight_seen = site.weight;
                        score.dnsbl = Some(head.safe_name.clone());
                    }
                }
            }
        }
        if score.pending_lookups > 0 {
            score.pending_lookups -= 1;
        }
        score.pending_lookups == 0
    }

    pub fn callbacks(&self, client_addr: &str) -> &[u64] {
        self.scores
            .get(client_addr)
            .map(|s| s.callbacks.as_slice())
            .unwrap_or(&[])
    }

    /// Retrieves `(total, safe_name)` and decrements the reference
    /// count, freeing the record once it reaches zero. Panics if called
    /// without a prior `request()` - a programming error in the caller.
    pub fn retrieve(&mut self, client_addr: &str) -> (i32, Option<String>) {
        let score = self
            .scores
            .get_mut(client_addr)
            .unwrap_or_else(|| panic!("no blocklist score for {client_addr}"));
        let result = (score.total, score.dnsbl.clone());
        score.refcount -= 1;
        if score.refcount < 1 {
            self.scores.remove(client_addr);
        }
        result
    }
}
