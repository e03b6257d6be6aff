//! Address resolver (§4.4): maps an internal-form recipient address to a
//! `(channel, nexthop, recipient)` triple plus classification flags.
//!
//! Grounded on `trivial-rewrite/resolve.c`. The original walks an RFC-822
//! token tree; this version strips trailing dots/`@`/routing operators a
//! domain label at a time on the plain string, which is observably
//! equivalent for the address shapes the resolver ever sees (it always
//! operates on an already-rewritten, already-quoted address).

pub const FLAG_ROUTED: u32 = 1 << 0;
pub const FLAG_FAIL: u32 = 1 << 1;
pub const FLAG_ERROR: u32 = 1 << 2;
pub const CLASS_LOCAL: u32 = 1 << 3;
pub const CLASS_ALIAS: u32 = 1 << 4;
pub const CLASS_VIRTUAL: u32 = 1 << 5;
pub const CLASS_RELAY: u32 = 1 << 6;
pub const CLASS_DEFAULT: u32 = 1 << 7;

pub struct ResolveConfig {
    pub myhostname: String,
    pub relayhost: Option<String>,
    pub default_transport: String,
    pub local_transport: String,
    pub relay_transport: String,
    pub virtual_transport: String,
    pub error_transport: String,
}

/// Abstracts `resolve_local()`: is `domain` one of mydestination /
/// inet_interfaces / virtual_mailbox_domains-as-local / ...?
pub trait LocalDomainCheck {
    fn is_local(&self, domain: &str) -> bool;
}

pub trait DomainListMatch {
    /// `Ok(true)`/`Ok(false)` on a definite answer, `Err(())` on lookup
    /// failure (propagated as `FLAG_FAIL`, matching `dict_errno`).
    fn matches(&self, domain: &str) -> Result<bool, ()>;
}

pub trait TransportMapLookup {
    /// `Ok(Some((channel, nexthop)))` when an entry was found (values are
    /// the final, already-resolved channel/nexthop - matching the C
    /// by-reference convention where both are always written on a hit).
    /// `Ok(None)` for no match, `Err(())` for a lookup failure.
    fn lookup(&self, recipient: &str) -> Result<Option<(String, String)>, ()>;
}

pub trait RelocatedLookup {
    fn lookup(&self, recipient: &str) -> Result<Option<String>, ()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    pub channel: String,
    pub nexthop: String,
    pub recipient: String,
    pub flags: u32,
}

/// Splits `addr` into `(domain, colon_destination)` the way
/// `split_at(channel, ':')` does for a channel string like
/// `"smtp:[host]:port"`.
fn split_channel(channel: &str) -> (String, Option<String>) {
    match channel.split_once(':') {
        Some((name, rest)) if !rest.is_empty() => (name.to_string(), Some(rest.to_string())),
        _ => (channel.to_string(), None),
    }
}

/// Strips trailing `.`/`@` and any local domain suffix, returning the
/// surviving `(local_part, domain)` split, and whether a domain routing
/// operator (`@`, `!`, `%`) was found in what remains of the local part
/// after the final local-domain strip - the `ROUTED` condition.
fn strip_local_domains(
    mut addr: String,
    is_local: &dyn LocalDomainCheck,
) -> (String, Option<String>, bool) {
    let mut had_domain_once = false;
    loop {
        addr = addr.trim_end_matches('.').trim_end_matches('@').to_string();

        if addr.is_empty() {
            return (String::new(), None, false);
        }

        let at = addr.rfind('@');
        let Some(at) = at else {
            return (addr, None, false);
        };
        had_domain_once = true;
        let domain = addr[at + 1..].to_string();
        if !is_local.is_local(&domain) {
            let local_part = addr[..at].to_string();
            let routed = local_part.contains('@') || local_part.contains('!') || local_part.contains('%');
            return (local_part, Some(domain), routed && had_domain_once);
        }
        // Local: strip this domain and keep stripping.
        addr = addr[..at].to_string();
        if !(addr.contains('@') || addr.contains('!') || addr.contains('%')) {
            return (addr, None, false);
        }
    }
}

pub fn resolve_addr(
    addr: &str,
    cfg: &ResolveConfig,
    is_local: &dyn LocalDomainCheck,
    virt_alias_domains: Option<&dyn DomainListMatch>,
    virt_mailbox_domains: Option<&dyn DomainListMatch>,
    relay_domains: Option<&dyn DomainListMatch>,
    transport_maps: Option<&dyn TransportMapLookup>,
    relocated_maps: Option<&dyn RelocatedLookup>,
) -> ResolveResult {
    let mut flags = 0u32;
    let addr = if addr.is_empty() {
        "postmaster".to_string()
    } else {
        addr.to_string()
    };

    let (local_part, domain, routed) = strip_local_domains(addr, is_local);
    if routed {
        flags |= FLAG_ROUTED;
    }

    let domain = domain.unwrap_or_else(|| cfg.myhostname.clone());
    let recipient = format!("{local_part}@{domain}");

    let mut channel;
    let mut nexthop;
    let mut saved_class_domain = cfg.myhostname.clone();
    let is_local_class = is_local.is_local(&domain);

    if !is_local_class {
        nexthop = domain.clone();
        saved_class_domain = domain.clone();

        let alias_hit = match virt_alias_domains {
            Some(m) => m.matches(&domain),
            None => Ok(false),
        };
        let mailbox_hit = match virt_mailbox_domains {
            Some(m) => m.matches(&domain),
            None => Ok(false),
        };

        match alias_hit {
            Ok(true) => {
                channel = cfg.error_transport.clone();
                nexthop = "User unknown in virtual alias table".to_string();
                saved_class_domain = cfg.myhostname.clone();
                flags |= CLASS_ALIAS;
            }
            Err(()) => {
                flags |= FLAG_FAIL;
                channel = cfg.default_transport.clone();
            }
            Ok(false) => match mailbox_hit {
                Ok(true) => {
                    channel = cfg.virtual_transport.clone();
                    nexthop = cfg.myhostname.clone();
                    saved_class_domain = cfg.myhostname.clone();
                    flags |= CLASS_VIRTUAL;
                }
                Err(()) => {
                    flags |= FLAG_FAIL;
                    channel = cfg.default_transport.clone();
                }
                Ok(false) => {
                    let relay_hit = match relay_domains {
                        Some(m) => m.matches(&domain),
                        None => Ok(false),
                    };
                    match relay_hit {
                        Ok(true) => {
                            channel = cfg.relay_transport.clone();
                            flags |= CLASS_RELAY;
                        }
                        Err(()) => {
                            flags |= FLAG_FAIL;
                            channel = cfg.default_transport.clone();
                        }
                        Ok(false) => {
                            channel = cfg.default_transport.clone();
                            flags |= CLASS_DEFAULT;
                        }
                    }
                    if flags & FLAG_FAIL == 0 {
                        if let Some(relayhost) = &cfg.relayhost {
                            if !relayhost.is_empty() {
                                nexthop = relayhost.clone();
                                if channel != cfg.error_transport {
                                    saved_class_domain = nexthop.clone();
                                }
                            }
                        }
                    }
                }
            },
        }

        let (base_channel, colon_dest) = split_channel(&channel);
        if let Some(dest) = colon_dest {
            channel = base_channel;
            nexthop = dest;
            if channel != cfg.error_transport {
                saved_class_domain = nexthop.clone();
            }
        }
    } else {
        channel = cfg.local_transport.clone();
        let (base_channel, colon_dest) = split_channel(&channel);
        channel = base_channel;
        nexthop = colon_dest.unwrap_or_else(|| cfg.myhostname.clone());
        if channel != cfg.error_transport {
            saved_class_domain = nexthop.clone();
        } else {
            saved_class_domain = cfg.myhostname.clone();
        }
        flags |= CLASS_LOCAL;
    }

    if flags & FLAG_FAIL == 0 {
        if let Some(tmaps) = transport_maps {
            let saved_channel = channel.clone();
            let saved_nexthop = nexthop.clone();
            match tmaps.lookup(&recipient) {
                Ok(Some((new_channel, new_nexthop))) => {
                    channel = new_channel;
                    nexthop = new_nexthop;
                    if channel != saved_channel && nexthop == saved_nexthop {
                        nexthop = if channel == cfg.error_transport {
                            "Address is not deliverable".to_string()
                        } else {
                            saved_class_domain.clone()
                        };
                    }
                }
                Ok(None) => {}
                Err(()) => {
                    flags |= FLAG_FAIL;
                }
            }
        }
    }

    if flags & FLAG_FAIL == 0 {
        if let Some(relocated) = relocated_maps {
            match relocated.lookup(&recipient) {
                Ok(Some(newloc)) => {
                    channel = cfg.error_transport.clone();
                    nexthop = format!("User has moved to {newloc}");
                }
                Ok(None) => {}
                Err(()) => {
                    flags |= FLAG_FAIL;
                }
            }
        }
    }

    ResolveResult {
        channel,
        nexthop,
        recipient,
        flags,
    }
}
