use resolve::resolver::{resolve_addr, DomainListMatch, LocalDomainCheck, ResolveConfig, CLASS_LOCAL, CLASS_RELAY};

struct OnlyLocal(&'static str);
impl LocalDomainCheck for OnlyLocal {
    fn is_local(&self, domain: &str) -> bool {
        domain == self.0
    }
}

struct NeverLocal;
impl LocalDomainCheck for NeverLocal {
    fn is_local(&self, _domain: &str) -> bool {
        false
    }
}

struct ListMatch(&'static [&'static str]);
impl DomainListMatch for ListMatch {
    fn matches(&self, domain: &str) -> Result<bool, ()> {
        Ok(self.0.contains(&domain))
    }
}

fn config() -> ResolveConfig {
    ResolveConfig {
        myhostname: "h".to_string(),
        relayhost: None,
        default_transport: "smtp".to_string(),
        local_transport: "local".to_string(),
        relay_transport: "relay".to_string(),
        virtual_transport: "virtual".to_string(),
        error_transport: "error".to_string(),
    }
}

#[test]
fn s1_resolver_local() {
    let cfg = config();
    let result = resolve_addr("user@h", &cfg, &OnlyLocal("h"), None, None, None, None, None);
    assert_eq!(result.channel, "local");
    assert_eq!(result.nexthop, "h");
    assert_eq!(result.recipient, "user@h");
    assert_eq!(result.flags & CLASS_LOCAL, CLASS_LOCAL);
}

#[test]
fn s2_resolver_relay_with_relayhost() {
    let mut cfg = config();
    cfg.relayhost = Some("[gw]:25".to_string());
    let relay_domains = ListMatch(&["example.com"]);
    let result = resolve_addr(
        "u@example.com",
        &cfg,
        &NeverLocal,
        None,
        None,
        Some(&relay_domains),
        None,
        None,
    );
    assert_eq!(result.channel, "relay");
    assert_eq!(result.nexthop, "[gw]:25");
    assert_eq!(result.recipient, "u@example.com");
    assert_eq!(result.flags & CLASS_RELAY, CLASS_RELAY);
}

#[test]
fn fully_qualified_local_address_round_trips_without_override_maps() {
    let cfg = config();
    let result = resolve_addr("someone@h", &cfg, &OnlyLocal("h"), None, None, None, None, None);
    assert_eq!(result.channel, "local");
    assert_eq!(result.nexthop, "h");
    assert_eq!(result.recipient, "someone@h");
}
