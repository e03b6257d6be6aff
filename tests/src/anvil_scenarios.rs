use anvil::AnvilTable;

#[test]
fn s5_anvil_connect_twice_within_window() {
    let mut table = AnvilTable::new(60);
    let local_id = 1u64;
    let ident = "smtpd:1.2.3.4";

    let first = table.connect(local_id, ident, 1000);
    assert_eq!(first.count, 1);
    assert_eq!(first.rate, 1);

    let second = table.connect(local_id, ident, 1001);
    assert_eq!(second.count, 2);
    assert_eq!(second.rate, 2);

    let expiry = table.disconnect(local_id, ident, 1001);
    assert!(expiry.is_none(), "one connection still live after a single disconnect");

    let expiry = table.disconnect(local_id, ident, 1001);
    let expiry = expiry.expect("last disconnect arms an expiry timer");
    assert_eq!(expiry.at, 1001 + 60);

    // The entry is still present until the armed timer actually fires.
    assert_eq!(table.lookup(ident).map(|s| s.count), Some(0));
    table.expire(ident);
    assert!(table.lookup(ident).is_none());
}
