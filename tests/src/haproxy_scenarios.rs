use proto::haproxy::{parse, Family, HaproxyError, ProxyHeader};

#[test]
fn s3_haproxy_v1_good() {
    let input = b"PROXY TCP4 1.2.3.4 4.3.2.1 123 321\n";
    let parsed = parse(input).expect("well-formed v1 header parses");
    match parsed.header {
        ProxyHeader::Proxied { family, src, dst } => {
            assert_eq!(family, Family::Inet);
            assert_eq!(src.ip().to_string(), "1.2.3.4");
            assert_eq!(src.port(), 123);
            assert_eq!(dst.ip().to_string(), "4.3.2.1");
            assert_eq!(dst.port(), 321);
        }
        ProxyHeader::Local => panic!("expected a proxied header"),
    }
}

#[test]
fn s4_haproxy_v1_short() {
    let input = b"PROXY TCP4\n";
    let err = parse(input).unwrap_err();
    assert_eq!(err, HaproxyError::Unknown("bad or missing client address".to_string()));
}
