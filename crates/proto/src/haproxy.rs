//! HAProxy PROXY protocol ingest (§4.6): before any other I/O on a newly
//! accepted socket, peek the header, parse it, then consume exactly the
//! parsed length so the real payload is left untouched in the socket
//! buffer.
//!
//! Grounded on `haproxy_srvr.c`. Two wire formats: v1 is an ASCII line,
//! v2 is a 16-byte fixed header (12-byte signature + ver_cmd + fam + u16
//! length) followed by a fixed-size binary payload.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub const V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Inet,
    Inet6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyHeader {
    /// `PP2_CMD_LOCAL` (v2 only): the connection is not proxied; the
    /// caller must look up its own endpoints via getpeername.
    Local,
    Proxied {
        family: Family,
        src: SocketAddr,
        dst: SocketAddr,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum HaproxyError {
    /// Any failure - wrong length, non-numeric port, unsupported family,
    /// truncated buffer. Per §4.6 the caller substitutes an "unknown"
    /// surrogate endpoint rather than propagating this.
    Unknown(String),
}

/// Number of header bytes to `recv` off the socket after a successful
/// parse, consuming exactly what was examined during the `MSG_PEEK`.
pub struct Parsed {
    pub header: ProxyHeader,
    pub consumed: usize,
}

pub fn parse(peeked: &[u8]) -> Result<Parsed, HaproxyError> {
    if peeked.len() >= V2_SIGNATURE.len() && peeked[..V2_SIGNATURE.len()] == V2_SIGNATURE {
        parse_v2(peeked)
    } else {
        parse_v1(peeked)
    }
}

fn parse_v1(peeked: &[u8]) -> Result<Parsed, HaproxyError> {
    let nl = peeked
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| HaproxyError::Unknown("missing protocol header terminator".to_string()))?;
    let line = std::str::from_utf8(&peeked[..nl])
        .map_err(|_| HaproxyError::Unknown("bad or missing protocol header".to_string()))?;
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut fields = line.split(' ');
    if fields.next() != Some("PROXY") {
        return Err(HaproxyError::Unknown("bad or missing protocol header".to_string()));
    }
    let family = match fields.next() {
        Some("TCP4") => Family::Inet,
        Some("TCP6") => Family::Inet6,
        _ => return Err(HaproxyError::Unknown("bad or missing protocol type".to_string())),
    };
    let src_ip = fields.next();
    let dst_ip = fields.next();
    let sport = fields.next();
    let dport = fields.next();

    let src_ip = parse_addr_token(src_ip, family, "bad or missing client address")?;
    let dst_ip = parse_addr_token(dst_ip, family, "bad or missing server address")?;
    let sport = parse_port_token(sport, "bad or missing client port")?;
    let dport = parse_port_token(dport, "bad or missing server port")?;

    Ok(Parsed {
        header: ProxyHeader::Proxied {
            family,
            src: SocketAddr::new(src_ip, sport),
            dst: SocketAddr::new(dst_ip, dport),
        },
        consumed: nl + 1,
    })
}

fn parse_addr_token(token: Option<&str>, family: Family, err: &'static str) -> Result<IpAddr, HaproxyError> {
    let addr = token
        .and_then(|t| t.parse::<IpAddr>().ok())
        .map(normalize)
        .ok_or_else(|| HaproxyError::Unknown(err.to_string()))?;
    match (family, addr) {
        (Family::Inet, IpAddr::V4(_)) => Ok(addr),
        (Family::Inet6, IpAddr::V6(_)) => Ok(addr),
        (Family::Inet6, IpAddr::V4(_)) => Ok(addr),
        _ => Err(HaproxyError::Unknown(err.to_string())),
    }
}

fn parse_port_token(token: Option<&str>, err: &'static str) -> Result<u16, HaproxyError> {
    token
        .and_then(|t| t.parse::<u16>().ok())
        .ok_or_else(|| HaproxyError::Unknown(err.to_string()))
}

/// IPv4-in-IPv6 mapped addresses canonicalize down to plain IPv4, per
/// §4.6, so only one textual form of a given endpoint is ever logged.
fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        other => other,
    }
}

const HEADER_LEN: usize = 16;

fn parse_v2(peeked: &[u8]) -> Result<Parsed, HaproxyError> {
    if peeked.len() < HEADER_LEN {
        return Err(HaproxyError::Unknown("v2 header truncated".to_string()));
    }
    let ver_cmd = peeked[12];
    let version = ver_cmd >> 4;
    let command = ver_cmd & 0x0F;
    if version != 2 {
        return Err(HaproxyError::Unknown(format!("unsupported version {version}")));
    }
    let fam_byte = peeked[13];
    let af = fam_byte >> 4;
    let len = u16::from_be_bytes([peeked[14], peeked[15]]) as usize;
    let total = HEADER_LEN + len;
    if peeked.len() < total {
        return Err(HaproxyError::Unknown("v2 payload truncated".to_string()));
    }
    let payload = &peeked[HEADER_LEN..total];

    match command {
        0x0 => Ok(Parsed {
            header: ProxyHeader::Local,
            consumed: total,
        }),
        0x1 => {
            let (family, src, dst) = parse_v2_payload(af, payload)?;
            Ok(Parsed {
                header: ProxyHeader::Proxied { family, src, dst },
                consumed: total,
            })
        }
        other => Err(HaproxyError::Unknown(format!("unsupported command {other}"))),
    }
}

fn parse_v2_payload(af: u8, payload: &[u8]) -> Result<(Family, SocketAddr, SocketAddr), HaproxyError> {
    match af {
        0x1 => {
            if payload.len() < 12 {
                return Err(HaproxyError::Unknown("v2 IPv4 payload too short".to_string()));
            }
            let src_ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
            let dst_ip = Ipv4Addr::new(payload[4], payload[5], payload[6], payload[7]);
            let sport = u16::from_be_bytes([payload[8], payload[9]]);
            let dport = u16::from_be_bytes([payload[10], payload[11]]);
            Ok((
                Family::Inet,
                SocketAddr::new(IpAddr::V4(src_ip), sport),
                SocketAddr::new(IpAddr::V4(dst_ip), dport),
            ))
        }
        0x2 => {
            if payload.len() < 36 {
                return Err(HaproxyError::Unknown("v2 IPv6 payload too short".to_string()));
            }
            let mut src_octets = [0u8; 16];
            let mut dst_octets = [0u8; 16];
            src_octets.copy_from_slice(&payload[0..16]);
            dst_octets.copy_from_slice(&payload[16..32]);
            let sport = u16::from_be_bytes([payload[32], payload[33]]);
            let dport = u16::from_be_bytes([payload[34], payload[35]]);
            let src_addr = normalize(IpAddr::V6(Ipv6Addr::from(src_octets)));
            let dst_addr = normalize(IpAddr::V6(Ipv6Addr::from(dst_octets)));
            Ok((
                Family::Inet6,
                SocketAddr::new(src_addr, sport),
                SocketAddr::new(dst_addr, dport),
            ))
        }
        other => Err(HaproxyError::Unknown(format!("unsupported family {other}"))),
    }
}
