//! Framed attribute IPC (§4.1): the wire protocol daemons use to talk to
//! the resolver, rewriter, anvil, flush, and postscreen-helper services.
//!
//! An attribute list is a sequence of named, typed values terminated by
//! an end marker - the empty attribute (`@\n`) in text form, a
//! zero-length name in binary form. A stream picks one serialization and
//! keeps it for its lifetime.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Str(String),
    Hash(Vec<(String, String)>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ProtoError {
    LineTooLong,
    Malformed(String),
    MissingStrict(&'static str),
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoError::LineTooLong => write!(f, "attribute line exceeds line_length_limit"),
            ProtoError::Malformed(s) => write!(f, "malformed attribute: {s}"),
            ProtoError::MissingStrict(name) => {
                write!(f, "missing required attribute: {name}")
            }
        }
    }
}

impl std::error::Error for ProtoError {}

pub enum Format {
    Text,
    Binary,
}

/// A single attribute's declared name and whether a reader should treat
/// its absence as fatal (`strict`) or tolerate it (paired with a
/// `MISSING` flag upstream).
pub struct AttrSpec {
    pub name: &'static str,
    pub strict: bool,
}

pub const TERMINATOR_TEXT: &str = "@\n";

pub fn encode_text(attrs: &[(&str, AttrValue)]) -> String {
    let mut out = String::new();
    for (name, value) in attrs {
        match value {
            AttrValue::Int(v) => out.push_str(&format!("{name}={v}\n")),
            AttrValue::Str(s) => out.push_str(&format!("{name}={s}\n")),
            AttrValue::Hash(pairs) => {
                out.push_str(&format!("{name}_count={}\n", pairs.len()));
                for (i, (k, v)) in pairs.iter().enumerate() {
                    out.push_str(&format!("{name}_key{i}={k}\n"));
                    out.push_str(&format!("{name}_value{i}={v}\n"));
                }
            }
        }
    }
    out.push_str(TERMINATOR_TEXT);
    out
}

/// Parses a text-form attribute stream up to (and consuming) the
/// terminator. Lines longer than `line_length_limit` abort the whole
/// read, matching the "drop the connection" behavior in §4.1.
pub fn decode_text(
    input: &str,
    line_length_limit: usize,
) -> Result<Vec<(String, AttrValue)>, ProtoError> {
    let mut attrs: Vec<(String, AttrValue)> = Vec::new();
    let mut hashes: HashMap<String, (usize, Vec<(String, String)>)> = HashMap::new();

    for line in input.split('\n') {
        if line.len() > line_length_limit {
            return Err(ProtoError::LineTooLong);
        }
        if line.is_empty() {
            continue;
        }
        if line == "@" {
            break;
        }
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| ProtoError::Malformed(line.to_string()))?;

        if let Some(base) = name.strip_suffix("_count") {
            let count: usize = value
                .parse()
                .map_err(|_| ProtoError::Malformed(line.to_string()))?;
            hashes.insert(base.to_string(), (count, Vec::new()));
            continue;
        }
        if let Some(rest) = find_hash_field(name, "_key") {
            let entry = hashes
                .entry(rest.to_string())
                .or_insert_with(|| (0, Vec::new()));
            entry.1.push((value.to_string(), String::new()));
            continue;
        }
        if let Some(rest) = find_hash_field(name, "_value") {
            let entry = hashes
                .entry(rest.to_string())
                .or_insert_with(|| (0, Vec::new()));
            if let Some(last) = entry.1.last_mut() {
                last.1 = value.to_string();
            }
            continue;
        }

        let parsed = if let Ok(i) = value.parse::<i64>() {
            AttrValue::Int(i)
        } else {
            AttrValue::Str(value.to_string())
        };
        attrs.push((name.to_string(), parsed));
    }

    for (name, (_, pairs)) in hashes {
        attrs.push((name, AttrValue::Hash(pairs)));
    }
    Ok(attrs)
}

fn find_hash_field<'a>(name: &'a str, suffix_prefix: &str) -> Option<&'a str> {
    let idx = name.find(suffix_prefix)?;
    let (base, rest) = name.split_at(idx);
    let digits = &rest[suffix_prefix.len()..];
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(base)
    } else {
        None
    }
}

pub fn encode_binary(attrs: &[(&str, AttrValue)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in attrs {
        write_name(&mut out, name);
        match value {
            AttrValue::Int(v) => {
                out.push(0);
                out.extend_from_slice(&v.to_be_bytes());
            }
            AttrValue::Str(s) => {
                out.push(1);
                write_bytes(&mut out, s.as_bytes());
            }
            AttrValue::Hash(pairs) => {
                out.push(2);
                out.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
                for (k, v) in pairs {
                    write_bytes(&mut out, k.as_bytes());
                    write_bytes(&mut out, v.as_bytes());
                }
            }
        }
    }
    out.extend_from_slice(&0u32.to_be_bytes());
    out
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(&(name.len() as u32).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

pub fn decode_binary(input: &[u8]) -> Result<Vec<(String, AttrValue)>, ProtoError> {
    let mut attrs = Vec::new();
    let mut pos = 0usize;
    loop {
        let name_len = read_u32(input, &mut pos)?;
        if name_len == 0 {
            break;
        }
        let name = read_str(input, &mut pos, name_len as usize)?;
        let tag = read_u8(input, &mut pos)?;
        let value = match tag {
            0 => {
                let bytes = read_exact(input, &mut pos, 8)?;
                AttrValue::Int(i64::from_be_bytes(bytes.try_into().unwrap()))
            }
            1 => {
                let len = read_u32(input, &mut pos)?;
                AttrValue::Str(read_str(input, &mut pos, len as usize)?)
            }
            2 => {
                let count = read_u32(input, &mut pos)?;
                let mut pairs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let klen = read_u32(input, &mut pos)?;
                    let key = read_str(input, &mut pos, klen as usize)?;
                    let vlen = read_u32(input, &mut pos)?;
                    let value = read_str(input, &mut pos, vlen as usize)?;
                    pairs.push((key, value));
                }
                AttrValue::Hash(pairs)
            }
            other => return Err(ProtoError::Malformed(format!("unknown type tag {other}"))),
        };
        attrs.push((name, value));
    }
    Ok(attrs)
}

fn read_u8(input: &[u8], pos: &mut usize) -> Result<u8, ProtoError> {
    let b = *input
        .get(*pos)
        .ok_or_else(|| ProtoError::Malformed("truncated stream".to_string()))?;
    *pos += 1;
    Ok(b)
}

fn read_u32(input: &[u8], pos: &mut usize) -> Result<u32, ProtoError> {
    let bytes = read_exact(input, pos, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_exact<'a>(input: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], ProtoError> {
    let end = *pos + len;
    let slice = input
        .get(*pos..end)
        .ok_or_else(|| ProtoError::Malformed("truncated stream".to_string()))?;
    *pos = end;
    Ok(slice)
}

fn read_str(input: &[u8], pos: &mut usize, len: usize) -> Result<String, ProtoError> {
    let bytes = read_exact(input, pos, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtoError::Malformed("non-utf8 bytes".to_string()))
}

/// Validates a decoded attribute list against `specs`: a `strict` name
/// absent from `received` is an error; others resolve to `None`.
pub fn scan(
    received: &[(String, AttrValue)],
    specs: &[AttrSpec],
) -> Result<Vec<Option<AttrValue>>, ProtoError> {
    let index: HashMap<&str, &AttrValue> = received
        .iter()
        .map(|(name, value)| (name.as_str(), value))
        .collect();
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        match index.get(spec.name) {
            Some(value) => out.push(Some((*value).clone())),
            None if spec.strict => return Err(ProtoError::MissingStrict(spec.name)),
            None => out.push(None),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_roundtrip_preserves_int_and_str() {
        let attrs: Vec<(&str, AttrValue)> = vec![
            ("request", AttrValue::Str("resolve".to_string())),
            ("flags", AttrValue::Int(-1)),
        ];
        let wire = encode_text(&attrs);
        let decoded = decode_text(&wire, 4096).unwrap();
        assert_eq!(decoded[0], ("request".to_string(), AttrValue::Str("resolve".to_string())));
        assert_eq!(decoded[1], ("flags".to_string(), AttrValue::Int(-1)));
    }

    #[test]
    fn text_roundtrip_preserves_hash() {
        let attrs: Vec<(&str, AttrValue)> = vec![(
            "env",
            AttrValue::Hash(vec![
                ("SENDER".to_string(), "a@example.com".to_string()),
                ("SIZE".to_string(), "1024".to_string()),
            ]),
        )];
        let wire = encode_text(&attrs);
        let decoded = decode_text(&wire, 4096).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "env");
        match &decoded[0].1 {
            AttrValue::Hash(pairs) => assert_eq!(pairs.len(), 2),
            _ => panic!("expected hash"),
        }
    }

    #[test]
    fn overlong_line_is_rejected() {
        let wire = "request=resolve\n@\n";
        assert!(matches!(decode_text(wire, 5), Err(ProtoError::LineTooLong)));
    }

    #[test]
    fn binary_roundtrip() {
        let attrs: Vec<(&str, AttrValue)> = vec![
            ("addr", AttrValue::Str("10.0.0.1".to_string())),
            ("count", AttrValue::Int(42)),
        ];
        let wire = encode_binary(&attrs);
        let decoded = decode_binary(&wire).unwrap();
        assert_eq!(decoded[0].1.as_str(), Some("10.0.0.1"));
        assert_eq!(decoded[1].1.as_int(), Some(42));
    }

    #[test]
    fn scan_rejects_missing_strict_attribute() {
        let received = vec![("request".to_string(), AttrValue::Str("resolve".to_string()))];
        let specs = [
            AttrSpec { name: "request", strict: true },
            AttrSpec { name: "addr", strict: true },
        ];
        assert!(matches!(
            scan(&received, &specs),
            Err(ProtoError::MissingStrict("addr"))
        ));
    }

    #[test]
    fn scan_allows_missing_non_strict_attribute() {
        let received = vec![("request".to_string(), AttrValue::Str("resolve".to_string()))];
        let specs = [
            AttrSpec { name: "request", strict: true },
            AttrSpec { name: "flags", strict: false },
        ];
        let result = scan(&received, &specs).unwrap();
        assert_eq!(result[1], None);
    }
}
