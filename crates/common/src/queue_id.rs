//! Queue-id generation: microsecond-resolution timestamps encoded in a
//! 52-symbol alphabet so ids stay distinct and sortable on case-insensitive
//! filesystems (§6).

use std::time::{SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Encodes `micros` (microseconds since the epoch) as base-52, most
/// significant symbol first, with no fixed width (matching Postfix's
/// variable-length queue ids).
pub fn encode_base52(mut value: u64) -> String {
    if value == 0 {
        return (ALPHABET[0] as char).to_string();
    }
    let mut symbols = Vec::new();
    while value > 0 {
        symbols.push(ALPHABET[(value % 52) as usize]);
        value /= 52;
    }
    symbols.reverse();
    String::from_utf8(symbols).expect("alphabet is ASCII")
}

/// Generates a new queue-id from the current wall clock. Collisions within
/// the same microsecond are avoided by the caller's allocator (a process
/// that holds the queue-id lock serially increments a reservation rather
/// than sampling the clock twice for adjacent ids).
pub fn generate() -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    encode_base52(micros)
}
