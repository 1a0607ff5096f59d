//! Key Generation
//!
//! Sequential, ordered string keys for rows in the backing store. A key is a
//! base-36 numeral over `[0-9a-z]` with no leading zero (except `"0"` itself), so
//! ordering by length and then bytes agrees with numeric order.

use crate::error::KeyError;
use std::cmp::Ordering;

/// The first key handed out by every key table.
pub const FIRST_KEY: &str = "0";

/// Longest key `next_key` will ever produce. Reaching it means the key counter
/// is corrupt, not that the store is full.
pub const MAX_KEY_SIZE: usize = 200;

/// Parse a run of ASCII digits into an unsigned value no larger than `max`.
///
/// Returns the value and the number of bytes consumed. Parsing stops at the
/// first non-digit. A consumed length of zero means failure: no digits, or a
/// value that would exceed `max`.
pub fn parse_bounded(data: &[u8], max: u64) -> (u64, usize) {
    let cutoff = max / 10;
    let cutlim = max % 10;
    let mut value: u64 = 0;
    let mut consumed = 0;

    for &byte in data {
        if !byte.is_ascii_digit() {
            break;
        }
        let digit = u64::from(byte - b'0');
        if value > cutoff || (value == cutoff && digit > cutlim) {
            return (0, 0);
        }
        value = value * 10 + digit;
        consumed += 1;
    }

    if consumed == 0 {
        return (0, 0);
    }
    (value, consumed)
}

/// Write `value` in decimal into `buf`.
///
/// Returns the number of bytes written, or 0 if the digits do not fit.
pub fn format(value: u64, buf: &mut [u8]) -> usize {
    let mut remaining = value;
    let mut written = 0;

    loop {
        if written == buf.len() {
            return 0;
        }
        buf[written] = b'0' + (remaining % 10) as u8;
        written += 1;
        remaining /= 10;
        if remaining == 0 {
            break;
        }
    }

    buf[..written].reverse();
    written
}

/// Compute the key following `current`.
///
/// Fails on an empty key, on any character outside `[0-9a-z]`, and on a
/// leading `'0'` in a key longer than one character.
///
/// # Panics
///
/// Panics if the result would be longer than [`MAX_KEY_SIZE`].
pub fn next_key(current: &str) -> Result<String, KeyError> {
    let bytes = current.as_bytes();
    if bytes.is_empty() || (bytes.len() > 1 && bytes[0] == b'0') {
        return Err(KeyError::InvalidKey(current.to_string()));
    }

    let mut next = bytes.to_vec();
    let mut carry = true;
    for digit in next.iter_mut().rev() {
        let incremented = match *digit {
            b'0'..=b'8' | b'a'..=b'y' => *digit + 1,
            b'9' => b'a',
            b'z' => b'0',
            _ => return Err(KeyError::InvalidKey(current.to_string())),
        };
        if carry {
            *digit = incremented;
            carry = *digit == b'0';
        }
    }

    if carry {
        next.insert(0, b'1');
    }

    assert!(
        next.len() <= MAX_KEY_SIZE,
        "key generation overflowed MAX_KEY_SIZE ({}) after {:?}",
        MAX_KEY_SIZE,
        current
    );

    // Every byte is in [0-9a-z].
    Ok(next.into_iter().map(char::from).collect())
}

/// Order two keys. Longer keys are larger; equal-length keys compare bytewise.
pub fn compare(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

/// Two absent keys are the same; otherwise both must be present and equal.
pub fn same(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Encode a key for a byte-ordered store so that native order equals `compare`.
///
/// The length goes first as one byte; keys never exceed [`MAX_KEY_SIZE`].
pub fn encode_ordered(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(key.len() as u8);
    out.extend_from_slice(key.as_bytes());
    out
}

/// Inverse of [`encode_ordered`].
pub fn decode_ordered(bytes: &[u8]) -> Result<String, KeyError> {
    let invalid = || KeyError::InvalidKey(String::from_utf8_lossy(bytes).into_owned());
    let (&len, rest) = bytes.split_first().ok_or_else(invalid)?;
    if usize::from(len) != rest.len() {
        return Err(invalid());
    }
    String::from_utf8(rest.to_vec()).map_err(|_| invalid())
}
