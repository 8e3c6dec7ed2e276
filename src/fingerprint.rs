//! Content fingerprints used as audit-log primary keys.
//!
//! A fingerprint is a pure function of `(platform, poster, normalized content prefix)`.
//! It is an idempotency key, not a security boundary: collisions are tolerated.

/// Number of characters of normalized content that take part in the fingerprint
/// (and that are kept in an audit entry).
pub const CONTENT_PREFIX_CHARS: usize = 1000;

const FIELD_SEP: char = '|';

/// Trim, collapse whitespace runs to a single space, lower-case, keep the first 1000 chars.
pub fn normalize_content(content: &str) -> String {
    let mut out = String::with_capacity(content.len().min(CONTENT_PREFIX_CHARS));
    let mut taken = 0usize;
    for word in content.split_whitespace() {
        if taken > 0 {
            if taken == CONTENT_PREFIX_CHARS {
                break;
            }
            out.push(' ');
            taken += 1;
        }
        for ch in word.chars().flat_map(char::to_lowercase) {
            if taken == CONTENT_PREFIX_CHARS {
                return out;
            }
            out.push(ch);
            taken += 1;
        }
    }
    out
}

/// Derive the fingerprint for a post.
pub fn fingerprint(content: &str, poster: &str, platform: &str) -> String {
    let normalized = normalize_content(content);
    let mut key = String::with_capacity(platform.len() + poster.len() + normalized.len() + 2);
    key.push_str(platform);
    key.push(FIELD_SEP);
    key.push_str(poster);
    key.push(FIELD_SEP);
    key.push_str(&normalized);
    to_base36(rolling_hash(&key).unsigned_abs())
}

/// 32-bit `h * 31 + c` over UTF-16 code units, wrapping on overflow.
fn rolling_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(unit as i32)
    })
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(7);
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}
