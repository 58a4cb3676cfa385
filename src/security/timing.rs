//! Timing attack protection utilities
//!
//! Used for the shared server password so a client cannot learn how much of
//! a guess was correct from response latency.

use sha2::{Digest, Sha256};

/// Constant-time byte array comparison
pub fn constant_time_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Compare a password attempt against the expected one
///
/// Both sides are hashed first so the comparison does not leak the
/// expected password's length either.
pub fn passwords_match(attempt: &str, expected: &str) -> bool {
    let attempt = Sha256::digest(attempt.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    constant_time_eq_bytes(attempt.as_slice(), expected.as_slice())
}
