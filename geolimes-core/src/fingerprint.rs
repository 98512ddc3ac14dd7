//! Dataset fingerprints.
//!
//! A fingerprint is the SHA-256 digest (hex) of the canonical form of a
//! dataset's selection query, built with offset 0 and no limit. Offset, limit
//! and chunk size are per-request parameters and never part of the identity.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 64;

/// Deterministic identity of a dataset request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a query text. The text is canonicalised first, so
    /// queries differing only in whitespace or brace spacing collide.
    pub fn of_query(query: &str) -> Self {
        let canonical = canonicalize_query(query);
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(digest))
    }

    /// Parse a previously computed fingerprint.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::InvalidFingerprint(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Normalise query text for hashing.
///
/// Line breaks and tabs become spaces, runs of spaces collapse to one, an
/// opening brace (with at most one space on each side) becomes `" {"` and a
/// closing brace becomes `"} "`.
pub fn canonicalize_query(query: &str) -> String {
    let mut collapsed = String::with_capacity(query.len());
    let mut prev_space = false;
    for c in query.chars() {
        let c = if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c };
        if c == ' ' {
            if !prev_space {
                collapsed.push(' ');
            }
            prev_space = true;
        } else {
            collapsed.push(c);
            prev_space = false;
        }
    }

    let opened = rewrite_brace(&collapsed, '{', " {");
    rewrite_brace(&opened, '}', "} ")
}

/// Replace every `[ ]?<brace>[ ]?` with `replacement`, scanning left to right
/// without overlap.
fn rewrite_brace(input: &str, brace: char, replacement: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let starts_here = chars[i] == brace;
        let space_then_brace = chars[i] == ' ' && chars.get(i + 1) == Some(&brace);
        if starts_here || space_then_brace {
            i += if space_then_brace { 2 } else { 1 };
            if chars.get(i) == Some(&' ') {
                i += 1;
            }
            out.push_str(replacement);
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
