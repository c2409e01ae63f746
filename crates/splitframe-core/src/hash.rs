//! Deterministic structural tokens.
//!
//! A node's token is a blake3 digest over its kind and operand fingerprints,
//! where child operands contribute their own tokens. Two structurally
//! identical subtrees always produce the same token, which is what the arena
//! uses for deduplication and what lowering uses for stable task-key names.

use serde::Serialize;

use crate::error::{Error, Result};

/// 256-bit structural token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub [u8; 32]);

impl Token {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    /// Short prefix used in task-key names and diagnostics.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Hash any serde-serializable value into a `Token`.
///
/// Serialization goes through canonical JSON; struct fields serialize in
/// declaration order, so the digest is deterministic across runs.
pub fn hash_serde<T: Serialize>(value: &T) -> Result<Token> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(Token(*blake3::hash(&bytes).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_values_hash_identically() {
        let a = hash_serde(&("filter", vec!["x", "y"])).unwrap();
        let b = hash_serde(&("filter", vec!["x", "y"])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_values_hash_differently() {
        let a = hash_serde(&("filter", 1u32)).unwrap();
        let b = hash_serde(&("project", 1u32)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn short_is_a_prefix_of_hex() {
        let t = hash_serde(&"scan").unwrap();
        assert!(t.to_hex().starts_with(&t.short()));
        assert_eq!(t.short().len(), 12);
    }
}
