//! Deterministic cache keys
//!
//! A key is derived from the function name, the positional arguments in
//! call order, and the keyword arguments sorted by name. The combination is
//! hashed with SHA256 so stored keys never reveal argument values such as
//! server-side file paths.

use crate::error::LyraResult;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one memoized call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    function: String,
    args: Vec<String>,
    kwargs: BTreeMap<String, String>,
}

impl CacheKey {
    /// Start a key for the named function
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Append a positional argument
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> LyraResult<Self> {
        self.args.push(serde_json::to_string(value)?);
        Ok(self)
    }

    /// Add a keyword argument; order of calls does not matter
    pub fn kwarg<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> LyraResult<Self> {
        self.kwargs
            .insert(name.into(), serde_json::to_string(value)?);
        Ok(self)
    }

    /// Name of the function this key belongs to
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Readable form used for logging: `name(args){kwargs}`
    pub fn signature(&self) -> String {
        let kwargs: Vec<String> = self
            .kwargs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!(
            "{}({}){{{}}}",
            self.function,
            self.args.join(", "),
            kwargs.join(", ")
        )
    }

    /// Hex encoded SHA256 of the signature
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signature().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kwarg_order_does_not_change_digest() {
        let a = CacheKey::new("f")
            .kwarg("a", &1)
            .unwrap()
            .kwarg("b", &2)
            .unwrap();
        let b = CacheKey::new("f")
            .kwarg("b", &2)
            .unwrap()
            .kwarg("a", &1)
            .unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn positional_order_changes_digest() {
        let a = CacheKey::new("f").arg(&1).unwrap().arg(&2).unwrap();
        let b = CacheKey::new("f").arg(&2).unwrap().arg(&1).unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn function_name_is_part_of_key() {
        let a = CacheKey::new("upstream").arg(&10).unwrap();
        let b = CacheKey::new("downstream").arg(&10).unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_is_fixed_length_hex() {
        let key = CacheKey::new("load")
            .arg("/srv/data/secret/rsb.json")
            .unwrap();
        let digest = key.digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!digest.contains("secret"));
    }

    #[test]
    fn none_and_missing_kwarg_differ() {
        let a = CacheKey::new("f")
            .kwarg("source", &Option::<String>::None)
            .unwrap();
        let b = CacheKey::new("f");
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.signature(), "f(){source=null}");
    }
}
