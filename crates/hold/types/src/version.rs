//! Spec version counter
//!
//! Versions are positive integers, persisted and exchanged as decimal
//! strings (`"1"`, `"2"`, ...). A cargo's first spec is [`SpecVersion::FIRST`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a persisted or caller supplied version tag is not a
/// positive integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid spec version `{0}`: expected a positive integer")]
pub struct InvalidVersion(pub String);

/// Version tag of a cargo spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpecVersion(u64);

impl SpecVersion {
    pub const FIRST: SpecVersion = SpecVersion(1);

    /// Zero is not a valid version.
    pub fn new(value: u64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The version following this one, `None` once the counter is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SpecVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidVersion(s.to_string()))
    }
}

impl TryFrom<String> for SpecVersion {
    type Error = InvalidVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpecVersion> for String {
    fn from(version: SpecVersion) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_version_token() {
        assert_eq!(SpecVersion::FIRST.to_string(), "1");
        assert_eq!("1".parse::<SpecVersion>().unwrap(), SpecVersion::FIRST);
    }

    #[test]
    fn test_rejects_non_positive() {
        assert!("0".parse::<SpecVersion>().is_err());
        assert!("-3".parse::<SpecVersion>().is_err());
        assert!("v1.0".parse::<SpecVersion>().is_err());
        assert!(SpecVersion::new(0).is_none());
    }

    #[test]
    fn test_counter_exhaustion() {
        assert!(SpecVersion::new(u64::MAX).unwrap().next().is_none());
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_value(SpecVersion::new(12).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!("12"));
        let back: SpecVersion = serde_json::from_value(json).unwrap();
        assert_eq!(back.get(), 12);
        assert!(serde_json::from_value::<SpecVersion>(serde_json::json!("abc")).is_err());
    }

    proptest! {
        #[test]
        fn next_is_strictly_greater(n in 1u64..u64::MAX) {
            let v = SpecVersion::new(n).unwrap();
            let next = v.next().unwrap();
            prop_assert!(next > v);
            prop_assert_eq!(next.get(), n + 1);
        }

        #[test]
        fn ordering_matches_numeric_not_lexical(a in 1u64..100_000, b in 1u64..100_000) {
            let va = SpecVersion::new(a).unwrap();
            let vb = SpecVersion::new(b).unwrap();
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}
