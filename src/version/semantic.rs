//! Version string parsing and ordering
//!
//! Versions look like `major.minor.patch`. Trailing parts may be left out
//! (`"0.4"` is `0.4.0`); anything else is rejected instead of being
//! compared as text.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version {0:?}: empty")]
    Empty(String),

    #[error("invalid version {0:?}: too many parts")]
    TooManyParts(String),

    #[error("invalid version {version:?}: failed to parse {part:?}")]
    InvalidPart { version: String, part: String },
}

/// A parsed protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ProtocolVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }
}

impl FromStr for ProtocolVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionError::Empty(s.to_string()));
        }

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionError::TooManyParts(s.to_string()));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            // u64::from_str accepts a leading '+', which is not a version digit
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::InvalidPart {
                    version: s.to_string(),
                    part: part.to_string(),
                });
            }
            *slot = part.parse().map_err(|_| VersionError::InvalidPart {
                version: s.to_string(),
                part: part.to_string(),
            })?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Returns true when `a >= b`. Either string failing to parse is an error.
pub fn greater_or_equal(a: &str, b: &str) -> Result<bool, VersionError> {
    let a: ProtocolVersion = a.parse()?;
    let b: ProtocolVersion = b.parse()?;
    Ok(a >= b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_full_version() {
        let v: ProtocolVersion = "0.3.1".parse().unwrap();
        assert_eq!(v, ProtocolVersion::new(0, 3, 1));
        assert_eq!(v.to_string(), "0.3.1");
    }

    #[test]
    fn parse_short_versions() {
        assert_eq!("1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::new(1, 0, 0));
        assert_eq!("0.4".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::new(0, 4, 0));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!("".parse::<ProtocolVersion>(), Err(VersionError::Empty(_))));
        assert!(matches!(
            "1.2.3.4".parse::<ProtocolVersion>(),
            Err(VersionError::TooManyParts(_))
        ));
        assert!(matches!(
            "0.x.1".parse::<ProtocolVersion>(),
            Err(VersionError::InvalidPart { .. })
        ));
        assert!("0..1".parse::<ProtocolVersion>().is_err());
        assert!("+1.0.0".parse::<ProtocolVersion>().is_err());
        assert!("v0.4.0".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert!(greater_or_equal("0.10.0", "0.9.0").unwrap());
        assert!(!greater_or_equal("0.9.0", "0.10.0").unwrap());
        assert!(greater_or_equal("0.4.0", "0.4.0").unwrap());
        assert!(greater_or_equal("0.4", "0.4.0").unwrap());
    }

    #[test]
    fn greater_or_equal_propagates_decode_errors() {
        assert!(greater_or_equal("banana", "0.4.0").is_err());
        assert!(greater_or_equal("0.4.0", "1.2.3.4").is_err());
    }

    proptest! {
        #[test]
        fn ordering_matches_tuples(a in (0u64..50, 0u64..50, 0u64..50), b in (0u64..50, 0u64..50, 0u64..50)) {
            let sa = format!("{}.{}.{}", a.0, a.1, a.2);
            let sb = format!("{}.{}.{}", b.0, b.1, b.2);
            prop_assert_eq!(greater_or_equal(&sa, &sb).unwrap(), a >= b);
        }

        #[test]
        fn display_round_trips(major in 0u64..1000, minor in 0u64..1000, patch in 0u64..1000) {
            let v = ProtocolVersion::new(major, minor, patch);
            prop_assert_eq!(v.to_string().parse::<ProtocolVersion>().unwrap(), v);
        }
    }
}
