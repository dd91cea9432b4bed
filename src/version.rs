//! Chain versions. Headers carry their version as a byte string; rule
//! activation is gated by comparing versions in their release order, so the
//! enum ordering below is protocol-critical.

use std::fmt;

/// Known chain versions, oldest first. `Ord` follows release order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Alpha,
    Beta,
    Gamma,
    Delta,
    /// First version with the AI-inference sealing stage.
    AiMine,
}

impl Version {
    /// Canonical byte string stored in headers.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Version::Alpha => b"1.0.0",
            Version::Beta => b"1.1.0",
            Version::Gamma => b"1.2.0",
            Version::Delta => b"1.3.0",
            Version::AiMine => b"1.4.0",
        }
    }

    /// Parse a header's version field. Unknown strings are rejected rather
    /// than defaulted: an unrecognized version must never pick up rules.
    pub fn parse(bytes: &[u8]) -> Option<Version> {
        match bytes {
            b"1.0.0" => Some(Version::Alpha),
            b"1.1.0" => Some(Version::Beta),
            b"1.2.0" => Some(Version::Gamma),
            b"1.3.0" => Some(Version::Delta),
            b"1.4.0" => Some(Version::AiMine),
            _ => None,
        }
    }

    pub fn all() -> [Version; 5] {
        [
            Version::Alpha,
            Version::Beta,
            Version::Gamma,
            Version::Delta,
            Version::AiMine,
        ]
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::str::from_utf8(self.as_bytes()).unwrap_or("?"))
    }
}

/// True when `bytes` parses to a version at or above `at_least`.
pub fn version_at_least(bytes: &[u8], at_least: Version) -> bool {
    Version::parse(bytes).map_or(false, |v| v >= at_least)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_release_order() {
        assert!(Version::Alpha < Version::Beta);
        assert!(Version::Gamma < Version::Delta);
        assert!(Version::Delta < Version::AiMine);
    }

    #[test]
    fn parse_round_trips() {
        for v in Version::all() {
            assert_eq!(Version::parse(v.as_bytes()), Some(v));
        }
        assert_eq!(Version::parse(b"2.0.0"), None);
        assert_eq!(Version::parse(b""), None);
    }

    #[test]
    fn gating_helper() {
        assert!(version_at_least(b"1.4.0", Version::AiMine));
        assert!(version_at_least(b"1.4.0", Version::Gamma));
        assert!(!version_at_least(b"1.2.0", Version::AiMine));
        assert!(!version_at_least(b"junk", Version::Alpha));
    }
}
