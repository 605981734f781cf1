//! Platform version arithmetic.
//!
//! Versions are a `major.minor.micro` triple in which any trailing component
//! may be unset. An unset component is a wildcard: it matches anything in
//! [`PlatformVersion::matches`], while in absolute ordering it sits strictly
//! below every set value (and ties with another unset component). That
//! ordering is exactly what `Option<u32>`'s derived `Ord` gives us, since
//! `None < Some(_)`.

use crate::{NimbusError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A three-part platform or service version with wildcard components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PlatformVersion {
    major: Option<u32>,
    minor: Option<u32>,
    micro: Option<u32>,
}

impl PlatformVersion {
    /// The all-unset version, used as "no constraint".
    pub const ANY: PlatformVersion = PlatformVersion {
        major: None,
        minor: None,
        micro: None,
    };

    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major: Some(major),
            minor: Some(minor),
            micro: Some(micro),
        }
    }

    pub fn major(&self) -> Option<u32> {
        self.major
    }

    pub fn minor(&self) -> Option<u32> {
        self.minor
    }

    pub fn micro(&self) -> Option<u32> {
        self.micro
    }

    /// Parse a dotted version string.
    ///
    /// Grammar: `digits ('.' digits)? ('.' digits)?` with no sign and no
    /// whitespace. The empty string parses to [`PlatformVersion::ANY`];
    /// trailing positions not present in the input stay unset, they do not
    /// default to zero.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::ANY);
        }

        let invalid = || NimbusError::InvalidVersion { text: text.into() };

        let mut parts = text.split('.');
        let mut components = [None, None, None];
        for slot in components.iter_mut() {
            match parts.next() {
                Some(p) => {
                    if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(invalid());
                    }
                    *slot = Some(p.parse::<u32>().map_err(|_| invalid())?);
                }
                None => break,
            }
        }
        // more than three dotted components
        if parts.next().is_some() {
            return Err(invalid());
        }

        let [major, minor, micro] = components;
        Ok(Self {
            major,
            minor,
            micro,
        })
    }

    /// Absolute lexicographic comparison; unset orders below any set value.
    pub fn compare(&self, other: &PlatformVersion) -> Ordering {
        self.cmp(other)
    }

    /// Per-component wildcard equality: a component unset on either side is
    /// treated as satisfied; all three components must pass.
    pub fn matches(&self, pattern: &PlatformVersion) -> bool {
        fn component(a: Option<u32>, b: Option<u32>) -> bool {
            match (a, b) {
                (Some(x), Some(y)) => x == y,
                _ => true,
            }
        }
        component(self.major, pattern.major)
            && component(self.minor, pattern.minor)
            && component(self.micro, pattern.micro)
    }

    /// The single decision rule used when scanning candidate versions for
    /// the best match against an exact-or-wildcard target and a floor.
    ///
    /// For `current` to win it must be newer than (or equal to) what we have
    /// already `got`, match `want`, and sit at or above `want_min`. The `>=`
    /// means a tie admits replacement, so the later-scanned candidate wins.
    pub fn is_newer_match(
        current: &PlatformVersion,
        got: &PlatformVersion,
        want: &PlatformVersion,
        want_min: &PlatformVersion,
    ) -> bool {
        if current.compare(got) == Ordering::Less {
            return false;
        }
        if !current.matches(want) {
            return false;
        }
        if current.compare(want_min) == Ordering::Less {
            return false;
        }
        true
    }
}

impl FromStr for PlatformVersion {
    type Err = NimbusError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PlatformVersion {
    /// Renders only the leading contiguous set components, dropping trailing
    /// unset ones entirely.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(major) = self.major {
            write!(f, "{major}")?;
            if let Some(minor) = self.minor {
                write!(f, ".{minor}")?;
                if let Some(micro) = self.micro {
                    write!(f, ".{micro}")?;
                }
            }
        }
        Ok(())
    }
}
