//! Four-component file version (`major.minor.build.revision`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A file version as embedded in Windows executables and libraries.
///
/// Ordering is component-wise: major, then minor, then build, then revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid file version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: &'static str,
}

impl FileVersion {
    /// The lowest possible version. Malformed remote versions collapse to this.
    pub const ZERO: FileVersion = FileVersion::new(0, 0, 0, 0);

    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Strict parse: one to four dot-separated non-negative integers.
    /// Missing trailing components are zero.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let fail = |reason| VersionParseError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(fail("empty"));
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for raw in trimmed.split('.') {
            if count == 4 {
                return Err(fail("more than four components"));
            }
            if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(fail("components must be non-negative integers"));
            }
            parts[count] = raw.parse().map_err(|_| fail("component out of range"))?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }

    /// Parse, treating anything malformed as `0.0.0.0`.
    pub fn parse_lenient(input: &str) -> Self {
        Self::parse(input).unwrap_or(Self::ZERO)
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for FileVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FileVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FileVersion::parse(&raw).map_err(serde::de::Error::custom)
    }
}
