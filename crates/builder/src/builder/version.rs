//! Version-named directory scanning.
//!
//! Seed distributions keep one subdirectory per installed version
//! (`shared/Microsoft.NETCore.App/2.0.0`, `sdk/2.1.0-preview1`, ...). The
//! highest one decides which version the assembled tree claims to be.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// `<major>.<minor>.<patch>[-<tag>]`
#[allow(clippy::expect_used)] // Literal pattern
static CANDIDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-(.+))?$").expect("candidate regex is valid")
});

/// `<major>.<minor>.<patch>` with nothing else.
#[allow(clippy::expect_used)] // Literal pattern
static RELEASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("release regex is valid"));

/// A version with an optional prerelease tag.
///
/// Ordering compares the numeric triple first. On a tie a release beats any
/// prerelease, and two prereleases compare their tags as plain strings, so
/// tag `9` sorts above tag `10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
}

impl SemanticVersion {
    pub const ZERO: Self = Self::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
        }
    }

    /// Parse a directory name. Returns `None` for anything that is not a
    /// version, including numbers too large for `u64`.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = CANDIDATE_RE.captures(text)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
            prerelease: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }

    /// Parse a forced version: exactly three dot-separated integers.
    pub fn parse_release(text: &str) -> Option<Self> {
        if !RELEASE_RE.is_match(text) {
            return None;
        }
        Self::parse(text)
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(tag) = &self.prerelease {
            write!(f, "-{tag}")?;
        }
        Ok(())
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Highest version among the immediate subdirectories of `dir`.
///
/// Falls back to `0.0.0` when nothing matches, including when `dir` is
/// missing or unreadable.
pub fn latest_in(dir: &Path) -> SemanticVersion {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return SemanticVersion::ZERO;
    };

    entries
        .filter_map(std::result::Result::ok)
        // Follows symlinks, so a linked version directory still counts.
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().and_then(SemanticVersion::parse))
        .max()
        .unwrap_or(SemanticVersion::ZERO)
}
