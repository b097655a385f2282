//! Commit hashes embedded in previously built binaries.
//!
//! Native runtime libraries carry a build stamp in their string table:
//!
//! ```text
//! @(#)Version 4.6.25509.03 @Commit: 8a25b5b0bd4f0c0da3a95b2fe0be1d4a4af3e4a6
//! ```
//!
//! The `dotnet` launcher has no stamp, so its first 40-hex token is taken.

use crate::builder::error::{BuildError, Result};
use crate::builder::layout::SeedLayout;
use crate::builder::repos::{Repo, RepoPin};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Build-stamp marker that must share a string with the hash.
pub const STAMP_MARKER: &str = "@(#)Version";

/// Shortest printable run considered a string, as `strings(1)` does.
const MIN_STRING_LEN: usize = 4;

#[allow(clippy::expect_used)] // Literal pattern
static STAMPED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@Commit:\s*([0-9a-f]{40})").expect("stamp regex is valid"));

#[allow(clippy::expect_used)] // Literal pattern
static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-f]{40}").expect("hash regex is valid"));

/// How a binary's hash is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashRule {
    /// Only a hash inside a `@(#)Version ... @Commit: <hash>` string counts.
    Stamped,
    /// First 40-hex token anywhere.
    FirstToken,
}

/// Printable ASCII runs of at least four bytes.
pub fn printable_strings(bytes: &[u8]) -> impl Iterator<Item = &str> {
    bytes
        .split(|b| !(b.is_ascii_graphic() || *b == b' ' || *b == b'\t'))
        .filter(|run| run.len() >= MIN_STRING_LEN)
        // Runs are pure ASCII, so this never fails.
        .filter_map(|run| std::str::from_utf8(run).ok())
}

/// Find the commit hash in `bytes` according to `rule`.
///
/// `binary` only labels the error.
pub fn find_commit(bytes: &[u8], rule: HashRule, binary: &Path) -> Result<String> {
    let found = match rule {
        HashRule::Stamped => printable_strings(bytes)
            .filter(|s| s.contains(STAMP_MARKER))
            .find_map(|s| STAMPED_RE.captures(s).map(|c| c[1].to_string())),
        HashRule::FirstToken => {
            printable_strings(bytes).find_map(|s| HASH_RE.find(s).map(|m| m.as_str().to_string()))
        }
    };

    found.ok_or_else(|| BuildError::CommitNotFound {
        binary: binary.to_path_buf(),
    })
}

/// Read `binary` and find its commit hash.
pub fn commit_in_file(binary: &Path, rule: HashRule) -> Result<String> {
    let bytes = std::fs::read(binary).map_err(|e| BuildError::io(binary, e))?;
    find_commit(&bytes, rule, binary)
}

/// Which seed binary pins which repository.
fn sources(seed: &SeedLayout) -> [(Repo, std::path::PathBuf, HashRule); 3] {
    [
        (Repo::CoreClr, seed.framework().join("libcoreclr.so"), HashRule::Stamped),
        (Repo::CoreFx, seed.framework().join("System.Native.so"), HashRule::Stamped),
        (Repo::CoreSetup, seed.launcher(), HashRule::FirstToken),
    ]
}

/// Pins for all three repositories, taken from the seed's binaries.
///
/// A binary without a recognizable hash (or a missing binary) yields a `HEAD`
/// pin so that repository is cloned at its default-branch tip.
pub fn extract_pins(seed: &SeedLayout) -> Vec<RepoPin> {
    tracing::info!("Extracting commit hashes from seed binaries");

    sources(seed)
        .into_iter()
        .map(|(repo, binary, rule)| match commit_in_file(&binary, rule) {
            Ok(hash) => {
                tracing::info!("  {repo}: {hash}");
                RepoPin::commit(repo, &hash)
            }
            Err(e) => {
                tracing::warn!("  {repo}: {e}; using default branch tip");
                RepoPin::head(repo)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::repos::Revision;
    use crate::builder::version::SemanticVersion;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const CLR: &str = "8a25b5b0bd4f0c0da3a95b2fe0be1d4a4af3e4a6";
    const FX: &str = "0f55ad0c2d0d4cdd6e5b2d4b0e47f3a1c6bd11f2";
    const HOST: &str = "aaf63c2fd3d0ed1d6b1cc5c6a7a5acd2f4e5dc1a";

    fn elf_like(strings: &[&str]) -> Vec<u8> {
        let mut bytes = vec![0x7f, b'E', b'L', b'F', 0x02, 0x01, 0x00];
        for s in strings {
            bytes.extend_from_slice(s.as_bytes());
            bytes.extend_from_slice(&[0x00, 0x90, 0xff]);
        }
        bytes
    }

    #[test]
    fn test_printable_strings_splits_on_binary() {
        let bytes = elf_like(&["hello world", "ab", "libc.so.6"]);
        let found: Vec<_> = printable_strings(&bytes).collect();
        assert_eq!(found, ["hello world", "libc.so.6"]);
    }

    #[test]
    fn test_stamped_hash_found() {
        let stamp = format!("@(#)Version 4.6.25509.03 @Commit: {CLR}");
        let bytes = elf_like(&["GLIBC_2.14", &stamp]);
        let hash = find_commit(&bytes, HashRule::Stamped, Path::new("libcoreclr.so")).unwrap();
        assert_eq!(hash, CLR);
    }

    #[test]
    fn test_stamped_ignores_unmarked_hashes() {
        let bytes = elf_like(&[FX, &format!("@Commit: {FX}")]);
        let err = find_commit(&bytes, HashRule::Stamped, Path::new("System.Native.so")).unwrap_err();
        assert!(matches!(err, BuildError::CommitNotFound { .. }));
    }

    #[test]
    fn test_first_token_takes_first() {
        let bytes = elf_like(&["usage: dotnet", &format!("commit {HOST}"), CLR]);
        let hash = find_commit(&bytes, HashRule::FirstToken, Path::new("dotnet")).unwrap();
        assert_eq!(hash, HOST);
    }

    #[test]
    fn test_first_token_rejects_uppercase_and_short() {
        let bytes = elf_like(&["8A25B5B0BD4F0C0DA3A95B2FE0BE1D4A4AF3E4A6", "abc123"]);
        assert!(find_commit(&bytes, HashRule::FirstToken, Path::new("dotnet")).is_err());
    }

    fn seed_with_binaries(dir: &Path) -> SeedLayout {
        let seed = SeedLayout::new(dir.to_path_buf(), SemanticVersion::new(2, 0, 0));
        std::fs::create_dir_all(seed.framework()).unwrap();
        std::fs::write(
            seed.framework().join("libcoreclr.so"),
            elf_like(&[&format!("@(#)Version 4.6.1 @Commit: {CLR}")]),
        )
        .unwrap();
        std::fs::write(seed.launcher(), elf_like(&[HOST])).unwrap();
        seed
    }

    #[test]
    fn test_extract_pins_falls_back_to_head() {
        let dir = TempDir::new().unwrap();
        let seed = seed_with_binaries(dir.path());

        let pins = extract_pins(&seed);

        assert_eq!(pins[0], RepoPin::commit(Repo::CoreClr, CLR));
        // System.Native.so is absent.
        assert_eq!(pins[1].repo, Repo::CoreFx);
        assert_eq!(pins[1].revision, Revision::Head);
        assert_eq!(pins[2], RepoPin::commit(Repo::CoreSetup, HOST));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = commit_in_file(&PathBuf::from("/nonexistent/libcoreclr.so"), HashRule::Stamped)
            .unwrap_err();
        assert!(matches!(err, BuildError::Io { .. }));
    }
}
