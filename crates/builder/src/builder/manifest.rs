//! Register a new runtime identifier in the seed's dependency manifest.
//!
//! The manifest is rewritten textually so that everything the rewrite does
//! not target keeps its exact formatting. `serde_json` only checks the input
//! and the result.

use crate::builder::error::{BuildError, Result};
use crate::builder::layout::{SeedLayout, TargetLayout};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

/// Identifier the seed manifest is written for.
pub const DEFAULT_RID: &str = "linux-x64";

/// Fallback chain registered for the new identifier.
pub const FALLBACK_CHAIN: [&str; 4] = ["unix", "unix-x64", "any", "base"];

#[allow(clippy::expect_used)] // Constant pattern
static DOTTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"runtime\.{}([./"])"#, regex::escape(DEFAULT_RID)))
        .expect("dotted runtime regex is valid")
});

#[allow(clippy::expect_used)] // Constant pattern
static VERSIONED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"Version=v(\d+\.\d+)/{}", regex::escape(DEFAULT_RID)))
        .expect("versioned framework regex is valid")
});

#[allow(clippy::expect_used)] // Literal pattern
static RUNTIMES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""runtimes"\s*:\s*\{"#).expect("runtimes map regex is valid"));

/// Rewrite manifest `text` for `rid`. `path` only labels errors.
pub fn patch_manifest(text: &str, rid: &str, path: &Path) -> Result<String> {
    let manifest_error = |reason: String| BuildError::Manifest {
        path: path.to_path_buf(),
        reason,
    };

    let seed: serde_json::Value =
        serde_json::from_str(text).map_err(|e| manifest_error(format!("not valid JSON: {e}")))?;

    let text = DOTTED_RE.replace_all(text, |c: &Captures| format!("runtime.{rid}{}", &c[1]));
    let text = text.replace(&format!("runtimes/{DEFAULT_RID}/"), &format!("runtimes/{rid}/"));
    let text = VERSIONED_RE.replace_all(&text, |c: &Captures| format!("Version=v{}/{rid}", &c[1]));

    let map = RUNTIMES_RE
        .find(&text)
        .ok_or_else(|| manifest_error("no \"runtimes\" map".to_string()))?;

    let patched = if seed["runtimes"].get(rid).is_some() {
        tracing::debug!("{rid} already has a fallback entry");
        text.into_owned()
    } else {
        let rest = &text[map.end()..];
        let separator = if rest.trim_start().starts_with('}') { "" } else { "," };
        let entry = format!(
            "\n    {}: {}{separator}",
            serde_json::Value::from(rid),
            serde_json::Value::from(FALLBACK_CHAIN.to_vec()),
        );
        format!("{}{entry}{rest}", &text[..map.end()])
    };

    serde_json::from_str::<serde_json::Value>(&patched)
        .map_err(|e| manifest_error(format!("rewrite produced invalid JSON: {e}")))?;
    Ok(patched)
}

/// Copy the seed manifest into the target, patched for `rid`.
///
/// A seed without a manifest is skipped with a warning.
pub fn patch(seed: &SeedLayout, target: &TargetLayout, rid: &str) -> Result<()> {
    let src = seed.manifest();
    if !src.is_file() {
        tracing::warn!("No manifest at {}, skipping manifest patch", src.display());
        return Ok(());
    }

    tracing::info!("Patching manifest for {rid}");
    let text = std::fs::read_to_string(&src).map_err(|e| BuildError::io(&src, e))?;
    let patched = patch_manifest(&text, rid, &src)?;

    let dest = target.manifest();
    std::fs::write(&dest, patched).map_err(|e| BuildError::io(&dest, e))?;
    tracing::info!("  Wrote {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::layout::DistributionVersions;
    use crate::builder::version::SemanticVersion;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
  "runtimeTarget": {
    "name": ".NETCoreApp,Version=v2.0/linux-x64"
  },
  "targets": {
    ".NETCoreApp,Version=v2.0/linux-x64": {
      "runtime.linux-x64.Microsoft.NETCore.App/2.0.0": {
        "native": {
          "runtimes/linux-x64/native/libcoreclr.so": {}
        }
      },
      "runtime.win-x64.Microsoft.NETCore.App/2.0.0": {}
    }
  },
  "libraries": {
    "runtime.linux-x64/2.0.0": { "type": "package" },
    "ref.runtime.linux-x64": { "type": "package" }
  },
  "runtimes": {
    "linux-x64": ["linux", "unix-x64", "unix", "any", "base"]
  }
}"#;

    fn patched(text: &str, rid: &str) -> Value {
        let out = patch_manifest(text, rid, Path::new("deps.json")).unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[test]
    fn test_sample_is_rewritten_for_rid() {
        let out = patch_manifest(SAMPLE, "rhel.6-x64", Path::new("deps.json")).unwrap();

        assert!(out.contains(r#""name": ".NETCoreApp,Version=v2.0/rhel.6-x64""#));
        assert!(out.contains("runtime.rhel.6-x64.Microsoft.NETCore.App/2.0.0"));
        assert!(out.contains("runtimes/rhel.6-x64/native/libcoreclr.so"));
        assert!(out.contains(r#""runtime.rhel.6-x64/2.0.0""#));
        assert!(out.contains(r#""ref.runtime.rhel.6-x64""#));
        assert!(out.contains("runtime.win-x64.Microsoft.NETCore.App/2.0.0"));
        assert!(!out.contains("runtime.linux-x64"));

        let doc: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["runtimes"]["rhel.6-x64"], json!(["unix", "unix-x64", "any", "base"]));
        assert_eq!(doc["runtimes"]["linux-x64"][0], "linux");
    }

    #[test]
    fn test_new_entry_comes_first() {
        let out = patch_manifest(SAMPLE, "rhel.6-x64", Path::new("deps.json")).unwrap();
        let map = &out[out.find(r#""runtimes": {"#).unwrap()..];
        assert!(map.find("rhel.6-x64").unwrap() < map.find("linux-x64").unwrap());
    }

    #[test]
    fn test_empty_runtimes_map_gets_no_trailing_comma() {
        let doc = patched(r#"{ "runtimes": {} }"#, "alpine-x64");
        assert_eq!(doc, json!({ "runtimes": { "alpine-x64": ["unix", "unix-x64", "any", "base"] } }));
    }

    #[test]
    fn test_rid_needing_escapes() {
        let doc = patched(r#"{ "runtimes": {} }"#, r"weird$1-x64");
        assert!(doc["runtimes"]["weird$1-x64"].is_array());
    }

    #[test]
    fn test_default_rid_is_not_duplicated() {
        let out = patch_manifest(SAMPLE, DEFAULT_RID, Path::new("deps.json")).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn test_missing_runtimes_map_is_error() {
        let err = patch_manifest(r#"{ "targets": {} }"#, "rhel.6-x64", Path::new("deps.json")).unwrap_err();
        assert!(matches!(err, BuildError::Manifest { reason, .. } if reason.contains("runtimes")));
    }

    #[test]
    fn test_invalid_seed_is_error() {
        let err = patch_manifest("{ not json", "rhel.6-x64", Path::new("deps.json")).unwrap_err();
        assert!(matches!(err, BuildError::Manifest { .. }));
    }

    #[test]
    fn test_patch_writes_target_and_keeps_seed() {
        let dir = TempDir::new().unwrap();
        let version = SemanticVersion::new(2, 0, 0);
        let seed = SeedLayout::new(dir.path().join("seed"), version.clone());
        let target = TargetLayout::new(dir.path().join("out"), DistributionVersions::uniform(&version));
        std::fs::create_dir_all(seed.framework()).unwrap();
        std::fs::create_dir_all(target.framework()).unwrap();
        std::fs::write(seed.manifest(), SAMPLE).unwrap();

        patch(&seed, &target, "rhel.6-x64").unwrap();

        assert_eq!(std::fs::read_to_string(seed.manifest()).unwrap(), SAMPLE);
        let written = std::fs::read_to_string(target.manifest()).unwrap();
        assert!(written.contains("runtimes/rhel.6-x64/"));
    }

    #[test]
    fn test_patch_skips_seed_without_manifest() {
        let dir = TempDir::new().unwrap();
        let version = SemanticVersion::new(2, 0, 0);
        let seed = SeedLayout::new(dir.path().join("seed"), version.clone());
        let target = TargetLayout::new(dir.path().join("out"), DistributionVersions::uniform(&version));

        patch(&seed, &target, "rhel.6-x64").unwrap();

        assert!(!target.manifest().exists());
    }
}
