//! Distribution tree layout shared by seed and target trees.

use crate::builder::version::SemanticVersion;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Framework directory relative to a distribution root.
pub const FRAMEWORK_DIR: &str = "shared/Microsoft.NETCore.App";
pub const SDK_DIR: &str = "sdk";
pub const HOST_FXR_DIR: &str = "host/fxr";

/// Top-level launcher executable.
pub const LAUNCHER: &str = "dotnet";

/// Dependency manifest kept in the framework directory.
pub const MANIFEST_NAME: &str = "Microsoft.NETCore.App.deps.json";

/// The three versions a distribution is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionVersions {
    pub framework: SemanticVersion,
    pub sdk: SemanticVersion,
    pub host_fxr: SemanticVersion,
}

impl DistributionVersions {
    /// Same version everywhere (version-only mode).
    pub fn uniform(version: &SemanticVersion) -> Self {
        Self {
            framework: version.clone(),
            sdk: version.clone(),
            host_fxr: version.clone(),
        }
    }

    /// Highest versions installed in a seed tree.
    pub fn scan(seed_root: &Path) -> Self {
        use crate::builder::version::latest_in;

        Self {
            framework: latest_in(&seed_root.join(FRAMEWORK_DIR)),
            sdk: latest_in(&seed_root.join(SDK_DIR)),
            host_fxr: latest_in(&seed_root.join(HOST_FXR_DIR)),
        }
    }
}

/// Read-only seed installation.
#[derive(Debug, Clone)]
pub struct SeedLayout {
    root: PathBuf,
    framework_version: SemanticVersion,
}

impl SeedLayout {
    pub fn new(root: PathBuf, framework_version: SemanticVersion) -> Self {
        Self {
            root,
            framework_version,
        }
    }

    pub fn framework(&self) -> PathBuf {
        self.root
            .join(FRAMEWORK_DIR)
            .join(self.framework_version.to_string())
    }

    pub fn launcher(&self) -> PathBuf {
        self.root.join(LAUNCHER)
    }

    pub fn manifest(&self) -> PathBuf {
        self.framework().join(MANIFEST_NAME)
    }
}

/// Output tree under construction.
#[derive(Debug, Clone)]
pub struct TargetLayout {
    root: PathBuf,
    versions: DistributionVersions,
}

impl TargetLayout {
    pub fn new(root: PathBuf, versions: DistributionVersions) -> Self {
        Self { root, versions }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions(&self) -> &DistributionVersions {
        &self.versions
    }

    pub fn framework(&self) -> PathBuf {
        self.root
            .join(FRAMEWORK_DIR)
            .join(self.versions.framework.to_string())
    }

    pub fn sdk(&self) -> PathBuf {
        self.root.join(SDK_DIR).join(self.versions.sdk.to_string())
    }

    pub fn host_fxr(&self) -> PathBuf {
        self.root
            .join(HOST_FXR_DIR)
            .join(self.versions.host_fxr.to_string())
    }

    pub fn launcher(&self) -> PathBuf {
        self.root.join(LAUNCHER)
    }

    pub fn manifest(&self) -> PathBuf {
        self.framework().join(MANIFEST_NAME)
    }
}
