//! Dependent source repositories (clone, pin, leave alone).
//!
//! A repository that already exists under the work directory is never
//! touched, so sources can be patched by hand between runs. Missing ones are
//! cloned and, when pinned, checked out at the pinned commit.

use crate::builder::error::{BuildError, Result};
use crate::builder::process::{CommandRunner, CommandSpec};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// The three repositories a distribution is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Repo {
    #[serde(rename = "coreclr")]
    CoreClr,
    #[serde(rename = "corefx")]
    CoreFx,
    #[serde(rename = "core-setup")]
    CoreSetup,
}

impl Repo {
    /// Clone order.
    pub const ALL: [Self; 3] = [Self::CoreClr, Self::CoreFx, Self::CoreSetup];

    /// Directory name under the work directory.
    pub fn name(self) -> &'static str {
        match self {
            Self::CoreClr => "coreclr",
            Self::CoreFx => "corefx",
            Self::CoreSetup => "core-setup",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            Self::CoreClr => "https://github.com/dotnet/coreclr",
            Self::CoreFx => "https://github.com/dotnet/corefx",
            Self::CoreSetup => "https://github.com/dotnet/core-setup",
        }
    }

    /// Local working copy path.
    pub fn path(self, workdir: &Path) -> PathBuf {
        workdir.join(self.name())
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which revision a fresh clone should sit at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// Default-branch tip.
    Head,
    /// A 40-character commit hash.
    Commit(String),
}

impl Serialize for Revision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Head => serializer.serialize_str("HEAD"),
            Self::Commit(hash) => serializer.serialize_str(hash),
        }
    }
}

/// A repository and the revision it is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoPin {
    pub repo: Repo,
    pub revision: Revision,
}

impl RepoPin {
    pub fn head(repo: Repo) -> Self {
        Self {
            repo,
            revision: Revision::Head,
        }
    }

    /// Pin to `hash`, treating an empty hash as no pin.
    pub fn commit(repo: Repo, hash: &str) -> Self {
        let revision = if hash.is_empty() || hash == "HEAD" {
            Revision::Head
        } else {
            Revision::Commit(hash.to_string())
        };
        Self { repo, revision }
    }
}

/// Unpinned set used in version-only mode.
pub fn head_pins() -> Vec<RepoPin> {
    Repo::ALL.into_iter().map(RepoPin::head).collect()
}

/// Make sure every pinned repository has a working copy under `workdir`.
pub fn sync_all(runner: &dyn CommandRunner, workdir: &Path, pins: &[RepoPin]) -> Result<()> {
    tracing::info!("Synchronizing repositories in {}", workdir.display());
    std::fs::create_dir_all(workdir).map_err(|e| BuildError::io(workdir, e))?;

    for pin in pins {
        sync(runner, workdir, pin)?;
    }
    Ok(())
}

/// Clone and check out one repository unless it is already present.
pub fn sync(runner: &dyn CommandRunner, workdir: &Path, pin: &RepoPin) -> Result<()> {
    let repo = pin.repo;
    let dest = repo.path(workdir);

    if dest.exists() {
        tracing::info!("{repo} already present at {}, leaving it untouched", dest.display());
        return Ok(());
    }

    tracing::info!("Cloning {repo} from {}", repo.url());
    git(
        runner,
        repo,
        "clone",
        CommandSpec::new("git", workdir).args(["clone", repo.url(), repo.name()]),
    )?;

    match &pin.revision {
        Revision::Head => tracing::info!("  {repo} left at default branch tip"),
        Revision::Commit(hash) => {
            tracing::info!("  Checking out {repo} @ {hash}");
            git(
                runner,
                repo,
                "checkout",
                CommandSpec::new("git", &dest).args(["checkout", hash.as_str()]),
            )?;
        }
    }
    Ok(())
}

/// Commit hash the working copy currently sits at.
pub fn resolve_head(runner: &dyn CommandRunner, workdir: &Path, repo: Repo) -> Result<String> {
    let spec = CommandSpec::new("git", &repo.path(workdir)).args(["rev-parse", "HEAD"]);
    let log = git(runner, repo, "rev-parse", spec)?;
    Ok(log.trim().to_string())
}

fn git(runner: &dyn CommandRunner, repo: Repo, action: &'static str, spec: CommandSpec) -> Result<String> {
    let sync_error = |detail: String| BuildError::Sync {
        repo: repo.name(),
        action,
        detail,
    };

    let output = runner
        .run(&spec)
        .map_err(|e| sync_error(format!("could not run git: {e}")))?;

    if !output.success() {
        return Err(sync_error(output.log.trim().to_string()));
    }
    Ok(output.log)
}
