//! Error taxonomy for the build pipeline.
//!
//! Every fatal condition maps to one [`BuildError`] variant, and every variant
//! knows the process exit code it produces.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the stage modules.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Invalid, missing or contradictory invocation parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing required flag -rid")]
    MissingRuntimeId,

    #[error("runtime identifier '{0}' is not of the form <os>-<arch>")]
    InvalidRuntimeId(String),

    #[error("-seedcli and -version are mutually exclusive")]
    SeedAndVersion,

    #[error("one of -seedcli or -version is required")]
    NeitherSeedNorVersion,

    #[error("version '{0}' must be of the form <major>.<minor>.<patch>")]
    MalformedVersion(String),

    #[error("{flag} path {} cannot be resolved: {reason}", .path.display())]
    UnresolvablePath {
        flag: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("output path {} would destroy an input directory", .0.display())]
    OutputOverlapsInput(PathBuf),
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// Clone, checkout or revision lookup failed.
    #[error("git {action} failed for {repo}: {detail}")]
    Sync {
        repo: &'static str,
        action: &'static str,
        detail: String,
    },

    /// An external build exited unsuccessfully.
    #[error("{stage} build failed with {} (log: {})", describe_status(.code), .log.display())]
    BuildFailed {
        stage: &'static str,
        code: Option<i32>,
        log: PathBuf,
    },

    /// An external build succeeded but never reported where its binaries went.
    #[error("{stage} build log has no line starting with {marker:?} (log: {})", .log.display())]
    MissingOutputMarker {
        stage: &'static str,
        marker: &'static str,
        log: PathBuf,
    },

    /// No commit token could be located in a seed binary.
    #[error("no commit hash found in {}", .binary.display())]
    CommitNotFound { binary: PathBuf },

    /// A binary the distribution requires is absent.
    #[error("missing artifact {}", .path.display())]
    MissingArtifact { path: PathBuf },

    #[error("manifest {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    ///
    /// Usage errors exit 2. A failed external build forwards its own status,
    /// falling back to 1 when the status is absent or would read as success.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::BuildFailed { code: Some(code), .. } => match u8::try_from(*code & 0xff) {
                Ok(0) | Err(_) => 1,
                Ok(code) => code,
            },
            _ => 1,
        }
    }
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "no exit status (terminated by signal)".to_string(),
    }
}
