//! Command-line parsing and validation.
//!
//! Flags are accepted in the single-dash long form (`-rid rhel.6-x64`) as well
//! as the usual `--rid`, and flag names are case-insensitive. Arguments are
//! normalized before clap sees them; clap then parses everything as optional
//! and [`resolve`] enforces the real rules so that violations exit with the
//! usage code rather than clap's own.

use crate::builder::error::UsageError;
use crate::builder::version::SemanticVersion;
use clap::Parser;
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Flags that consume the next argument as their value.
const VALUE_FLAGS: &[&str] = &[
    "rid",
    "os",
    "corelib",
    "seedcli",
    "clang",
    "outputpath",
    "version",
    "workdir",
];

#[derive(Parser, Debug)]
#[command(
    name = "dotnetcli-builder",
    about = "Assemble a .NET Core CLI tree for a runtime identifier from source",
    disable_version_flag = true
)]
pub struct Args {
    /// Runtime identifier to build for (e.g. rhel.6-x64)
    #[arg(long, value_name = "RID")]
    pub rid: Option<String>,

    /// Build OS passed to the corefx native build
    #[arg(long, value_name = "NAME")]
    pub os: Option<String>,

    /// Debug configuration (default)
    #[arg(long, overrides_with = "release")]
    pub debug: bool,

    /// Release configuration
    #[arg(long, overrides_with = "debug")]
    pub release: bool,

    /// Replace System.Private.CoreLib in the assembled framework
    #[arg(long, value_name = "PATH")]
    pub corelib: Option<PathBuf>,

    /// Existing CLI install to take versions, commits and the manifest from
    #[arg(long, value_name = "PATH")]
    pub seedcli: Option<PathBuf>,

    /// Clang version forwarded to the native builds (e.g. 3.9)
    #[arg(long, value_name = "MAJOR.MINOR")]
    pub clang: Option<String>,

    /// Output tree location [default: <rid>/dotnetcli]
    #[arg(long, value_name = "PATH")]
    pub outputpath: Option<PathBuf>,

    /// Claim this version instead of reading one from a seed CLI
    #[arg(long, value_name = "MAJOR.MINOR.PATCH")]
    pub version: Option<String>,

    /// Where repositories are cloned and build logs are kept [default: .]
    #[arg(long, value_name = "PATH")]
    pub workdir: Option<PathBuf>,

    /// More log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Rewrite `-Flag` / `--FLAG` into `--flag`, leaving values alone.
pub fn normalize<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut expect_value = false;

    for (i, arg) in args.into_iter().map(Into::into).enumerate() {
        // Program name and flag values pass through untouched.
        if i == 0 || expect_value {
            expect_value = false;
            out.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            out.push(arg);
            continue;
        };

        let name = if let Some(rest) = text.strip_prefix("--") {
            rest
        } else if let Some(rest) = text.strip_prefix('-') {
            // Short flags (-h, -v, -vv) stay short.
            if rest.len() <= 1 || rest.chars().all(|c| c == 'v') {
                out.push(arg);
                continue;
            }
            rest
        } else {
            out.push(arg);
            continue;
        };

        if name.is_empty() {
            out.push(arg);
            continue;
        }

        let (flag, inline_value) = match name.split_once('=') {
            Some((flag, value)) => (flag.to_ascii_lowercase(), Some(value)),
            None => (name.to_ascii_lowercase(), None),
        };

        expect_value = inline_value.is_none() && VALUE_FLAGS.contains(&flag.as_str());
        out.push(match inline_value {
            Some(value) => format!("--{flag}={value}").into(),
            None => format!("--{flag}").into(),
        });
    }
    out
}

/// Normalize and parse raw process arguments.
pub fn parse<I, T>(args: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    Args::try_parse_from(normalize(args))
}

/// Debug or release build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Configuration {
    #[default]
    Debug,
    Release,
}

impl Configuration {
    /// Spelling the native build scripts expect.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<os-tag>-<arch>`, e.g. `rhel.6-x64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeId(String);

impl RuntimeId {
    pub fn parse(text: &str) -> Result<Self, UsageError> {
        match text.split_once('-') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() => Ok(Self(text.to_string())),
            _ => Err(UsageError::InvalidRuntimeId(text.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything after the first `-`.
    pub fn arch(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, arch)| arch)
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build knobs shared by the build stages and the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub os: String,
    pub arch: String,
    pub configuration: Configuration,
    /// Clang `major.minor`, forwarded as `clang<ver>`.
    pub clang: Option<String>,
    /// Library copied into the framework last.
    pub corelib: Option<PathBuf>,
}

impl BuildConfig {
    /// The `clang<ver>` argument, if a compiler override was given.
    pub fn clang_arg(&self) -> Option<String> {
        self.clang.as_ref().map(|v| format!("clang{v}"))
    }
}

/// Where versions and pins come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Read everything from an existing CLI install.
    Seed(PathBuf),
    /// Use this version everywhere and build repository tips.
    Version(SemanticVersion),
}

/// A validated invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub rid: RuntimeId,
    pub mode: Mode,
    pub config: BuildConfig,
    pub output: PathBuf,
    pub workdir: PathBuf,
}

/// Validate parsed arguments. `cwd` anchors relative paths.
///
/// Touches nothing on disk beyond resolving paths.
pub fn resolve(args: Args, cwd: &Path) -> Result<Invocation, UsageError> {
    let rid = args
        .rid
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or(UsageError::MissingRuntimeId)
        .and_then(RuntimeId::parse)?;

    let mode = match (args.seedcli, args.version) {
        (Some(_), Some(_)) => return Err(UsageError::SeedAndVersion),
        (None, None) => return Err(UsageError::NeitherSeedNorVersion),
        (Some(seed), None) => Mode::Seed(canonical(&seed, cwd, "-seedcli")?),
        (None, Some(version)) => Mode::Version(
            SemanticVersion::parse_release(&version)
                .ok_or(UsageError::MalformedVersion(version))?,
        ),
    };

    let corelib = args
        .corelib
        .map(|path| canonical(&path, cwd, "-corelib"))
        .transpose()?;

    let output = match args.outputpath {
        Some(path) => absolute(&path, cwd, "-outputpath")?,
        None => absolute(&Path::new(rid.as_str()).join("dotnetcli"), cwd, "-outputpath")?,
    };

    let workdir = match args.workdir {
        Some(path) => absolute(&path, cwd, "-workdir")?,
        None => absolute(Path::new("."), cwd, "-workdir")?,
    };

    // The output is wiped before anything else runs: it may not hold an
    // input, and it may not live inside the read-only seed.
    let mut inputs = vec![&workdir];
    if let Some(corelib) = &corelib {
        inputs.push(corelib);
    }
    let inside_seed = match &mode {
        Mode::Seed(seed) => {
            inputs.push(seed);
            output.starts_with(seed)
        }
        Mode::Version(_) => false,
    };
    if inside_seed || inputs.iter().any(|input| input.starts_with(&output)) {
        return Err(UsageError::OutputOverlapsInput(output));
    }

    let config = BuildConfig {
        os: args.os.unwrap_or_else(|| "Linux".to_string()),
        arch: rid.arch().to_string(),
        // clap clears whichever of the two came first.
        configuration: if args.release && !args.debug {
            Configuration::Release
        } else {
            Configuration::Debug
        },
        clang: args.clang,
        corelib,
    };

    Ok(Invocation {
        rid,
        mode,
        config,
        output,
        workdir,
    })
}

/// Absolute, symlink-resolved path that must exist.
fn canonical(path: &Path, cwd: &Path, flag: &'static str) -> Result<PathBuf, UsageError> {
    std::fs::canonicalize(cwd.join(path)).map_err(|e| UsageError::UnresolvablePath {
        flag,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Absolute, symlink-resolved path that may not exist yet.
///
/// `.` and `..` are folded lexically, then the deepest existing ancestor is
/// canonicalized and the missing components are appended.
fn absolute(path: &Path, cwd: &Path, flag: &'static str) -> Result<PathBuf, UsageError> {
    let mut lexical = PathBuf::new();
    for component in cwd.join(path).components() {
        match component {
            Component::ParentDir => {
                lexical.pop();
            }
            Component::CurDir => {}
            other => lexical.push(other),
        }
    }

    let mut existing = lexical.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        missing.push(name);
        existing = parent;
    }

    let mut resolved = std::fs::canonicalize(existing).map_err(|e| UsageError::UnresolvablePath {
        flag,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    for name in missing.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
