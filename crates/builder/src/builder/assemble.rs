//! Merge the three build outputs into the target distribution tree.

use crate::builder::cli::BuildConfig;
use crate::builder::error::{BuildError, Result};
use crate::builder::layout::TargetLayout;
use crate::builder::process::{CommandRunner, CommandSpec};
use crate::builder::stages::BuildOutputs;
use std::path::{Path, PathBuf};

/// coreclr executables copied next to the runtime libraries.
const CORECLR_EXECUTABLES: &[&str] = &["corerun", "crossgen"];

/// coreclr files without which the framework is useless.
const CORECLR_REQUIRED: &[&str] = &["libcoreclr.so", "corerun", "crossgen"];

/// Where a core-setup file lands in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostDest {
    Root,
    HostFxr,
    Framework,
    Sdk,
}

/// core-setup output files (relative to its `cli` directory) and their destinations.
const CORE_SETUP_FILES: &[(&str, HostDest)] = &[
    ("exe/dotnet/dotnet", HostDest::Root),
    ("fxr/libhostfxr.so", HostDest::HostFxr),
    ("fxr/libhostfxr.so", HostDest::Framework),
    ("dll/libhostpolicy.so", HostDest::Framework),
    ("dll/libhostpolicy.so", HostDest::Sdk),
];

/// Binaries that need executable memory mappings allowed.
const HARDENED: &[&str] = &["corerun", "crossgen"];

/// Marking tool probed on `PATH`.
pub const HARDENING_TOOL: &str = "paxctl";

/// Destroy whatever is at the output path and create an empty root.
pub fn prepare_target(target: &TargetLayout) -> Result<()> {
    let root = target.root();
    if root.exists() {
        tracing::info!("Removing previous output at {}", root.display());
        std::fs::remove_dir_all(root).map_err(|e| BuildError::io(root, e))?;
    }
    std::fs::create_dir_all(root).map_err(|e| BuildError::io(root, e))
}

/// Populate the target from the build outputs, then copy the corelib override.
pub fn assemble(target: &TargetLayout, outputs: &BuildOutputs, config: &BuildConfig) -> Result<()> {
    tracing::info!("Assembling distribution in {}", target.root().display());

    for dir in [target.framework(), target.sdk(), target.host_fxr()] {
        std::fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;
    }

    copy_coreclr(&outputs.coreclr, &target.framework())?;
    copy_core_setup(&outputs.core_setup, target)?;
    copy_corefx(&outputs.corefx, &target.framework())?;

    if let Some(corelib) = &config.corelib {
        tracing::info!("  Overriding corelib with {}", corelib.display());
        copy_into(corelib, &target.framework())?;
    }
    Ok(())
}

fn copy_coreclr(src: &Path, framework: &Path) -> Result<()> {
    for name in CORECLR_REQUIRED {
        require(&src.join(name))?;
    }

    let mut copied = 0;
    for path in files_in(src)? {
        let name = file_name(&path);
        if name.ends_with(".so") || CORECLR_EXECUTABLES.contains(&name) {
            copy_into(&path, framework)?;
            copied += 1;
        }
    }
    tracing::info!("  coreclr: {copied} files");
    Ok(())
}

fn copy_core_setup(cli: &Path, target: &TargetLayout) -> Result<()> {
    for (rel, dest) in CORE_SETUP_FILES {
        let src = cli.join(rel);
        require(&src)?;
        let dest_dir = match dest {
            HostDest::Root => target.root().to_path_buf(),
            HostDest::HostFxr => target.host_fxr(),
            HostDest::Framework => target.framework(),
            HostDest::Sdk => target.sdk(),
        };
        copy_into(&src, &dest_dir)?;
    }
    tracing::info!("  core-setup: {} files", CORE_SETUP_FILES.len());
    Ok(())
}

fn copy_corefx(src: &Path, framework: &Path) -> Result<()> {
    let natives: Vec<PathBuf> = files_in(src)?
        .into_iter()
        .filter(|p| {
            let name = file_name(p);
            name.starts_with("System.") && name.ends_with(".so")
        })
        .collect();

    if natives.is_empty() {
        return Err(BuildError::MissingArtifact {
            path: src.join("System.*.so"),
        });
    }
    for path in &natives {
        copy_into(path, framework)?;
    }
    tracing::info!("  corefx: {} files", natives.len());
    Ok(())
}

/// Locate the marking tool, if installed.
pub fn find_hardening_tool() -> Option<PathBuf> {
    which::which(HARDENING_TOOL).ok()
}

/// Allow executable memory mappings on the runtime executables.
///
/// Without a tool this is a no-op. A failing run only warns.
pub fn harden(runner: &dyn CommandRunner, tool: Option<&Path>, target: &TargetLayout) {
    let Some(tool) = tool else {
        tracing::debug!("{HARDENING_TOOL} not found, skipping hardening");
        return;
    };

    let framework = target.framework();
    let files = HARDENED
        .iter()
        .map(|name| framework.join(name))
        .chain(std::iter::once(target.launcher()));

    for file in files {
        let spec = CommandSpec::new(tool.to_string_lossy(), target.root())
            .args(["-c", "-m"])
            .arg(file.to_string_lossy());
        match runner.run(&spec) {
            Ok(out) if out.success() => tracing::debug!("  marked {}", file.display()),
            Ok(out) => tracing::warn!("{HARDENING_TOOL} failed on {}: {}", file.display(), out.log.trim()),
            Err(e) => tracing::warn!("could not run {}: {e}", tool.display()),
        }
    }
}

fn require(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BuildError::MissingArtifact {
            path: path.to_path_buf(),
        })
    }
}

/// Regular files directly under `dir`, sorted.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// Copy `src` into `dir` under its own name, permissions included.
fn copy_into(src: &Path, dir: &Path) -> Result<()> {
    let Some(name) = src.file_name() else {
        return Err(BuildError::MissingArtifact {
            path: src.to_path_buf(),
        });
    };
    let dest = dir.join(name);
    std::fs::copy(src, &dest).map_err(|e| BuildError::io(&dest, e))?;
    Ok(())
}
