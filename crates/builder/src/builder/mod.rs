//! Build pipeline for a .NET Core CLI distribution.
//!
//! Structure:
//! - `cli` - argument normalization and validation
//! - `version` - version ordering and directory scanning
//! - `commit` - commit hashes embedded in seed binaries
//! - `repos` - clone/checkout of coreclr, corefx and core-setup
//! - `stages` - native build scripts and their logs
//! - `assemble` - output tree population and hardening
//! - `manifest` - deps.json rewrite for the new runtime identifier
//! - `record` - JSON summary of a finished build

pub mod assemble;
pub mod cli;
pub mod commit;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod process;
pub mod record;
pub mod repos;
pub mod stages;
pub mod version;

use anyhow::{Context, Result};
use cli::{Invocation, Mode};
use layout::{DistributionVersions, SeedLayout, TargetLayout};
use process::CommandRunner;
use record::{BuildRecord, RecordMode};

/// Run the whole pipeline for a validated invocation.
///
/// Stages run strictly in order and communicate through the filesystem:
/// versions and pins, output reset, repository sync, native builds,
/// assembly, manifest patch (seed mode), build record.
pub fn run(inv: &Invocation, runner: &dyn CommandRunner) -> Result<()> {
    tracing::info!("=== Building .NET Core CLI for {} ===", inv.rid);

    let (versions, pins, seed) = match &inv.mode {
        Mode::Seed(root) => {
            tracing::info!("Reading versions from seed CLI at {}", root.display());
            let versions = DistributionVersions::scan(root);
            let seed = SeedLayout::new(root.clone(), versions.framework.clone());
            let pins = commit::extract_pins(&seed);
            (versions, pins, Some(seed))
        }
        Mode::Version(version) => {
            tracing::info!("Claiming version {version} for repository tips");
            (DistributionVersions::uniform(version), repos::head_pins(), None)
        }
    };
    tracing::info!(
        "  framework {}, sdk {}, host fxr {}",
        versions.framework,
        versions.sdk,
        versions.host_fxr
    );

    let target = TargetLayout::new(inv.output.clone(), versions);
    assemble::prepare_target(&target).context("Failed to reset output directory")?;

    repos::sync_all(runner, &inv.workdir, &pins).context("Repository sync failed")?;

    let outputs = stages::build_all(runner, &inv.workdir, &inv.config, &pins).context("Native build failed")?;

    assemble::assemble(&target, &outputs, &inv.config).context("Assembly failed")?;
    assemble::harden(runner, assemble::find_hardening_tool().as_deref(), &target);

    match &seed {
        Some(seed) => manifest::patch(seed, &target, inv.rid.as_str()).context("Manifest patch failed")?,
        None => tracing::debug!("No seed CLI, leaving manifest out"),
    }

    let record = BuildRecord {
        rid: inv.rid.to_string(),
        mode: match &inv.mode {
            Mode::Seed(path) => RecordMode::Seed { path: path.clone() },
            Mode::Version(_) => RecordMode::Version,
        },
        configuration: inv.config.configuration.to_string(),
        versions: target.versions().clone(),
        pins,
        output: target.root().to_path_buf(),
        completed: chrono::Utc::now(),
    };
    record.write(&inv.workdir).context("Failed to write build record")?;

    tracing::info!("=== Build complete: {} ===", target.root().display());
    Ok(())
}
