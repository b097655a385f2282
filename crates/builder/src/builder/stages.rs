//! Native build stages for the three repositories.
//!
//! Each stage runs the repository's own build script with an explicit
//! working directory, writes the captured output to
//! `<workdir>/logs/<repo>.build.log`, and returns the directory holding the
//! produced binaries.

use crate::builder::cli::BuildConfig;
use crate::builder::error::{BuildError, Result};
use crate::builder::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::builder::repos::{self, Repo, RepoPin, Revision};
use std::path::{Path, PathBuf};

/// Log line prefix the coreclr and corefx builds print before their output
/// directory.
pub const OUTPUT_MARKER: &str = "Product binaries are available at ";

/// Component version stamped into the native host binaries.
const HOST_COMPONENT_VERSION: &str = "2.0.0";

/// Where core-setup's corehost build installs its binaries.
const CORE_SETUP_OUTPUT: &str = "src/corehost/cli";

/// Output directories of all three builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutputs {
    pub core_setup: PathBuf,
    pub coreclr: PathBuf,
    pub corefx: PathBuf,
}

/// Directory reported on the first log line starting with [`OUTPUT_MARKER`].
pub fn output_dir_from_log(log: &str) -> Option<PathBuf> {
    log.lines()
        .find_map(|line| line.trim_start().strip_prefix(OUTPUT_MARKER))
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// Run all three builds in order: core-setup, coreclr, corefx.
pub fn build_all(
    runner: &dyn CommandRunner,
    workdir: &Path,
    config: &BuildConfig,
    pins: &[RepoPin],
) -> Result<BuildOutputs> {
    let core_setup_hash = match pins.iter().find(|p| p.repo == Repo::CoreSetup) {
        Some(RepoPin {
            revision: Revision::Commit(hash),
            ..
        }) => hash.clone(),
        _ => repos::resolve_head(runner, workdir, Repo::CoreSetup)?,
    };

    Ok(BuildOutputs {
        core_setup: build_core_setup(runner, workdir, config, &core_setup_hash)?,
        coreclr: build_coreclr(runner, workdir, config)?,
        corefx: build_corefx(runner, workdir, config)?,
    })
}

/// Native host components (`dotnet`, hostfxr, hostpolicy).
pub fn build_core_setup(
    runner: &dyn CommandRunner,
    workdir: &Path,
    config: &BuildConfig,
    commit: &str,
) -> Result<PathBuf> {
    tracing::info!("Building core-setup native host @ {commit}");

    let src = Repo::CoreSetup.path(workdir);
    let corehost = src.join("src/corehost");
    let spec = CommandSpec::new(corehost.join("build.sh").to_string_lossy(), &corehost)
        .args(["--arch", config.arch.as_str()])
        .args(["--hostver", HOST_COMPONENT_VERSION])
        .args(["--apphostver", HOST_COMPONENT_VERSION])
        .args(["--fxrver", HOST_COMPONENT_VERSION])
        .args(["--policyver", HOST_COMPONENT_VERSION])
        .args(["--commithash", commit]);

    run_stage(runner, workdir, Repo::CoreSetup, &spec)?;

    let out = src.join(CORE_SETUP_OUTPUT);
    tracing::info!("  Built: {}", out.display());
    Ok(out)
}

/// coreclr runtime, `corerun` and `crossgen`.
pub fn build_coreclr(runner: &dyn CommandRunner, workdir: &Path, config: &BuildConfig) -> Result<PathBuf> {
    tracing::info!("Building coreclr ({} {})", config.configuration, config.arch);

    let src = Repo::CoreClr.path(workdir);
    let mut spec = CommandSpec::new(src.join("build.sh").to_string_lossy(), &src)
        .args([config.configuration.as_str(), config.arch.as_str()]);
    if let Some(clang) = config.clang_arg() {
        spec = spec.arg(clang);
    }
    spec = spec.arg("-nopgooptimize");

    scraped_stage(runner, workdir, Repo::CoreClr, &spec)
}

/// corefx native interop libraries (`System.*.so`).
pub fn build_corefx(runner: &dyn CommandRunner, workdir: &Path, config: &BuildConfig) -> Result<PathBuf> {
    tracing::info!("Building corefx native ({} {} {})", config.os, config.configuration, config.arch);

    let src = Repo::CoreFx.path(workdir);
    let mut spec = CommandSpec::new(src.join("src/Native/build-native.sh").to_string_lossy(), &src)
        .args([config.arch.as_str(), config.configuration.as_str()]);
    if let Some(clang) = config.clang_arg() {
        spec = spec.arg(clang);
    }
    spec = spec.arg(config.os.as_str());

    scraped_stage(runner, workdir, Repo::CoreFx, &spec)
}

/// Run a stage whose output directory is only known from its log.
fn scraped_stage(
    runner: &dyn CommandRunner,
    workdir: &Path,
    repo: Repo,
    spec: &CommandSpec,
) -> Result<PathBuf> {
    let (output, log_path) = run_stage(runner, workdir, repo, spec)?;

    let dir = output_dir_from_log(&output.log).ok_or(BuildError::MissingOutputMarker {
        stage: repo.name(),
        marker: OUTPUT_MARKER,
        log: log_path,
    })?;

    tracing::info!("  Built: {}", dir.display());
    Ok(dir)
}

/// Run `spec`, persist its log, and fail on a non-zero exit.
fn run_stage(
    runner: &dyn CommandRunner,
    workdir: &Path,
    repo: Repo,
    spec: &CommandSpec,
) -> Result<(CommandOutput, PathBuf)> {
    let output = runner.run(spec).map_err(|e| BuildError::io(&spec.cwd, e))?;
    let log_path = write_log(workdir, repo, spec, &output)?;

    if !output.success() {
        for line in tail(&output.log, 20) {
            tracing::error!("  {repo}: {line}");
        }
        return Err(BuildError::BuildFailed {
            stage: repo.name(),
            code: output.code,
            log: log_path,
        });
    }
    Ok((output, log_path))
}

fn write_log(workdir: &Path, repo: Repo, spec: &CommandSpec, output: &CommandOutput) -> Result<PathBuf> {
    let dir = workdir.join("logs");
    std::fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

    let path = dir.join(format!("{}.build.log", repo.name()));
    let header = format!(
        "# {}\n# cwd: {}\n# finished: {}\n# exit: {:?}\n\n",
        spec.display(),
        spec.cwd.display(),
        chrono::Local::now().to_rfc3339(),
        output.code,
    );
    std::fs::write(&path, header + &output.log).map_err(|e| BuildError::io(&path, e))?;

    tracing::debug!("  Log: {}", path.display());
    Ok(path)
}

fn tail(log: &str, n: usize) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = log.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::cli::Configuration;
    use crate::builder::process::fake::RecordingRunner;
    use tempfile::TempDir;

    const HASH: &str = "aaf63c2fd3d0ed1d6b1cc5c6a7a5acd2f4e5dc1a";

    fn config(clang: Option<&str>) -> BuildConfig {
        BuildConfig {
            os: "Linux".to_string(),
            arch: "x64".to_string(),
            configuration: Configuration::Debug,
            clang: clang.map(str::to_string),
            corelib: None,
        }
    }

    #[test]
    fn test_output_dir_from_log() {
        let log = "Setting up directories\n\
                   Product binaries are available at /src/coreclr/bin/Product/Linux.x64.Debug\n\
                   Done\n";
        assert_eq!(
            output_dir_from_log(log),
            Some(PathBuf::from("/src/coreclr/bin/Product/Linux.x64.Debug"))
        );
    }

    #[test]
    fn test_output_dir_missing_marker() {
        assert_eq!(output_dir_from_log("BUILD: Repo successfully built.\n"), None);
        assert_eq!(output_dir_from_log("Product binaries are available at   \n"), None);
    }

    #[test]
    fn test_coreclr_arguments_and_cwd() {
        let work = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.reply(Some(0), "Product binaries are available at /out/clr\n");

        let dir = build_coreclr(&runner, work.path(), &config(Some("3.9"))).unwrap();

        assert_eq!(dir, PathBuf::from("/out/clr"));
        let call = &runner.calls()[0];
        assert_eq!(PathBuf::from(&call.program), work.path().join("coreclr/build.sh"));
        assert_eq!(call.args, ["debug", "x64", "clang3.9", "-nopgooptimize"]);
        assert_eq!(call.cwd, work.path().join("coreclr"));
    }

    #[test]
    fn test_corefx_arguments_without_clang() {
        let work = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.reply(Some(0), "Product binaries are available at /out/fx\n");

        build_corefx(&runner, work.path(), &config(None)).unwrap();

        let call = &runner.calls()[0];
        assert_eq!(
            PathBuf::from(&call.program),
            work.path().join("corefx/src/Native/build-native.sh")
        );
        assert_eq!(call.args, ["x64", "debug", "Linux"]);
        assert_eq!(call.cwd, work.path().join("corefx"));
    }

    #[test]
    fn test_core_setup_uses_fixed_output() {
        let work = TempDir::new().unwrap();
        let runner = RecordingRunner::new();

        let dir = build_core_setup(&runner, work.path(), &config(None), HASH).unwrap();

        assert_eq!(dir, work.path().join("core-setup/src/corehost/cli"));
        let call = &runner.calls()[0];
        assert_eq!(call.cwd, work.path().join("core-setup/src/corehost"));
        assert_eq!(
            PathBuf::from(&call.program),
            work.path().join("core-setup/src/corehost/build.sh")
        );
        assert_eq!(
            call.args,
            [
                "--arch", "x64", "--hostver", "2.0.0", "--apphostver", "2.0.0", "--fxrver", "2.0.0",
                "--policyver", "2.0.0", "--commithash", HASH,
            ]
        );
    }

    #[test]
    fn test_failure_keeps_log_and_code() {
        let work = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.reply(Some(2), "error: clang not found\n");

        let err = build_coreclr(&runner, work.path(), &config(None)).unwrap_err();

        match err {
            BuildError::BuildFailed { stage, code, log } => {
                assert_eq!(stage, "coreclr");
                assert_eq!(code, Some(2));
                let text = std::fs::read_to_string(log).unwrap();
                assert!(text.contains("clang not found"));
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_success_without_marker_is_failure() {
        let work = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.reply(Some(0), "all good\n");

        let err = build_corefx(&runner, work.path(), &config(None)).unwrap_err();
        assert!(matches!(err, BuildError::MissingOutputMarker { stage: "corefx", .. }));
        assert!(work.path().join("logs/corefx.build.log").exists());
    }

    #[test]
    fn test_build_all_resolves_head_for_unpinned_core_setup() {
        let work = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        runner.reply(Some(0), &format!("{HASH}\n"));
        runner.reply(Some(0), "");
        runner.reply(Some(0), "Product binaries are available at /clr\n");
        runner.reply(Some(0), "Product binaries are available at /fx\n");

        let outputs = build_all(&runner, work.path(), &config(None), &repos::head_pins()).unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].args, ["rev-parse", "HEAD"]);
        assert_eq!(calls[1].args.last().map(String::as_str), Some(HASH));
        assert_eq!(outputs.coreclr, PathBuf::from("/clr"));
        assert_eq!(outputs.corefx, PathBuf::from("/fx"));
    }
}
