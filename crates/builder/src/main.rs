//! # dotnetcli-builder
//!
//! Assemble a .NET Core CLI tree for a runtime identifier from the coreclr,
//! corefx and core-setup sources.
//!
//! ## Usage
//!
//! ```bash
//! dotnetcli-builder -rid rhel.6-x64 -seedcli ~/dotnet      # match an existing install
//! dotnetcli-builder -rid rhel.6-x64 -version 2.0.99        # build repository tips
//! dotnetcli-builder -rid alpine-x64 -version 2.0.0 -release -clang 3.9
//! ```
//!
//! ## Exit codes
//!
//! - `0` success
//! - `1` help, unknown flag, or any fatal error not listed below
//! - `2` invalid or contradictory flags
//! - a failed native build's own exit status

use clap::error::ErrorKind;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod builder;

use builder::error::BuildError;
use builder::process::SystemRunner;

fn main() -> ExitCode {
    let args = match builder::cli::parse(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::UnknownArgument => ExitCode::from(1),
                _ => ExitCode::from(2),
            };
        }
    };

    init_tracing(args.verbose);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            tracing::error!("cannot determine current directory: {e}");
            return ExitCode::from(1);
        }
    };

    let inv = match builder::cli::resolve(args, &cwd) {
        Ok(inv) => inv,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(BuildError::from(e).exit_code());
        }
    };

    match builder::run(&inv, &SystemRunner) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            let code = err
                .chain()
                .find_map(|e| e.downcast_ref::<BuildError>())
                .map_or(1, BuildError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the level from info.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
