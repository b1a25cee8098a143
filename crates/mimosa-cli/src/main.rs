//! The binary entrypoint for `mimosa`, a caching wrapper around container
//! image builds.

use clap::{Parser, Subcommand, crate_version};
use color_eyre::Result;

mod cmd;
mod log;

#[derive(Clone, Debug, Parser)]
#[command(name = "mimosa", about = "Skip redundant container image builds", version = crate_version!())]
struct TopLevelFlags {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Build with caching: on a hit, republish the cached tags without
    /// building; on a miss, run the build and record its result.
    Remember {
        /// Report what would happen without republishing or saving.
        #[arg(long)]
        dry_run: bool,

        /// The build command to run, e.g. `docker build -t app:v1 .`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        build_command: Vec<String>,
    },

    /// Always run the build, recording its result without consulting the
    /// cache first.
    Forget {
        /// Report what would happen without saving.
        #[arg(long)]
        dry_run: bool,

        /// The build command to run, e.g. `docker build -t app:v1 .`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        build_command: Vec<String>,
    },

    /// Inspect or manage the local cache directory.
    Cache(cmd::cache::Options),
}

fn main() -> Result<()> {
    color_eyre::install()?;
    log::init();

    let top = TopLevelFlags::parse();
    match top.command {
        Command::Remember { dry_run, build_command } => {
            let code = cmd::remember::exec(&build_command, dry_run)?;
            std::process::exit(code);
        }
        Command::Forget { dry_run, build_command } => cmd::forget::exec(&build_command, dry_run)?,
        Command::Cache(options) => cmd::cache::exec(options)?,
    }

    Ok(())
}
