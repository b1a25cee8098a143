use color_eyre::Result;
use mimosa_core::MimosaError;
use mimosa_core::orchestrator;
use tracing::instrument;

use super::assemble;

/// `remember -- <build-command...>`. Returns the process exit code: 0 on a
/// hit or a successful miss, the builder's own exit code on a build
/// failure.
#[instrument(skip(build_command))]
pub fn exec(build_command: &[String], dry_run: bool) -> Result<i32> {
    let collaborators = assemble(dry_run)?;

    match orchestrator::run_remember(
        build_command,
        &collaborators.cwd,
        &collaborators.config,
        &collaborators.store,
        &collaborators.registry,
        &collaborators.builder,
    ) {
        Ok(result) => Ok(result.exit_code),
        Err(MimosaError::BuildFailure(code)) => Ok(code),
        Err(err) => Err(err.into()),
    }
}
