use color_eyre::Result;
use mimosa_core::orchestrator;
use tracing::instrument;

use super::assemble;

/// `forget -- <build-command...>`. Always forwards to the builder without
/// consulting the cache; always exits 0 regardless of the builder's own
/// result, per the CLI surface.
#[instrument(skip(build_command))]
pub fn exec(build_command: &[String], dry_run: bool) -> Result<()> {
    let collaborators = assemble(dry_run)?;

    orchestrator::run_forget(
        build_command,
        &collaborators.cwd,
        &collaborators.config,
        &collaborators.store,
        &collaborators.registry,
        &collaborators.builder,
    )?;
    Ok(())
}
