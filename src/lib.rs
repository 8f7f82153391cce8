//! Single-layer vector processing.
//!
//! A run resolves the packaged input, stages a working copy in a scoped
//! workspace, applies one task feature by feature and packages the result
//! the way the input was packaged.

use std::path::PathBuf;

use tracing::info;

pub mod config;
pub mod convert;
pub mod decompose;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod tasks;
pub mod workspace;

use config::RunConfig;
use convert::FormatConverter;
use error::Result;
use workspace::Workspace;

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub task: &'static str,
    pub features_read: usize,
    pub features_kept: usize,
    pub artifacts: Vec<PathBuf>,
}

/// Runs the configured task end to end.
///
/// Every intermediate file lives in a workspace that is removed when this
/// function returns, whether it succeeds or not.
pub fn run(config: &RunConfig, converter: &dyn FormatConverter) -> Result<RunSummary> {
    info!("Task: {}", config.task.name());
    info!("Input: {}", config.input.display());

    let workspace = Workspace::new(config.work_dir.as_deref())?;
    let input = resolver::resolve(&config.input, &workspace.input_dir())?;
    let working = pipeline::stage_source(&input, &workspace, converter)?;
    workspace.discard_input()?;

    let outcome = tasks::execute(&config.task, &working, &workspace, &config.limits)?;
    let artifacts = output::produce(
        &outcome.output,
        &input,
        &config.output_dir,
        &workspace,
        converter,
    )?;

    info!(
        "Done: {} features read, {} kept, {} artifacts",
        outcome.read,
        outcome.kept,
        artifacts.len()
    );
    Ok(RunSummary {
        task: config.task.name(),
        features_read: outcome.read,
        features_kept: outcome.kept,
        artifacts,
    })
}
