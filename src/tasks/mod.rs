//! Per-feature operations.

pub mod buffer;
pub mod filter;
pub mod lookup;
pub mod reproject;
pub mod validity;

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::config::{LookupMode, Task};
use crate::decompose::SplitLimits;
use crate::engine::{Access, FieldDefn};
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::workspace::Workspace;

const PROGRESS_INTERVAL: usize = 1000;

/// What a task leaves behind for packaging.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// A GeoJSON document in the workspace holding the result layer.
    Dataset(PathBuf),
    /// A lookup report.
    Report(Value),
    /// Nothing to package.
    Nothing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Features read from the source.
    pub read: usize,
    /// Features in the result.
    pub kept: usize,
    pub output: TaskOutput,
}

/// Runs `task` against the working document at `source`.
pub fn execute(
    task: &Task,
    source: &Path,
    workspace: &Workspace,
    limits: &SplitLimits,
) -> Result<TaskOutcome> {
    match task {
        Task::Buffer {
            distance,
            quadrant_segments,
        } => buffer::run(
            source,
            &workspace.file("buffered.json"),
            *distance,
            *quadrant_segments,
            limits,
        ),
        Task::AttributeFilter { column, value } => filter::run(source, column, value),
        Task::Lookup {
            query,
            mode: LookupMode::Report,
            attributes,
        } => lookup::report(source, query, attributes),
        Task::Lookup {
            query,
            mode: LookupMode::Extract,
            ..
        } => lookup::extract(source, query),
        Task::Reproject { target_epsg } => reproject::run(source, *target_epsg),
        Task::RemoveInvalidGeometry => validity::run(source),
        Task::Validate => inspect(source),
    }
}

/// Opens the document and logs its first layer without changing anything.
fn inspect(source: &Path) -> Result<TaskOutcome> {
    let pipeline = Pipeline::open(source, Access::ReadOnly)?;
    let layer = pipeline.source()?;
    let fields: Vec<&str> = layer.fields().iter().map(FieldDefn::name).collect();
    info!("Fields: [{}]", fields.join(", "));
    let count = layer.feature_count();
    pipeline.commit()?;

    Ok(TaskOutcome {
        read: count,
        kept: count,
        output: TaskOutput::Nothing,
    })
}

/// Progress lines for a feature loop.
pub(crate) struct Progress {
    label: &'static str,
    total: usize,
    done: usize,
}

impl Progress {
    pub(crate) fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            done: 0,
        }
    }

    pub(crate) fn tick(&mut self) {
        self.done += 1;
        if self.done % PROGRESS_INTERVAL == 0 {
            info!(
                "{}: {}/{} features ({:.1}%)",
                self.label,
                self.done,
                self.total,
                self.done as f64 * 100.0 / self.total.max(1) as f64
            );
        }
    }

    pub(crate) fn done(&self) -> usize {
        self.done
    }
}
