//! Output packaging.
//!
//! A result layer is delivered twice: as `output.json` and as a zipped
//! shapefile set in `output.zip`. Afterwards every other regular file in
//! the output directory is removed. Lookup reports are written as
//! `output.json` alone.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::convert::FormatConverter;
use crate::error::{OutputError, Result};
use crate::resolver::ResolvedInput;
use crate::tasks::TaskOutput;
use crate::workspace::Workspace;

pub const JSON_ARTIFACT: &str = "output.json";
pub const ZIP_ARTIFACT: &str = "output.zip";

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> OutputError + '_ {
    move |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes the artifacts for `output` into `output_dir` and returns their paths.
pub fn produce(
    output: &TaskOutput,
    input: &ResolvedInput,
    output_dir: &Path,
    workspace: &Workspace,
    converter: &dyn FormatConverter,
) -> Result<Vec<PathBuf>> {
    match output {
        TaskOutput::Nothing => Ok(Vec::new()),
        TaskOutput::Report(report) => {
            fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
            let json = output_dir.join(JSON_ARTIFACT);
            write_report(&json, report)?;
            info!("Wrote report {}", json.display());
            Ok(vec![json])
        }
        TaskOutput::Dataset(result) => {
            fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;

            // Archived inputs keep the name of their shapefile set.
            let stem = match input {
                ResolvedInput::Archived(set) => set.stem(),
                ResolvedInput::Plain(_) => "output".to_string(),
            };
            let staging = workspace.staging_dir();
            fs::create_dir_all(&staging).map_err(io_error(&staging))?;
            let shp = staging.join(format!("{stem}.shp"));
            converter
                .to_shapefile(result, &shp)
                .map_err(|e| OutputError::Conversion {
                    path: shp.clone(),
                    message: e.to_string(),
                })?;

            let zip = output_dir.join(ZIP_ARTIFACT);
            zip_directory(&staging, &zip)?;
            info!("Wrote {}", zip.display());

            let json = output_dir.join(JSON_ARTIFACT);
            fs::copy(result, &json).map_err(io_error(&json))?;
            info!("Wrote {}", json.display());

            let artifacts = vec![zip, json];
            remove_leftovers(output_dir, &artifacts)?;
            Ok(artifacts)
        }
    }
}

fn write_report(path: &Path, report: &Value) -> Result<()> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, report).map_err(|source| OutputError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error(path))?;
    Ok(())
}

/// Zips the regular files directly inside `dir` under their bare names.
fn zip_directory(dir: &Path, archive: &Path) -> Result<()> {
    let mut members: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    members.sort();

    let archive_error = |source| OutputError::Archive {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::create(archive).map_err(io_error(archive))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for member in &members {
        let Some(name) = member.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(name, options).map_err(archive_error)?;
        let mut source = File::open(member).map_err(io_error(member))?;
        io::copy(&mut source, &mut zip).map_err(io_error(archive))?;
        debug!("adding: {name}");
    }

    let mut writer = zip.finish().map_err(archive_error)?;
    writer.flush().map_err(io_error(archive))?;
    Ok(())
}

/// Deletes every regular file in `dir` that is not one of `keep`.
fn remove_leftovers(dir: &Path, keep: &[PathBuf]) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() && !keep.contains(&path) {
            fs::remove_file(&path).map_err(io_error(&path))?;
            debug!("Removed {}", path.display());
        }
    }
    Ok(())
}
