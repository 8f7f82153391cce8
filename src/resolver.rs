//! Input resolution.
//!
//! Turns the user's input path into exactly one vector source, and
//! remembers how it was packaged so the output can be packaged the same way.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{InputError, Result};

/// Extension of the primary member expected inside an archive.
pub const SHAPEFILE_EXTENSION: &str = "shp";

/// Shapefile set extracted from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapefileSet {
    /// The `.shp` member; its companions sit next to it.
    pub shp: PathBuf,
}

impl ShapefileSet {
    pub fn stem(&self) -> String {
        self.shp
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }
}

/// GeoJSON document used as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDocument {
    pub path: PathBuf,
}

/// A resolved input together with its packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    Archived(ShapefileSet),
    Plain(VectorDocument),
}

impl ResolvedInput {
    pub fn source_path(&self) -> &Path {
        match self {
            ResolvedInput::Archived(set) => &set.shp,
            ResolvedInput::Plain(doc) => &doc.path,
        }
    }

    pub fn packaging(&self) -> &'static str {
        match self {
            ResolvedInput::Archived(_) => "archived",
            ResolvedInput::Plain(_) => "plain",
        }
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
}

/// Classifies `input` and, for archives, extracts it into `extract_dir`.
pub fn resolve(input: &Path, extract_dir: &Path) -> Result<ResolvedInput> {
    let resolved = if has_extension(input, "zip") {
        ResolvedInput::Archived(ShapefileSet {
            shp: extract_single(input, extract_dir, SHAPEFILE_EXTENSION)?,
        })
    } else if has_extension(input, "json") || has_extension(input, "geojson") {
        if !input.is_file() {
            return Err(InputError::Unreadable {
                path: input.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            }
            .into());
        }
        ResolvedInput::Plain(VectorDocument {
            path: input.to_path_buf(),
        })
    } else {
        return Err(InputError::UnsupportedExtension {
            path: input.to_path_buf(),
        }
        .into());
    };

    info!(
        "Vector source: {} ({})",
        resolved.source_path().display(),
        resolved.packaging()
    );
    Ok(resolved)
}

/// Extracts every member of `archive` and returns the one member with
/// `extension`.
fn extract_single(archive: &Path, dir: &Path, extension: &'static str) -> Result<PathBuf> {
    let file = File::open(archive).map_err(|source| InputError::Unreadable {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|source| InputError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;
    let unreadable = |source: io::Error| InputError::Unreadable {
        path: archive.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(unreadable)?;

    let mut primaries = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|source| InputError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(InputError::UnsafeMember {
                path: archive.to_path_buf(),
                member: entry.name().to_owned(),
            }
            .into());
        };
        let target = dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(unreadable)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(unreadable)?;
        }
        let mut out = File::create(&target).map_err(unreadable)?;
        io::copy(&mut entry, &mut out).map_err(unreadable)?;
        debug!("inflating: {}", target.display());

        if has_extension(&target, extension) {
            primaries.push(target);
        }
    }

    if primaries.len() != 1 {
        return Err(InputError::MemberCount {
            path: archive.to_path_buf(),
            extension,
            found: primaries.len(),
        }
        .into());
    }
    Ok(primaries.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, members: &[&str]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for name in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"data").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn archives_resolve_to_their_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("roads.zip");
        write_zip(&archive, &["roads.shp", "roads.dbf", "roads.shx", "roads.prj"]);

        let extract = dir.path().join("work");
        let resolved = resolve(&archive, &extract).unwrap();

        let ResolvedInput::Archived(set) = resolved else {
            panic!("expected an archived input");
        };
        assert_eq!(set.shp, extract.join("roads.shp"));
        assert_eq!(set.stem(), "roads");
        assert!(extract.join("roads.dbf").exists());
    }

    #[test]
    fn archives_need_exactly_one_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.zip");
        write_zip(&empty, &["readme.txt"]);
        let twice = dir.path().join("twice.zip");
        write_zip(&twice, &["a.shp", "b.shp"]);

        let err = resolve(&empty, &dir.path().join("x")).unwrap_err();
        assert!(err.to_string().contains("found 0"));
        assert_eq!(err.exit_code(), 66);

        let err = resolve(&twice, &dir.path().join("y")).unwrap_err();
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn geojson_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("parcels.geojson");
        fs::write(&doc, "{}").unwrap();

        let resolved = resolve(&doc, &dir.path().join("work")).unwrap();
        assert_eq!(resolved, ResolvedInput::Plain(VectorDocument { path: doc }));
        assert!(!dir.path().join("work").exists());
    }

    #[test]
    fn other_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("dem.tif");
        fs::write(&tif, "x").unwrap();

        let err = resolve(&tif, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Input(InputError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn members_escaping_the_directory_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &["../evil.shp"]);

        let err = resolve(&archive, &dir.path().join("work")).unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }
}
