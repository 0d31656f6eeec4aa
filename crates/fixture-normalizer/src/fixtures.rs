use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::Path,
};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::NormalizeError;
use crate::normalize::{NormalizeOptions, Normalized, normalize_str};

/// What happened to one fixture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub path: Utf8PathBuf,
    pub records: usize,
    pub package_records: usize,
    /// False when the file was already normalized and left untouched.
    pub rewritten: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Clean,
    Stale,
}

/// Normalize a diff fixture in place with the default options.
pub fn normalize(path: impl AsRef<Utf8Path>) -> Result<NormalizeOutcome, NormalizeError> {
    normalize_with(path, &NormalizeOptions::default())
}

/// Normalize a diff fixture in place.
///
/// The new content is staged in a sibling temp file and moved over the fixture, so any
/// failure leaves the original bytes on disk.
pub fn normalize_with(
    path: impl AsRef<Utf8Path>,
    options: &NormalizeOptions,
) -> Result<NormalizeOutcome, NormalizeError> {
    let path = path.as_ref();
    let (original, normalized) = prepare(path, options)?;
    let rewritten = normalized.text != original;
    if rewritten {
        write_atomically(path, &normalized.text)?;
    }

    info!(
        %path,
        records = normalized.records,
        package_records = normalized.package_records,
        rewritten,
        "normalized fixture"
    );
    Ok(NormalizeOutcome {
        path: path.to_owned(),
        records: normalized.records,
        package_records: normalized.package_records,
        rewritten,
    })
}

/// Report whether a fixture already matches its normalized rendering, without writing.
pub fn check(
    path: impl AsRef<Utf8Path>,
    options: &NormalizeOptions,
) -> Result<CheckOutcome, NormalizeError> {
    let path = path.as_ref();
    let (original, normalized) = prepare(path, options)?;
    if normalized.text == original {
        debug!(%path, "fixture is normalized");
        Ok(CheckOutcome::Clean)
    } else {
        warn!(%path, "fixture is not normalized");
        Ok(CheckOutcome::Stale)
    }
}

/// Expand a CLI argument into fixture files: a file stands for itself, a directory for every
/// `*.json` file below it.
pub fn discover_fixtures(path: impl AsRef<Utf8Path>) -> Result<Vec<Utf8PathBuf>, NormalizeError> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(vec![path.to_owned()]);
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(path).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| NormalizeError::Io {
            source: io::Error::from(err),
            path: path.to_owned(),
        })?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|s| s.to_str()) != Some("json")
        {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(fixture) => found.push(fixture),
            Err(skipped) => warn!(path = %skipped.display(), "skipping non UTF-8 fixture path"),
        }
    }
    Ok(found)
}

fn prepare(
    path: &Utf8Path,
    options: &NormalizeOptions,
) -> Result<(String, Normalized), NormalizeError> {
    let original = fs::read_to_string(path).map_err(|source| NormalizeError::Io {
        source,
        path: path.to_owned(),
    })?;
    let normalized = normalize_str(&original, options).map_err(|source| NormalizeError::Document {
        source,
        path: path.to_owned(),
    })?;
    Ok((original, normalized))
}

fn write_atomically(path: &Utf8Path, contents: &str) -> Result<(), NormalizeError> {
    let io_err = |source: io::Error| NormalizeError::Io {
        source,
        path: path.to_owned(),
    };

    // Renaming over a read-only file would succeed, truncating it would not.
    let permissions = fs::metadata(path).map_err(io_err)?.permissions();
    if permissions.readonly() {
        return Err(io_err(io::Error::new(
            ErrorKind::PermissionDenied,
            "fixture is read-only",
        )));
    }

    // Stage next to the link target so a symlinked fixture is replaced behind the link.
    let target = fs::canonicalize(path).map_err(io_err)?;
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(dir).map_err(io_err)?;
    staged.write_all(contents.as_bytes()).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    fs::set_permissions(staged.path(), permissions).map_err(io_err)?;
    staged.persist(&target).map_err(|err| io_err(err.error))?;
    Ok(())
}
