//! Blocking filesystem mechanics for a single operation item.

use crate::error::ItemFailure;
use crate::ops::types::{ConflictResolution, OperationItem, OperationKind};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Result of running an item once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(Option<PathBuf>),
    Skipped,
    /// Destination exists and no resolution was given
    Conflict(PathBuf),
}

/// Run `item` on the filesystem
pub fn perform(
    item: &OperationItem,
    resolution: Option<ConflictResolution>,
) -> Result<Outcome, ItemFailure> {
    let source = item.source.as_path();
    if !exists(source) {
        return Err(ItemFailure::NotFound(source.to_path_buf()));
    }

    let target = match (item.kind, &item.target) {
        (OperationKind::Delete, _) => {
            remove_path(source).map_err(|e| ItemFailure::from_io(source, &e))?;
            return Ok(Outcome::Done(None));
        }
        (_, Some(target)) => target.clone(),
        (_, None) => {
            return Err(ItemFailure::Io {
                path: source.to_path_buf(),
                message: "missing destination".to_string(),
            });
        }
    };

    // A target equal to its source is taken by the source itself
    let onto_itself = target == source;
    if !onto_itself && !exists(&target) {
        transfer(item.kind, source, &target).map_err(|e| ItemFailure::from_io(source, &e))?;
        return Ok(Outcome::Done(Some(target)));
    }

    match resolution {
        None => Ok(Outcome::Conflict(target)),
        Some(ConflictResolution::Skip) => {
            debug!(?source, ?target, "Destination exists, skipping");
            Ok(Outcome::Skipped)
        }
        Some(ConflictResolution::KeepBoth) if onto_itself && item.kind != OperationKind::Copy => {
            debug!(?source, "Moving onto itself, nothing to keep");
            Ok(Outcome::Skipped)
        }
        Some(ConflictResolution::Overwrite) if onto_itself => {
            debug!(?source, "Overwriting itself, nothing to do");
            Ok(Outcome::Skipped)
        }
        Some(ConflictResolution::KeepBoth) => {
            let unique = unique_name(&target)?;
            transfer(item.kind, source, &unique).map_err(|e| ItemFailure::from_io(source, &e))?;
            Ok(Outcome::Done(Some(unique)))
        }
        Some(ConflictResolution::Overwrite) => {
            overwrite(item.kind, source, &target).map_err(|e| ItemFailure::from_io(source, &e))?;
            Ok(Outcome::Done(Some(target)))
        }
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn transfer(kind: OperationKind, source: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match kind {
        OperationKind::Copy => copy_path(source, dest),
        OperationKind::Move | OperationKind::Rename => move_path(source, dest),
        OperationKind::Delete => remove_path(source),
    }
}

/// Resolve a taken name by adding a numeric suffix
pub fn unique_name(path: &Path) -> Result<PathBuf, ItemFailure> {
    let invalid = || ItemFailure::Io {
        path: path.to_path_buf(),
        message: "invalid file name".to_string(),
    };
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    (1..10000)
        .map(|i| parent.join(format!("{}_{}{}", stem, i, extension)))
        .find(|candidate| !exists(candidate))
        .ok_or_else(|| ItemFailure::Io {
            path: path.to_path_buf(),
            message: "could not find a free name".to_string(),
        })
}

/// Replace `target` with `source`, restoring the original if anything fails
fn overwrite(kind: OperationKind, source: &Path, target: &Path) -> io::Result<()> {
    let backup = sibling(target, "backup");

    if kind == OperationKind::Copy {
        let temp = sibling(target, "tmp");
        if let Err(e) = copy_path(source, &temp) {
            let _ = remove_path(&temp);
            return Err(e);
        }
        if let Err(e) = fs::rename(target, &backup) {
            let _ = remove_path(&temp);
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp, target) {
            let _ = fs::rename(&backup, target);
            let _ = remove_path(&temp);
            return Err(e);
        }
    } else {
        fs::rename(target, &backup)?;
        if let Err(e) = move_path(source, target) {
            let _ = fs::rename(&backup, target);
            return Err(e);
        }
    }

    if let Err(e) = remove_path(&backup) {
        debug!(?backup, error = %e, "Failed to remove overwrite backup");
    }
    Ok(())
}

fn sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.gallery-{}-{}", name, tag, uuid::Uuid::new_v4()))
}

fn copy_path(source: &Path, dest: &Path) -> io::Result<()> {
    if fs::symlink_metadata(source)?.is_dir() {
        copy_dir(source, dest)
    } else {
        copy_file(source, dest)?;
        preserve_mtime(source, dest);
        Ok(())
    }
}

fn copy_dir(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            copy_file(entry.path(), &target)?;
            preserve_mtime(entry.path(), &target);
        } else {
            debug!(path = ?entry.path(), "Skipping special file during copy");
        }
    }
    Ok(())
}

/// Move by rename, falling back to copy + delete across filesystems
fn move_path(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(?source, ?dest, "Rename crosses devices, copying instead");
            copy_path(source, dest)?;
            remove_path(source)
        }
        Err(e) => Err(e),
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Copy file with buffered I/O for efficiency
fn copy_file(source: &Path, dest: &Path) -> io::Result<()> {
    let src_file = File::open(source)?;
    let dest_file = File::create(dest)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, src_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }

    writer.flush()?;
    Ok(())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    if let Ok(metadata) = fs::metadata(source)
        && let Ok(mtime) = metadata.modified()
    {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
    }
}
