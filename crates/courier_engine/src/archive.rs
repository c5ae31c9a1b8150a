use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use engine_logging::{engine_debug, engine_info, engine_warn};
use tempfile::Builder;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{ArchiveReport, EngineError, SkippedEntry};

/// Zips every regular file under `root` into a fresh
/// `<staging_dir>/<root name>-<random>.zip`.
///
/// Every call gets its own file name, so two folders with the same name never
/// share an archive. Entry names are relative to `root` and use `/`
/// separators; directories get no entries of their own. Symbolic links to
/// files are archived by content, links to directories are not followed.
/// Unreadable entries and dangling links are skipped and reported.
pub fn build_archive(root: &Path, staging_dir: &Path) -> Result<ArchiveReport, EngineError> {
    if !root.is_dir() {
        return Err(EngineError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }
    fs::create_dir_all(staging_dir)?;

    let tmp = Builder::new()
        .prefix(&format!("{}-", archive_stem(root)))
        .suffix(".zip")
        .tempfile_in(staging_dir)?;
    let tmp_path = tmp.path().to_path_buf();
    let mut zip = ZipWriter::new(BufWriter::new(tmp.reopen()?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::new();
    let mut skipped = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                skip(&mut skipped, path, err.to_string());
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_symlink() {
            match fs::metadata(path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    engine_debug!("not following link {:?}", path);
                    continue;
                }
                Err(err) => {
                    skip(&mut skipped, path.to_path_buf(), format!("broken link: {err}"));
                    continue;
                }
            }
        } else if !entry.file_type().is_file() {
            continue;
        }
        if path == tmp_path {
            continue;
        }
        let Some(name) = entry_name(root, path) else {
            skip(&mut skipped, path.to_path_buf(), "path outside archive root".to_string());
            continue;
        };

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                skip(&mut skipped, path.to_path_buf(), err.to_string());
                continue;
            }
        };
        zip.start_file(name.as_str(), options)?;
        if let Err(err) = io::copy(&mut file, &mut zip) {
            zip.abort_file()?;
            skip(&mut skipped, path.to_path_buf(), err.to_string());
            continue;
        }
        entries.push(name);
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    // Until here a failure drops `tmp` and removes the partial archive.
    let (_, target) = tmp.keep().map_err(|err| EngineError::Io(err.error))?;

    engine_info!(
        "archived {:?} into {:?}: {} entries, {} skipped",
        root,
        target,
        entries.len(),
        skipped.len()
    );
    Ok(ArchiveReport {
        path: target,
        entries,
        skipped,
    })
}

/// Deletes a transient archive. A missing file is not an error.
pub fn discard_archive(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Ok(()) => {
            engine_info!("discarded archive {:?}", path);
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn skip(skipped: &mut Vec<SkippedEntry>, path: PathBuf, reason: String) {
    engine_warn!("skipping {:?}: {}", path, reason);
    skipped.push(SkippedEntry { path, reason });
}

fn archive_stem(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "archive".to_string())
}

fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
