//! Filesystem helpers for metadata and export artefacts, built on `cap-std`
//! and `camino`.
//!
//! Writers never leave a half-written target behind: content goes to a hidden
//! sibling file first and is renamed over the destination once flushed.
#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

/// Open the directory containing `path` and return it with the file name.
///
/// # Errors
/// Fails when `path` has no file name or its parent cannot be opened.
pub fn open_parent_dir(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Create every missing ancestor directory of `path`.
///
/// # Errors
/// Propagates directory creation failures.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() {
        return Ok(());
    }
    let (base, relative) = split_base(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base.create_dir_all(&relative)
}

/// Read `path` as UTF-8, returning `None` when it does not exist.
///
/// # Errors
/// Propagates every failure other than a missing file.
pub fn read_optional(path: &Utf8Path) -> io::Result<Option<String>> {
    let (dir, name) = match open_parent_dir(path) {
        Ok(found) => found,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    match dir.read_to_string(&name) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Replace `path` with `contents`, creating parent directories as needed.
///
/// The bytes are written to a hidden temporary sibling, synced, and renamed
/// over the target, so readers see either the old file or the new one.
///
/// # Errors
/// Propagates I/O failures; the temporary file is removed on a failed write.
pub fn write_atomically(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_parent_dir(path)?;
    let staging = format!(".{name}.partial");

    let written = dir.create(&staging).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(err) = written {
        // Cleanup is best effort.
        let _removed = dir.remove_file(&staging);
        return Err(err);
    }
    dir.rename(&staging, &dir, &name)
}

fn split_base(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();
    let base = match std_parent.components().next() {
        Some(Component::Prefix(prefix)) => {
            let drive = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            Utf8PathBuf::from(drive).join(std::path::MAIN_SEPARATOR_STR)
        }
        Some(Component::RootDir) => Utf8PathBuf::from(std::path::MAIN_SEPARATOR_STR),
        _ => Utf8PathBuf::from("."),
    };
    let relative = if base.as_str() == "." {
        parent.to_path_buf()
    } else {
        parent
            .strip_prefix(&base)
            .map_err(|_| io::Error::other(format!("cannot split {parent} at {base}")))?
            .to_path_buf()
    };
    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn temp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn utf8(dir: &TempDir, relative: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(relative)).expect("temp path should be UTF-8")
    }

    #[rstest]
    fn creates_missing_parents(temp: TempDir) {
        let target = utf8(&temp, "a/b/c/data.json");
        ensure_parent_dir(&target).expect("create parents");
        assert!(target.parent().is_some_and(Utf8Path::is_dir));
    }

    #[rstest]
    fn atomic_write_replaces_contents(temp: TempDir) {
        let target = utf8(&temp, "nested/export.csv");
        write_atomically(&target, b"first").expect("first write");
        write_atomically(&target, b"second").expect("second write");

        assert_eq!(read_optional(&target).expect("read"), Some("second".to_owned()));
        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("nested"))
            .expect("list dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[rstest]
    #[case("missing.json")]
    #[case("absent/dir/missing.json")]
    fn missing_files_read_as_none(temp: TempDir, #[case] relative: &str) {
        assert_eq!(read_optional(&utf8(&temp, relative)).expect("read"), None);
    }
}
