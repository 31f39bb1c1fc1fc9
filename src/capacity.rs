//! Space accounting for a pending copy onto the working partition.
//!
//! All sizes are bytes. Conversion to KB/MB only happens when printing.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use bytesize::ByteSize;
use tracing::{debug, trace, warn};

/// The copy the user currently has selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingTransfer {
    /// ISO file or directory of ISOs. `None` when nothing valid is selected.
    pub source: Option<PathBuf>,
    /// Bytes that will additionally be consumed on the destination.
    pub required: u64,
}

impl PendingTransfer {
    /// Resolve `source` against a destination mount point.
    ///
    /// A source that does not exist, or a directory holding no ISOs, gives an
    /// empty transfer rather than an error.
    #[tracing::instrument(level = "debug")]
    pub fn resolve(source: &Path, destination: Option<&Path>, single_file_mode: bool) -> Self {
        if !source.exists() {
            debug!("Source does not exist, nothing pending");
            return Self::default();
        }
        if source.is_dir() && list_isos(source).is_empty() {
            debug!("Source directory holds no ISOs, nothing pending");
            return Self::default();
        }

        let required = compute_required(source, destination, single_file_mode);
        debug!(required = %ByteSize::b(required), "Resolved pending transfer");
        Self {
            source: Some(source.to_owned()),
            required,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.source.is_some()
    }
}

/// Compute how many bytes copying `source` onto `destination` will consume.
///
/// Files that already exist at the destination under the same name are
/// replaced, so only the difference counts. Differences are summed first and
/// the total is then clamped to zero.
pub fn compute_required(source: &Path, destination: Option<&Path>, single_file_mode: bool) -> u64 {
    if !source.exists() {
        return 0;
    }

    let delta: i128 = if source.is_dir() {
        list_isos(source)
            .iter()
            .map(|iso| replacement_delta(iso, destination))
            .sum()
    } else if single_file_mode {
        path_size(source) as i128
    } else {
        replacement_delta(source, destination)
    };

    trace!(delta, "Raw space delta");
    delta.max(0).try_into().unwrap_or(u64::MAX)
}

/// Whether `required` bytes fit into `available`.
pub fn has_room(available: u64, required: u64) -> bool {
    available >= required
}

/// Size of `source` minus the size of the same-named file at `destination`.
fn replacement_delta(source: &Path, destination: Option<&Path>) -> i128 {
    let existing = match (destination, source.file_name()) {
        (Some(dest), Some(name)) => {
            let candidate = dest.join(name);
            if candidate.exists() {
                path_size(&candidate)
            } else {
                0
            }
        }
        _ => 0,
    };
    path_size(source) as i128 - existing as i128
}

/// All `*.iso` files directly inside `dir`, sorted by name.
pub fn list_isos(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(?dir, "Could not read directory: {e}");
            return vec![];
        }
    };

    let mut isos: Vec<PathBuf> = entries
        .filter_map(|r| r.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_iso(p))
        .collect();
    isos.sort();
    isos
}

fn is_iso(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("iso"))
        .unwrap_or(false)
}

/// Total size of all regular files under `path`. A symlink given as `path`
/// is followed, but symlinks found inside a directory are not.
/// Unreadable entries count as zero.
pub fn path_size(path: &Path) -> u64 {
    match fs::metadata(path).and_then(|meta| size_of(path, meta)) {
        Ok(s) => s,
        Err(e) => {
            warn!(?path, "Could not size path: {e}");
            0
        }
    }
}

fn size_of(path: &Path, meta: fs::Metadata) -> io::Result<u64> {
    let ty = meta.file_type();

    if ty.is_file() {
        Ok(meta.len())
    } else if ty.is_dir() {
        let mut total = 0;
        for entry in fs::read_dir(path)? {
            let entry = entry?.path();
            total += match fs::symlink_metadata(&entry) {
                Ok(m) if m.file_type().is_symlink() => 0,
                Ok(m) => size_of(&entry, m).unwrap_or_else(|e| {
                    warn!(?entry, "Could not size path: {e}");
                    0
                }),
                Err(e) => {
                    warn!(?entry, "Could not size path: {e}");
                    0
                }
            };
        }
        Ok(total)
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use tempfile::TempDir;

    use super::*;

    const KB: u64 = 1024;

    fn make_file(dir: &Path, name: &str, size: u64) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().set_len(size).unwrap();
        path
    }

    #[test]
    fn directory_replacing_existing_iso() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        make_file(src.path(), "a.iso", 1000 * KB);
        make_file(src.path(), "b.iso", 500 * KB);
        make_file(dest.path(), "a.iso", 1000 * KB);

        let required = compute_required(src.path(), Some(dest.path()), false);

        assert_eq!(required, 500 * KB);
    }

    #[test]
    fn directory_sums_before_clamping() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        // a shrinks by 800 KB, b grows by 300 KB
        make_file(src.path(), "a.iso", 200 * KB);
        make_file(dest.path(), "a.iso", 1000 * KB);
        make_file(src.path(), "b.iso", 300 * KB);

        assert_eq!(compute_required(src.path(), Some(dest.path()), false), 0);

        // with a growing more than the shrink, the shrink still offsets it
        make_file(src.path(), "c.iso", 700 * KB);
        assert_eq!(
            compute_required(src.path(), Some(dest.path()), false),
            200 * KB
        );
    }

    #[test]
    fn directory_ignores_non_iso_files() {
        let src = TempDir::new().unwrap();
        make_file(src.path(), "a.iso", 10 * KB);
        make_file(src.path(), "README.txt", 99 * KB);
        make_file(src.path(), "b.ISO", 5 * KB);

        assert_eq!(compute_required(src.path(), None, false), 15 * KB);
    }

    #[test]
    fn single_file_with_smaller_existing_copy() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let iso = make_file(src.path(), "distro.iso", 700 * KB);
        make_file(dest.path(), "distro.iso", 200 * KB);

        assert_eq!(compute_required(&iso, Some(dest.path()), false), 500 * KB);
    }

    #[test]
    fn single_file_mode_ignores_existing_copy() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let iso = make_file(src.path(), "distro.iso", 700 * KB);
        make_file(dest.path(), "distro.iso", 200 * KB);

        assert_eq!(compute_required(&iso, Some(dest.path()), true), 700 * KB);
    }

    #[test]
    fn single_file_shrinking_is_clamped() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let iso = make_file(src.path(), "distro.iso", 100 * KB);
        make_file(dest.path(), "distro.iso", 900 * KB);

        assert_eq!(compute_required(&iso, Some(dest.path()), false), 0);
    }

    #[test]
    fn missing_source_requires_nothing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.iso");

        assert_eq!(compute_required(&missing, Some(dir.path()), false), 0);
        assert_eq!(
            PendingTransfer::resolve(&missing, None, false),
            PendingTransfer::default()
        );
    }

    #[test]
    fn directory_without_isos_is_not_pending() {
        let src = TempDir::new().unwrap();
        make_file(src.path(), "notes.txt", KB);

        let transfer = PendingTransfer::resolve(src.path(), None, false);

        assert!(!transfer.is_valid());
        assert_eq!(transfer.required, 0);
    }

    #[cfg(unix)]
    #[test]
    fn path_size_skips_symlinks_and_recurses() {
        let dir = TempDir::new().unwrap();
        make_file(dir.path(), "one", 3 * KB);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let inner = make_file(&dir.path().join("sub"), "two", 4 * KB);
        std::os::unix::fs::symlink(&inner, dir.path().join("link")).unwrap();

        assert_eq!(path_size(dir.path()), 7 * KB);
    }

    #[cfg(unix)]
    #[test]
    fn linked_iso_counts_its_target() {
        let store = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let target = make_file(store.path(), "ubuntu.iso", 1000 * KB);
        let link = src.path().join("ubuntu.iso");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(list_isos(src.path()), [link.clone()]);
        assert_eq!(compute_required(&link, None, false), 1000 * KB);
        assert_eq!(compute_required(&link, None, true), 1000 * KB);
        assert_eq!(compute_required(src.path(), None, false), 1000 * KB);
        assert_eq!(
            PendingTransfer::resolve(src.path(), None, false).required,
            1000 * KB
        );
    }

    #[test]
    fn room_check() {
        assert!(has_room(10, 10));
        assert!(has_room(10, 0));
        assert!(!has_room(9, 10));
    }
}
