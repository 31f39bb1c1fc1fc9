//! The ISOs already present on a mounted drive.

use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::Serialize;
use tracing::debug;

use crate::{
    capacity::{list_isos, path_size},
    logo::{LogoCatalog, LogoEntry},
    tool::Tool,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsoEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub logo: LogoEntry,
}

/// Something that can tell the volume label of an ISO.
pub trait LabelSource {
    fn volume_label(&self, iso: &Path) -> Option<String>;
}

impl LabelSource for Tool {
    fn volume_label(&self, iso: &Path) -> Option<String> {
        Tool::volume_label(self, iso)
    }
}

/// List the ISOs at the top of `mount`, sorted by name.
///
/// The logo is matched on the file name first, then on the volume label the
/// tool reports, and is the generic one if neither matches.
#[tracing::instrument(skip(logos, labels))]
pub fn list(mount: &Path, logos: &LogoCatalog, labels: &dyn LabelSource) -> Vec<IsoEntry> {
    if !mount.exists() {
        return vec![];
    }

    list_isos(mount)
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let logo = logos
                .try_match(&name)
                .or_else(|| {
                    labels
                        .volume_label(&path)
                        .and_then(|l| logos.try_match(&l))
                })
                .unwrap_or_else(|| logos.default_entry().clone());
            let size = path_size(&path);

            debug!(name, size = %ByteSize::b(size), logo = logo.key.as_str(), "ISO on device");
            IsoEntry {
                path,
                name,
                size,
                logo,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    struct Labels(Option<&'static str>);

    impl LabelSource for Labels {
        fn volume_label(&self, _iso: &Path) -> Option<String> {
            self.0.map(str::to_owned)
        }
    }

    fn logos() -> LogoCatalog {
        LogoCatalog::from_entries(
            ["iso", "linux", "ubuntu", "debian"]
                .map(|k| (k.to_owned(), PathBuf::from(format!("/icons/{k}.png")))),
        )
    }

    #[test]
    fn logos_by_name_then_label_then_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ubuntu-22.04-desktop.iso"), vec![0u8; 64]).unwrap();
        fs::write(dir.path().join("custom.iso"), vec![0u8; 32]).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let with_label = list(dir.path(), &logos(), &Labels(Some("Debian 12 amd64")));
        let without = list(dir.path(), &logos(), &Labels(None));

        let keys: Vec<_> = with_label.iter().map(|e| e.logo.key.as_str()).collect();
        assert_eq!(keys, ["debian", "ubuntu"]);
        assert_eq!(with_label[0].name, "custom.iso");
        assert_eq!(with_label[0].size, 32);

        let keys: Vec<_> = without.iter().map(|e| e.logo.key.as_str()).collect();
        assert_eq!(keys, ["iso", "ubuntu"]);
    }

    #[test]
    fn missing_mount_lists_nothing() {
        assert!(list(Path::new("/not/mounted"), &logos(), &Labels(None)).is_empty());
    }
}
