use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

use bytesize::ByteSize;
use serde::Serialize;
use tracing::{debug, info, warn};

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use self::linux::LinuxVolumeService;

/// A removable drive, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drive {
    /// A user-friendly name for the drive (i.e. sdb)
    pub name: String,
    pub devnode: PathBuf,
    pub model: Model,
    /// Total size in bytes.
    pub size: u64,
    /// Space not covered by any partition, in bytes.
    pub free: u64,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub devnode: PathBuf,
    pub mount_point: Option<PathBuf>,
    /// Total size in bytes.
    pub size: u64,
    /// Free space on the filesystem in bytes. Zero when unmounted.
    pub free: u64,
}

impl Partition {
    /// Whether the recorded mount point is actually present on disk.
    pub fn is_mounted(&self) -> bool {
        self.mount_point.as_deref().map(Path::exists).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model(pub Option<String>);

impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(m) => write!(f, "{m}"),
            None => write!(f, "[unknown model]"),
        }
    }
}

impl Display for Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} - {}",
            self.devnode.to_string_lossy(),
            self.model,
            ByteSize::b(self.size)
        )
    }
}

/// The platform service that knows about drives and can mount them.
pub trait VolumeService {
    /// List all removable drives with their partitions.
    fn enumerate(&self) -> Result<Vec<Drive>, VolumeError>;

    /// Mount a partition and return where it was mounted.
    fn mount(&self, partition: &Path) -> Result<PathBuf, VolumeError>;

    fn unmount(&self, partition: &Path) -> Result<(), VolumeError>;
}

/// Stands in for a volume service on platforms we cannot enumerate drives on.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPlatform;

impl VolumeService for UnsupportedPlatform {
    fn enumerate(&self) -> Result<Vec<Drive>, VolumeError> {
        Err(VolumeError::Unavailable(std::env::consts::OS.into()))
    }

    fn mount(&self, _partition: &Path) -> Result<PathBuf, VolumeError> {
        Err(VolumeError::Unavailable(std::env::consts::OS.into()))
    }

    fn unmount(&self, _partition: &Path) -> Result<(), VolumeError> {
        Err(VolumeError::Unavailable(std::env::consts::OS.into()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("Volume service is unavailable: {0}")]
    Unavailable(String),
    #[error("{message} (exit code {exit_code:?})")]
    CommandFailed {
        message: String,
        exit_code: Option<i32>,
    },
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("No partition found on {0}. Please format the USB before you continue.")]
    NoPartitionFound(PathBuf),
    #[error("Unknown device {0}")]
    UnknownDevice(PathBuf),
    #[error("Could not mount {partition}: {source}")]
    MountFailed {
        partition: PathBuf,
        #[source]
        source: VolumeError,
    },
    #[error("Could not unmount {partition}: {source}")]
    UnmountFailed {
        partition: PathBuf,
        #[source]
        source: VolumeError,
    },
}

/// The drives currently attached. Rebuilt from scratch on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveCatalog {
    drives: Vec<Drive>,
}

impl DriveCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog with what the service currently reports. A service
    /// failure leaves the catalog empty.
    #[tracing::instrument(skip_all)]
    pub fn refresh(&mut self, service: &dyn VolumeService) {
        self.drives = match service.enumerate() {
            Ok(drives) => drives,
            Err(e) => {
                warn!("Could not enumerate drives: {e}");
                vec![]
            }
        };
        debug!(count = self.drives.len(), "Refreshed drive catalog");
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    pub fn find(&self, devnode: &Path) -> Option<&Drive> {
        self.drives.iter().find(|d| d.devnode == devnode)
    }

    /// The largest partition of `drive`. The first one wins among equals.
    pub fn select_working_partition(drive: &Drive) -> Result<&Partition, CatalogError> {
        let mut best: Option<&Partition> = None;
        for p in &drive.partitions {
            if best.map(|b| p.size > b.size).unwrap_or(true) {
                best = Some(p);
            }
        }
        best.ok_or_else(|| CatalogError::NoPartitionFound(drive.devnode.clone()))
    }

    /// Make sure `partition` is mounted, mounting it if its mount point is
    /// missing. Returns the mount point.
    #[tracing::instrument(skip(self, service))]
    pub fn ensure_mounted(
        &mut self,
        service: &dyn VolumeService,
        partition: &Path,
    ) -> Result<PathBuf, CatalogError> {
        let entry = self
            .partition_mut(partition)
            .ok_or_else(|| CatalogError::UnknownDevice(partition.to_owned()))?;

        if entry.is_mounted() {
            if let Some(mp) = &entry.mount_point {
                return Ok(mp.clone());
            }
        }

        info!("Partition is not mounted, mounting");
        let mount_point =
            service
                .mount(partition)
                .map_err(|source| CatalogError::MountFailed {
                    partition: partition.to_owned(),
                    source,
                })?;
        info!(?mount_point, "Mounted partition");

        entry.mount_point = Some(mount_point.clone());
        Ok(mount_point)
    }

    /// Unmount every mounted partition of a drive so it can be removed.
    #[tracing::instrument(skip(self, service))]
    pub fn unmount_drive(
        &mut self,
        service: &dyn VolumeService,
        drive: &Path,
    ) -> Result<(), CatalogError> {
        let drive = self
            .drives
            .iter_mut()
            .find(|d| d.devnode == drive)
            .ok_or_else(|| CatalogError::UnknownDevice(drive.to_owned()))?;

        for p in drive.partitions.iter_mut().filter(|p| p.mount_point.is_some()) {
            service
                .unmount(&p.devnode)
                .map_err(|source| CatalogError::UnmountFailed {
                    partition: p.devnode.clone(),
                    source,
                })?;
            info!(partition = ?p.devnode, "Unmounted partition");
            p.mount_point = None;
            p.free = 0;
        }
        Ok(())
    }

    fn partition_mut(&mut self, partition: &Path) -> Option<&mut Partition> {
        self.drives
            .iter_mut()
            .flat_map(|d| d.partitions.iter_mut())
            .find(|p| p.devnode == partition)
    }
}
