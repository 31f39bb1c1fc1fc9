//! The drive and source the user has picked, and the checks that run before
//! anything is written.
//!
//! A [Session] is rebuilt whenever the selection or the catalog changes. It
//! is never patched in place.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use bytesize::ByteSize;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    capacity::{has_room, PendingTransfer},
    device::{CatalogError, DriveCatalog, VolumeService},
    escalation::Command,
    tool::{CommandBuildError, Tool},
};

/// Something the user should be told about the selected drive, which does
/// not prevent using it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectionNotice {
    NoPartition,
    MountFailed(String),
}

impl Display for SelectionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionNotice::NoPartition => write!(
                f,
                "No partition found. Please format the USB before you continue."
            ),
            SelectionNotice::MountFailed(cause) => {
                write!(f, "Unable to mount the device: {cause}")
            }
        }
    }
}

/// A snapshot of the chosen drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveSelection {
    pub device: PathBuf,
    /// The working partition. `None` if the drive has no partitions.
    pub partition: Option<PathBuf>,
    pub mount: Option<PathBuf>,
    /// Total bytes of the working partition, or of the drive without one.
    pub size: u64,
    /// Free bytes we may write to.
    pub available: u64,
    pub notice: Option<SelectionNotice>,
}

impl DriveSelection {
    /// Select `device`, mounting its working partition if needed.
    ///
    /// Only an unknown device is an error. A drive without partitions, or
    /// one that fails to mount, is still selected with a notice attached.
    #[tracing::instrument(skip(catalog, service))]
    pub fn select(
        catalog: &mut DriveCatalog,
        service: &dyn VolumeService,
        device: &Path,
    ) -> Result<Self, CatalogError> {
        let drive = catalog
            .find(device)
            .ok_or_else(|| CatalogError::UnknownDevice(device.to_owned()))?
            .clone();

        let working = match DriveCatalog::select_working_partition(&drive).cloned() {
            Ok(p) => p,
            Err(e) => {
                warn!("{e}");
                return Ok(Self {
                    device: drive.devnode,
                    partition: None,
                    mount: None,
                    size: drive.size,
                    available: drive.free,
                    notice: Some(SelectionNotice::NoPartition),
                });
            }
        };

        let was_mounted = working.is_mounted();
        let (mount, notice) = match catalog.ensure_mounted(service, &working.devnode) {
            Ok(mp) => (Some(mp), None),
            Err(e) => {
                warn!("{e}");
                (None, Some(SelectionNotice::MountFailed(e.to_string())))
            }
        };

        // Free space is only known for mounted filesystems.
        let mut partition = working;
        if mount.is_some() && !was_mounted {
            catalog.refresh(service);
            if let Some(p) = catalog
                .find(device)
                .and_then(|d| d.partitions.iter().find(|p| p.devnode == partition.devnode))
            {
                partition = p.clone();
            }
        }

        let available = if partition.free == 0 {
            drive.free
        } else {
            partition.free
        };

        let selection = Self {
            device: drive.devnode,
            partition: Some(partition.devnode),
            mount,
            size: partition.size,
            available,
            notice,
        };
        info!(?selection, "Selected device");
        Ok(selection)
    }
}

/// Options of a write, as picked by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub distribution: Option<String>,
    pub partition: bool,
    pub single_file: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("No device selected")]
    NoDevice,
    #[error("Device {0} is no longer attached")]
    DeviceGone(PathBuf),
    #[error("Cannot add ISO from path: {0}. Please browse for an existing ISO.")]
    SourceMismatch(PathBuf),
    #[error("There is not enough space available on the pen drive ({required} required, {available} available). Please remove unneeded files before continuing.")]
    InsufficientSpace {
        required: ByteSize,
        available: ByteSize,
    },
    #[error(transparent)]
    Build(#[from] CommandBuildError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub selection: Option<DriveSelection>,
    pub transfer: PendingTransfer,
}

impl Session {
    /// Resolve `source` against the selection's mount point.
    pub fn new(selection: Option<DriveSelection>, source: Option<&Path>, single_file: bool) -> Self {
        let mount = selection.as_ref().and_then(|s| s.mount.as_deref());
        let transfer = source
            .map(|s| PendingTransfer::resolve(s, mount, single_file))
            .unwrap_or_default();
        Self {
            selection,
            transfer,
        }
    }

    /// Check that a write of `source` can go ahead and build its command.
    ///
    /// `source` is what the user currently asks for. It must be the source
    /// this session was resolved from.
    #[tracing::instrument(skip(self, catalog, tool))]
    pub fn preflight(
        &self,
        catalog: &DriveCatalog,
        tool: &Tool,
        source: &Path,
        options: &WriteOptions,
    ) -> Result<Command<'static>, PreflightError> {
        let selection = self.selection.as_ref().ok_or(PreflightError::NoDevice)?;
        if catalog.find(&selection.device).is_none() || !selection.device.exists() {
            return Err(PreflightError::DeviceGone(selection.device.clone()));
        }

        if self.transfer.source.as_deref() != Some(source) {
            return Err(PreflightError::SourceMismatch(source.to_owned()));
        }

        if !has_room(selection.available, self.transfer.required) {
            return Err(PreflightError::InsufficientSpace {
                required: ByteSize::b(self.transfer.required),
                available: ByteSize::b(selection.available),
            });
        }

        let cmd = tool
            .write(source, &selection.device)
            .distribution(options.distribution.clone())
            .partition(options.partition)
            .single_file(options.single_file)
            .build()?;
        Ok(cmd)
    }
}
