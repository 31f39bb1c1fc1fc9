use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The exit code the writer tool uses when it was interrupted by the user.
pub const INTERRUPTED_EXIT_CODE: i32 = 255;

/// How a run of the writer tool ended, according to its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolExit {
    Success,
    WrongArguments,
    DeviceNotFound,
    DeviceNotDetachable,
    DeviceNoPartition,
    MountFailed,
    IsoPathNotFound,
    IsoTooLargeForFilesystem,
    InsufficientSpace,
    DistributionUndetermined,
    TargetIsoNotFound,
    HashMismatch,
    CopyFailed,
    DeviceBusy,
    /// The run was cancelled. This is not reported as a failure.
    Interrupted,
    UnknownError(i32),
}

impl ToolExit {
    /// Classify an exit code. Every integer maps to exactly one variant.
    pub fn classify(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::WrongArguments,
            2 => Self::DeviceNotFound,
            3 => Self::DeviceNotDetachable,
            4 => Self::DeviceNoPartition,
            5 => Self::MountFailed,
            6 => Self::IsoPathNotFound,
            7 => Self::IsoTooLargeForFilesystem,
            8 => Self::InsufficientSpace,
            9 => Self::DistributionUndetermined,
            10 => Self::TargetIsoNotFound,
            11 => Self::HashMismatch,
            12 => Self::CopyFailed,
            13 => Self::DeviceBusy,
            INTERRUPTED_EXIT_CODE => Self::Interrupted,
            other => Self::UnknownError(other),
        }
    }

    /// Classify the final result of a task. A task that finished without
    /// reporting a code (its worker died, or the process was killed by a
    /// signal) is an unknown outcome.
    pub fn from_status(code: Option<i32>) -> Self {
        match code {
            Some(c) => Self::classify(c),
            None => Self::UnknownError(-1),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Success | Self::Interrupted)
    }

    /// The exit code this classification was produced from.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::WrongArguments => 1,
            Self::DeviceNotFound => 2,
            Self::DeviceNotDetachable => 3,
            Self::DeviceNoPartition => 4,
            Self::MountFailed => 5,
            Self::IsoPathNotFound => 6,
            Self::IsoTooLargeForFilesystem => 7,
            Self::InsufficientSpace => 8,
            Self::DistributionUndetermined => 9,
            Self::TargetIsoNotFound => 10,
            Self::HashMismatch => 11,
            Self::CopyFailed => 12,
            Self::DeviceBusy => 13,
            Self::Interrupted => INTERRUPTED_EXIT_CODE,
            Self::UnknownError(c) => *c,
        }
    }

    /// The code this program should exit with after the run. Success and
    /// interruption exit cleanly. Unknown outcomes exit with 1 so they can't
    /// wrap around into the interrupted code.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Success | Self::Interrupted => 0,
            Self::UnknownError(_) => 1,
            known => known.code(),
        }
    }
}

impl Display for ToolExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolExit::Success | ToolExit::Interrupted => {
                write!(f, "The USB was successfully written.")
            }
            ToolExit::WrongArguments => write!(f, "Wrong arguments were passed."),
            ToolExit::DeviceNotFound => write!(f, "The device was not found."),
            ToolExit::DeviceNotDetachable => write!(f, "The device is not detachable."),
            ToolExit::DeviceNoPartition => write!(f, "The device has no partition."),
            ToolExit::MountFailed => write!(f, "Unable to mount the device."),
            ToolExit::IsoPathNotFound => write!(f, "Given ISO path was not found."),
            ToolExit::IsoTooLargeForFilesystem => write!(
                f,
                "ISO too large for FAT formatted USB (max 4GB).\n\
                 Format the USB to exFAT, NTFS, ext4, etc."
            ),
            ToolExit::InsufficientSpace => {
                write!(f, "There is not enough space available on the device.")
            }
            ToolExit::DistributionUndetermined => write!(
                f,
                "Unable to determine the distribution name.\n\
                 Force a distribution with --force-distro."
            ),
            ToolExit::TargetIsoNotFound => {
                write!(f, "Cannot find the target ISO file. Did you insert the USB?")
            }
            ToolExit::HashMismatch => write!(f, "Hash mismatch."),
            ToolExit::CopyFailed => write!(f, "Copy of ISO failed."),
            ToolExit::DeviceBusy => write!(f, "Device is in use by another application."),
            ToolExit::UnknownError(code) => {
                write!(f, "An unknown error has occurred (exit code {code}).")
            }
        }
    }
}
