use std::{
    collections::HashMap,
    ffi::CString,
    fs::{read_dir, read_to_string},
    io, mem,
    os::unix::prelude::OsStrExt,
    path::{Path, PathBuf},
    process::Command,
};

use libc::c_int;
use tracing::{debug, trace, warn};
use which::which;

use super::{Drive, Model, Partition, VolumeError, VolumeService};

const SECTOR_SIZE: u64 = 512;

/// Reads drives out of sysfs and mounts them through udisks.
#[derive(Debug, Clone)]
pub struct LinuxVolumeService {
    sys_block: PathBuf,
    dev: PathBuf,
    mounts: PathBuf,
}

impl Default for LinuxVolumeService {
    fn default() -> Self {
        Self {
            sys_block: "/sys/block".into(),
            dev: "/dev".into(),
            mounts: "/proc/self/mounts".into(),
        }
    }
}

impl LinuxVolumeService {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn with_roots(sys_block: PathBuf, dev: PathBuf, mounts: PathBuf) -> Self {
        Self {
            sys_block,
            dev,
            mounts,
        }
    }

    fn read_drive(&self, sysnode: &Path, mounts: &HashMap<PathBuf, PathBuf>) -> io::Result<Option<Drive>> {
        let Some(name) = sysnode.file_name() else {
            return Ok(None);
        };
        let name = name.to_string_lossy().into_owned();

        if read_sys_file(sysnode.join("removable"))?.as_deref() != Some("1") {
            trace!(name, "Skipping non-removable block device");
            return Ok(None);
        }

        let size = read_sectors(&sysnode.join("size"))?;
        if size == 0 {
            trace!(name, "Skipping empty removable device");
            return Ok(None);
        }
        let model = Model(read_sys_file(sysnode.join("device/model"))?);

        let mut partitions = Vec::new();
        for entry in read_dir(sysnode)? {
            let path = entry?.path();
            if !path.join("partition").exists() {
                continue;
            }
            let Some(pname) = path.file_name() else {
                continue;
            };
            let devnode = self.dev.join(pname);
            let mount_point = mounts.get(&devnode).cloned();
            let free = match &mount_point {
                Some(mp) => free_space(mp).unwrap_or_else(|e| {
                    warn!(?mp, "Could not stat filesystem: {e}");
                    0
                }),
                None => 0,
            };
            partitions.push(Partition {
                devnode,
                mount_point,
                size: read_sectors(&path.join("size"))?,
                free,
            });
        }
        partitions.sort_by(|a, b| a.devnode.cmp(&b.devnode));

        let allocated: u64 = partitions.iter().map(|p| p.size).sum();

        Ok(Some(Drive {
            devnode: self.dev.join(&name),
            name,
            model,
            size,
            free: size.saturating_sub(allocated),
            partitions,
        }))
    }
}

impl VolumeService for LinuxVolumeService {
    #[tracing::instrument(skip_all)]
    fn enumerate(&self) -> Result<Vec<Drive>, VolumeError> {
        let mounts = read_to_string(&self.mounts)
            .map(|s| parse_mounts(&s))
            .unwrap_or_else(|e| {
                warn!("Could not read mount table: {e}");
                HashMap::new()
            });

        let mut drives = Vec::new();
        for entry in read_dir(&self.sys_block)? {
            let path = entry?.path();
            match self.read_drive(&path, &mounts) {
                Ok(Some(d)) => drives.push(d),
                Ok(None) => {}
                Err(e) => warn!(?path, "Could not read block device: {e}"),
            }
        }
        drives.sort_by(|a, b| a.devnode.cmp(&b.devnode));

        debug!(count = drives.len(), "Enumerated removable drives");
        Ok(drives)
    }

    fn mount(&self, partition: &Path) -> Result<PathBuf, VolumeError> {
        let stdout = udisksctl(&["mount", "--no-user-interaction", "-b"], partition)?;
        parse_mounted_at(&stdout).ok_or_else(|| VolumeError::CommandFailed {
            message: format!("Unexpected udisksctl output: {stdout}"),
            exit_code: Some(0),
        })
    }

    fn unmount(&self, partition: &Path) -> Result<(), VolumeError> {
        udisksctl(&["unmount", "--no-user-interaction", "-b"], partition)?;
        Ok(())
    }
}

fn udisksctl(args: &[&str], device: &Path) -> Result<String, VolumeError> {
    let proc = which("udisksctl").map_err(|e| VolumeError::Unavailable(format!("{e}")))?;

    debug!(?args, ?device, "Running udisksctl");
    let out = Command::new(proc).args(args).arg(device).output()?;
    if !out.status.success() {
        return Err(VolumeError::CommandFailed {
            message: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            exit_code: out.status.code(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_owned())
}

/// Parses `Mounted /dev/sdb1 at /media/user/LABEL.`
fn parse_mounted_at(stdout: &str) -> Option<PathBuf> {
    let (_, rest) = stdout.split_once(" at ")?;
    let mp = rest.trim().trim_end_matches('.');
    (!mp.is_empty()).then(|| PathBuf::from(mp))
}

/// Maps device node to mount point. The first mount of a device wins.
fn parse_mounts(table: &str) -> HashMap<PathBuf, PathBuf> {
    let mut out = HashMap::new();
    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let (Some(dev), Some(mp)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !dev.starts_with('/') {
            continue;
        }
        out.entry(PathBuf::from(unescape_mount_field(dev)))
            .or_insert_with(|| PathBuf::from(unescape_mount_field(mp)));
    }
    out
}

/// The mount table escapes spaces and friends as three-digit octal.
fn unescape_mount_field(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let oct = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(v) = u8::from_str_radix(oct, 8) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn read_sys_file(p: impl AsRef<Path>) -> io::Result<Option<String>> {
    match read_to_string(p) {
        Ok(s) => Ok(Some(s.trim().to_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn read_sectors(p: &Path) -> io::Result<u64> {
    Ok(read_sys_file(p)?
        .and_then(|s| s.parse::<u64>().ok())
        .map(|n| n * SECTOR_SIZE)
        .unwrap_or(0))
}

/// Turns a C function return into an IO Result
fn io_result(ret: c_int) -> io::Result<()> {
    match ret {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

/// Bytes available to unprivileged users on the filesystem at `path`.
fn free_space(path: &Path) -> io::Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    let mut st = mem::MaybeUninit::<libc::statvfs>::uninit();
    io_result(unsafe { libc::statvfs(c_path.as_ptr(), st.as_mut_ptr()) })?;
    let st = unsafe { st.assume_init() };
    Ok(st.f_bavail as u64 * st.f_frsize as u64)
}
