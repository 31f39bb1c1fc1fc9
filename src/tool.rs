//! Typed invocations of the external `usb-creator` writer tool.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{escalation::Command, task::capture_lines};

/// Default name of the writer tool on `$PATH`.
pub const DEFAULT_TOOL: &str = "usb-creator";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandBuildError {
    #[error("Partitioning the device and writing a single ISO cannot be combined")]
    PartitionWithSingleFile,
    #[error("Path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error("Distribution key must be a single non-empty word, got {0:?}")]
    BadDistributionKey(String),
}

/// The writer tool executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    program: String,
}

impl Default for Tool {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl Tool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command<'static> {
        Command::new(self.program.clone())
    }

    /// Start building a write of `source` (an ISO or a directory of ISOs)
    /// onto `device`.
    pub fn write(&self, source: impl Into<PathBuf>, device: impl Into<PathBuf>) -> WriteCommand {
        WriteCommand {
            tool: self.clone(),
            source: source.into(),
            device: device.into(),
            distribution: None,
            partition: false,
            single_file: false,
        }
    }

    /// `tool -r <iso on device> <device>`
    pub fn remove(&self, iso: &Path, device: &Path) -> Result<Command<'static>, CommandBuildError> {
        Ok(self
            .command()
            .arg("-r")
            .arg(path_arg(iso)?)
            .arg(path_arg(device)?))
    }

    /// `tool -D`
    pub fn list_distributions_command(&self) -> Command<'static> {
        self.command().arg("-D")
    }

    /// `tool -l <iso>`
    pub fn volume_label_command(&self, iso: &Path) -> Result<Command<'static>, CommandBuildError> {
        Ok(self.command().arg("-l").arg(path_arg(iso)?))
    }

    /// Ask the tool which distribution keys it knows, sorted.
    pub fn distributions(&self) -> Vec<String> {
        let lines = capture_lines(&self.list_distributions_command());
        parse_distributions(&lines)
    }

    /// Ask the tool for the volume label of an ISO.
    pub fn volume_label(&self, iso: &Path) -> Option<String> {
        let cmd = self.volume_label_command(iso).ok()?;
        let label = capture_lines(&cmd).into_iter().next()?;
        debug!(?iso, label, "Read volume label");
        let label = label.trim();
        (!label.is_empty()).then(|| label.to_owned())
    }
}

/// Builder for `tool [-f <distro>] [-p | -u] <source> <device>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    tool: Tool,
    source: PathBuf,
    device: PathBuf,
    distribution: Option<String>,
    partition: bool,
    single_file: bool,
}

impl WriteCommand {
    /// Force the distribution instead of letting the tool detect it.
    pub fn distribution(mut self, key: Option<String>) -> Self {
        self.distribution = key;
        self
    }

    /// Partition the device before copying. Destroys all data on it.
    pub fn partition(mut self, partition: bool) -> Self {
        self.partition = partition;
        self
    }

    /// Overwrite the device with a single ISO.
    pub fn single_file(mut self, single_file: bool) -> Self {
        self.single_file = single_file;
        self
    }

    pub fn build(self) -> Result<Command<'static>, CommandBuildError> {
        if self.partition && self.single_file {
            return Err(CommandBuildError::PartitionWithSingleFile);
        }

        let mut cmd = self.tool.command();
        if let Some(key) = self.distribution {
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(CommandBuildError::BadDistributionKey(key));
            }
            cmd = cmd.arg("-f").arg(key);
        }
        if self.partition {
            cmd = cmd.arg("-p");
        }
        if self.single_file {
            cmd = cmd.arg("-u");
        }

        Ok(cmd
            .arg(path_arg(&self.source)?)
            .arg(path_arg(&self.device)?))
    }
}

fn path_arg(p: &Path) -> Result<String, CommandBuildError> {
    p.to_str()
        .map(str::to_owned)
        .ok_or_else(|| CommandBuildError::NonUtf8Path(p.to_owned()))
}

fn parse_distributions(lines: &[String]) -> Vec<String> {
    let mut keys: Vec<String> = lines
        .first()
        .map(|l| l.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default();
    keys.sort();
    keys
}
