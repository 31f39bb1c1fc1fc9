use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::escalation::Escalate;

/// Copy bootable ISOs onto a USB drive with the usb-creator tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config to use instead of ~/.usb-creator/usbcreator.toml.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity. Repeat to be more verbose.
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Whether to run the tool as root. Overrides the config.
    #[arg(long, value_enum, global = true)]
    pub escalate: Option<Escalate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List removable drives.
    Drives(OutputArgs),
    /// Show how much space a source needs on a drive.
    Plan(PlanArgs),
    /// Copy an ISO, or a directory of ISOs, onto a drive.
    Write(WriteArgs),
    /// Remove ISOs from a drive.
    Remove(RemoveArgs),
    /// List the ISOs on a drive.
    Isos(DeviceArgs),
    /// Show which logo an ISO name would get.
    Logo(LogoArgs),
    /// List the distributions the tool can be forced to.
    Distros,
    /// Unmount a drive so it can be removed.
    Unmount(UnmountArgs),
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct DeviceArgs {
    /// The drive, i.e. /dev/sdb.
    pub device: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// The drive, i.e. /dev/sdb.
    pub device: PathBuf,

    /// ISO file or directory of ISOs.
    pub source: PathBuf,

    /// Plan for overwriting the drive with a single ISO.
    #[arg(short = 'u', long)]
    pub single_file: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct WriteArgs {
    /// The drive, i.e. /dev/sdb.
    pub device: PathBuf,

    /// ISO file or directory of ISOs.
    pub source: PathBuf,

    /// Force the distribution instead of letting the tool detect it.
    #[arg(short = 'f', long = "force-distro", value_name = "KEY")]
    pub distribution: Option<String>,

    /// Partition the drive first. THIS DESTROYS ALL DATA ON THE DRIVE.
    #[arg(short, long)]
    pub partition: bool,

    /// Overwrite the drive with a single ISO.
    #[arg(short = 'u', long)]
    pub single_file: bool,

    /// If supplied, we will not ask for confirmation before destroying your disk.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// The drive, i.e. /dev/sdb.
    pub device: PathBuf,

    /// File names of the ISOs on the drive.
    #[arg(required = true)]
    pub isos: Vec<String>,

    /// If supplied, we will not ask for confirmation.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct LogoArgs {
    /// ISO file name or volume label.
    pub name: String,
}

#[derive(Parser, Debug)]
pub struct UnmountArgs {
    /// The drive, i.e. /dev/sdb.
    pub device: PathBuf,
}
