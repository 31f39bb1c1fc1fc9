use std::{
    path::{Path, PathBuf},
    process::exit,
};

use anyhow::Context;
use bytesize::ByteSize;
use clap::Parser;
use inquire::{Confirm, InquireError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    capacity::has_room,
    config::Config,
    device::{DriveCatalog, VolumeService},
    escalation::{self, Escalate},
    exit_code::ToolExit,
    inventory::{self, IsoEntry},
    job::WriteJob,
    logging::init_logging,
    logo::LogoCatalog,
    session::{DriveSelection, Session, WriteOptions},
    session_log::SessionLog,
    task::TaskRunner,
    tool::Tool,
    ui::{
        cli::{
            Args, Command, DeviceArgs, LogoArgs, OutputArgs, PlanArgs, RemoveArgs, UnmountArgs,
            WriteArgs,
        },
        simple::run_write_ui,
    },
};

#[tokio::main]
pub async fn main() {
    let args = Args::parse();
    let paths = match init_logging(args.verbosity) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Could not set up logging: {e}");
            exit(1);
        }
    };

    debug!(?paths, "Starting");
    match inner_main(args).await {
        Ok(code) => exit(code),
        Err(e) => handle_toplevel_error(e),
    }
}

fn handle_toplevel_error(err: anyhow::Error) -> ! {
    if let Some(e) = err.downcast_ref::<InquireError>() {
        match e {
            InquireError::OperationCanceled
            | InquireError::OperationInterrupted
            | InquireError::NotTTY => {
                eprintln!("{e}");
                exit(1);
            }
            _ => panic!("{err}"),
        }
    }
    warn!("{err:#}");
    eprintln!("Error: {err:#}");
    exit(1);
}

/// Everything the subcommands share.
struct Host {
    config: Config,
    tool: Tool,
    escalate: Escalate,
    service: Box<dyn VolumeService>,
    catalog: DriveCatalog,
}

impl Host {
    fn new(args: &Args) -> anyhow::Result<Self> {
        let config = Config::load(args.config.as_deref())?;
        debug!(?config, "Using config");
        let mut host = Self {
            tool: Tool::new(config.tool.clone()),
            escalate: args.escalate.unwrap_or(config.escalate),
            service: volume_service(),
            catalog: DriveCatalog::new(),
            config,
        };
        host.refresh();
        Ok(host)
    }

    fn refresh(&mut self) {
        self.catalog.refresh(self.service.as_ref());
    }

    fn select(&mut self, device: &Path) -> anyhow::Result<DriveSelection> {
        let selection = DriveSelection::select(&mut self.catalog, self.service.as_ref(), device)?;
        if let Some(notice) = &selection.notice {
            eprintln!("{notice}");
        }
        Ok(selection)
    }

    fn logos(&self) -> LogoCatalog {
        LogoCatalog::load(&self.config.icon_dir)
    }

    fn session_log(&self) -> anyhow::Result<SessionLog> {
        let dir = self.config.log_dir()?;
        SessionLog::in_dir(&dir, self.config.max_log_bytes)
            .with_context(|| format!("Could not create {}", dir.display()))
    }
}

#[cfg(target_os = "linux")]
fn volume_service() -> Box<dyn VolumeService> {
    Box::new(crate::device::LinuxVolumeService::new())
}

#[cfg(not(target_os = "linux"))]
fn volume_service() -> Box<dyn VolumeService> {
    Box::new(crate::device::UnsupportedPlatform)
}

async fn inner_main(args: Args) -> anyhow::Result<i32> {
    let mut host = Host::new(&args)?;

    match args.command {
        Command::Drives(a) => list_drives(&host, &a),
        Command::Plan(a) => plan(&mut host, &a),
        Command::Write(a) => write(&mut host, &a).await,
        Command::Remove(a) => remove(&mut host, &a).await,
        Command::Isos(a) => list_isos(&mut host, &a),
        Command::Logo(a) => logo(&host, &a),
        Command::Distros => {
            for key in host.tool.distributions() {
                println!("{key}");
            }
            Ok(0)
        }
        Command::Unmount(a) => unmount(&mut host, &a),
    }
}

fn list_drives(host: &Host, args: &OutputArgs) -> anyhow::Result<i32> {
    let drives = host.catalog.drives();
    if args.json {
        println!("{}", serde_json::to_string_pretty(drives)?);
        return Ok(0);
    }

    if drives.is_empty() {
        eprintln!("No removable drives found.");
    }
    for d in drives {
        println!("{d}");
        for p in &d.partitions {
            let mount = p
                .mount_point
                .as_deref()
                .map(|m| m.display().to_string())
                .unwrap_or_else(|| "[not mounted]".into());
            println!(
                "    {} | {} | {} free",
                p.devnode.display(),
                mount,
                ByteSize::b(p.free)
            );
        }
    }
    Ok(0)
}

#[derive(Debug, Serialize)]
struct PlanReport<'a> {
    selection: &'a DriveSelection,
    source: Option<&'a Path>,
    required: u64,
    fits: bool,
}

fn plan(host: &mut Host, args: &PlanArgs) -> anyhow::Result<i32> {
    let selection = host.select(&args.device)?;
    let session = Session::new(Some(selection.clone()), Some(args.source.as_path()), args.single_file);

    let report = PlanReport {
        selection: &selection,
        source: session.transfer.source.as_deref(),
        required: session.transfer.required,
        fits: has_room(selection.available, session.transfer.required),
    };

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Available: {}", ByteSize::b(selection.available));
        match report.source {
            Some(_) => println!("Required: {}", ByteSize::b(report.required)),
            None => println!("Required: - (no ISO at {})", args.source.display()),
        }
        if !report.fits {
            println!("There is not enough space available on the pen drive.");
        }
    }
    Ok(if report.fits { 0 } else { 1 })
}

async fn write(host: &mut Host, args: &WriteArgs) -> anyhow::Result<i32> {
    let selection = host.select(&args.device)?;
    let session = Session::new(Some(selection), Some(args.source.as_path()), args.single_file);
    let options = WriteOptions {
        distribution: args.distribution.clone(),
        partition: args.partition,
        single_file: args.single_file,
    };

    let cmd = session.preflight(&host.catalog, &host.tool, &args.source, &options)?;
    if (args.partition || args.single_file) && !confirm_destroy(args.force)? {
        eprintln!("Aborting.");
        return Ok(1);
    }

    let cmd = escalation::prepare(cmd, host.escalate)?;
    let mut job = WriteJob::new(host.session_log()?, host.config.tail_lines);
    let mut runner = TaskRunner::new();
    job.start(&mut runner, cmd, session.transfer.required)?;

    let exit = run_write_ui(&mut job, host.config.poll_interval()).await?;
    info!(%exit, "Tool exited");
    if exit.is_error() {
        eprintln!("{exit}");
        eprintln!("See {} for details.", job.log().path().display());
    }

    host.refresh();
    if let Ok(selection) = host.select(&args.device) {
        print_isos(host, &selection);
    }

    Ok(exit.process_exit_code())
}

fn confirm_destroy(force: bool) -> Result<bool, InquireError> {
    if force {
        Ok(true)
    } else {
        Confirm::new("Is this the right device?")
            .with_help_message("THIS ACTION WILL DESTROY ALL DATA ON THIS DEVICE!!!")
            .with_default(false)
            .prompt()
    }
}

async fn remove(host: &mut Host, args: &RemoveArgs) -> anyhow::Result<i32> {
    let selection = host.select(&args.device)?;
    let Some(mount) = selection.mount.clone() else {
        anyhow::bail!("{} is not mounted", args.device.display());
    };

    let isos: Vec<PathBuf> = args
        .isos
        .iter()
        .map(|name| mount.join(name))
        .filter(|p| {
            let exists = p.exists();
            if !exists {
                eprintln!("No such ISO on the device: {}", p.display());
            }
            exists
        })
        .collect();
    if isos.is_empty() {
        return Ok(1);
    }

    if !args.force
        && !Confirm::new("Are you sure you want to remove the selected ISO from the device?")
            .with_default(false)
            .prompt()?
    {
        eprintln!("Aborting.");
        return Ok(1);
    }

    let log = host.session_log()?;
    let mut commands = Vec::with_capacity(isos.len());
    for iso in &isos {
        if let Err(e) = log.write(&format!("Remove ISO: {}", iso.display())) {
            warn!("Could not write to {}: {e}", log.path().display());
        }
        let cmd = host.tool.remove(iso, &selection.device)?;
        commands.push(escalation::prepare(cmd, host.escalate)?);
    }

    let mut runner = TaskRunner::new();
    let mut handle = runner.execute(commands, false)?;
    let mut failed = false;
    for iso in &isos {
        let Some(result) = handle.next().await else {
            break;
        };
        let exit = ToolExit::from_status(result.exit_code());
        if exit.is_error() {
            failed = true;
            eprintln!("Could not remove {}: {exit}", iso.display());
        } else {
            println!("Removed {}", iso.display());
        }
        debug!(?result, "Remove finished");
    }

    host.refresh();
    if let Ok(selection) = host.select(&args.device) {
        print_isos(host, &selection);
    }
    Ok(if failed { 1 } else { 0 })
}

fn list_isos(host: &mut Host, args: &DeviceArgs) -> anyhow::Result<i32> {
    let selection = host.select(&args.device)?;
    if args.output.json {
        let entries = isos_on(host, &selection);
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print_isos(host, &selection);
    }
    Ok(0)
}

fn isos_on(host: &Host, selection: &DriveSelection) -> Vec<IsoEntry> {
    match &selection.mount {
        Some(mount) => inventory::list(mount, &host.logos(), &host.tool),
        None => vec![],
    }
}

fn print_isos(host: &Host, selection: &DriveSelection) {
    let entries = isos_on(host, selection);
    println!(
        "ISOs on {} ({} available):",
        selection.device.display(),
        ByteSize::b(selection.available)
    );
    if entries.is_empty() {
        println!("    [none]");
    }
    for e in entries {
        println!("    {} | {} | {}", e.name, ByteSize::b(e.size), e.logo.key);
    }
}

fn logo(host: &Host, args: &LogoArgs) -> anyhow::Result<i32> {
    let entry = host.logos().best_match(&args.name);
    println!("{} {}", entry.key, entry.icon.display());
    Ok(0)
}

fn unmount(host: &mut Host, args: &UnmountArgs) -> anyhow::Result<i32> {
    match host
        .catalog
        .unmount_drive(host.service.as_ref(), &args.device)
    {
        Ok(()) => {
            host.refresh();
            println!("You can now safely remove the device.");
            Ok(0)
        }
        Err(e) => {
            warn!("{e}");
            eprintln!("Could not unmount the device. Please unmount the device manually.");
            Ok(1)
        }
    }
}
