//! Line-oriented progress display. Draws an indicatif bar when stderr is a
//! terminal, and plain status lines otherwise.

use std::{io, time::Duration};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use is_terminal::IsTerminal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::{
    exit_code::ToolExit,
    job::{Tick, WriteJob},
    progress::Progress,
};

const BAR_LENGTH: u64 = 1000;

/// Poll `job` every `period` until it completes, showing what it does.
#[tracing::instrument(skip_all)]
pub async fn run_write_ui(job: &mut WriteJob, period: Duration) -> anyhow::Result<ToolExit> {
    let interactive = io::stderr().is_terminal();
    let bar = ProgressBar::with_draw_target(
        Some(BAR_LENGTH),
        if interactive {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {spinner:.green} {wide_bar:.green/black} {percent:>3}% {msg}",
    )?);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_message = None;

    loop {
        ticker.tick().await;
        let Some(Tick { sample, completion }) = job.tick() else {
            anyhow::bail!("No write is running");
        };

        if let Some(sample) = sample {
            if last_message != Some(sample.message) {
                if !interactive {
                    eprintln!("{}", sample.message);
                }
                last_message = Some(sample.message);
            }
            bar.set_message(sample.message);
            match sample.progress {
                Progress::Fraction(f) => bar.set_position((f * BAR_LENGTH as f64) as u64),
                Progress::Pulse => bar.tick(),
                Progress::Unchanged => {}
            }
        }

        if let Some(exit) = completion {
            debug!(%exit, "Write completed");
            if exit.is_error() {
                bar.abandon_with_message(exit.to_string());
            } else {
                bar.set_position(BAR_LENGTH);
                bar.finish_with_message(exit.to_string());
            }
            return Ok(exit);
        }
    }
}
