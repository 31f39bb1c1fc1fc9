//! A write operation in flight: the task running the tool, the log it
//! writes to, and what we have inferred from that log so far.

use tracing::{debug, info, warn};

use crate::{
    escalation::Command,
    exit_code::ToolExit,
    progress::{self, ProgressSample, ProgressState},
    session_log::SessionLog,
    task::{TaskError, TaskPoll, TaskRunner, TaskSlot, TaskState},
};

/// What one tick of the timer found out.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub sample: Option<ProgressSample>,
    /// Set exactly once, on the tick that observed the task complete.
    pub completion: Option<ToolExit>,
}

/// Evaluate a log tail against the state of the task that writes to it.
pub fn evaluate(lines: &[String], task: &TaskState, required: u64) -> Tick {
    let sample = progress::scan(lines, required);
    let completion = match task {
        TaskState::Completed(last) => Some(ToolExit::from_status(
            last.as_ref().and_then(|r| r.exit_code()),
        )),
        TaskState::Pending | TaskState::Running => None,
    };
    Tick { sample, completion }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Idle,
    Running { required: u64 },
    Finished { exit: ToolExit },
}

/// The slot write operations run in. At most one write runs at a time.
#[derive(Debug)]
pub struct WriteJob {
    slot: TaskSlot,
    log: SessionLog,
    tail_len: usize,
    state: JobState,
    progress: ProgressState,
}

impl WriteJob {
    pub fn new(log: SessionLog, tail_len: usize) -> Self {
        Self {
            slot: TaskSlot::new(),
            log,
            tail_len,
            state: JobState::Idle,
            progress: ProgressState::default(),
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, JobState::Running { .. })
    }

    /// Restart the shared log and run `command` in the background.
    ///
    /// `required` is the byte total of the transfer, used to turn byte
    /// counts in the log into fractions.
    #[tracing::instrument(skip(self, runner, command), fields(command = %command))]
    pub fn start(
        &mut self,
        runner: &mut TaskRunner,
        command: Command<'static>,
        required: u64,
    ) -> Result<(), TaskError> {
        // Checked before touching the log, which must not be cleared under a
        // running tool.
        if let Some(id) = self.slot.current_id() {
            return Err(TaskError::AlreadyRunning(id));
        }

        if let Err(e) = self.log.start_session() {
            warn!(path = ?self.log.path(), "Could not restart log: {e}");
        } else if let Err(e) = self.log.write(&command.to_string()) {
            warn!(path = ?self.log.path(), "Could not log command: {e}");
        }

        let id = self.slot.start(runner, vec![command], false)?;
        info!(id, required, grammar = progress::GRAMMAR_VERSION, "Write started");
        self.state = JobState::Running { required };
        self.progress = ProgressState::default();
        Ok(())
    }

    /// Look at the log and the task once. Returns `None` when no write is
    /// running, so polling stops as soon as the task completes.
    pub fn tick(&mut self) -> Option<Tick> {
        let JobState::Running { required } = self.state else {
            return None;
        };

        let task = match self.slot.poll() {
            Some(TaskPoll::Running(_)) => TaskState::Running,
            Some(TaskPoll::Completed { last, .. }) => TaskState::Completed(last),
            None => self.slot.state(),
        };

        let lines = self.log.tail(self.tail_len);
        let tick = evaluate(&lines, &task, required);

        if let Some(sample) = tick.sample {
            self.progress.apply(sample);
        }
        if let Some(exit) = tick.completion {
            info!(%exit, code = exit.code(), "Write finished");
            self.state = JobState::Finished { exit };
        } else {
            debug!(progress = ?self.progress, "Write in progress");
        }

        Some(tick)
    }
}
