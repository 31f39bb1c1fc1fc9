//! Runs external commands on a background thread and hands their results
//! back over a bounded channel.
//!
//! The worker thread is the only producer and whoever holds the
//! [TaskHandle] is the only consumer. Nothing else is shared between them.

use std::{
    process::Stdio,
    thread::{self, JoinHandle},
};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, info_span, trace};

use crate::escalation::Command;

pub type TaskId = u64;

/// What a single command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// The exit code. `None` if the process could not be started or was
    /// killed by a signal.
    Status(Option<i32>),
    /// The lines the process printed on stdout. Empty if it failed.
    Output(Vec<String>),
}

impl CommandResult {
    /// The exit code, if this result carries one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandResult::Status(code) => *code,
            CommandResult::Output(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    /// The last result the worker posted. `None` if the worker ended without
    /// posting anything.
    Completed(Option<CommandResult>),
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {0} is still running")]
    AlreadyRunning(TaskId),
    #[error("Could not start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Hands out task ids and spawns workers.
#[derive(Debug, Default)]
pub struct TaskRunner {
    next_id: TaskId,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `commands` one after the other on a new thread. Returns without
    /// waiting for any of them.
    ///
    /// Each finished command posts exactly one [CommandResult], in order.
    #[tracing::instrument(skip(self, commands), fields(count = commands.len()))]
    pub fn execute(
        &mut self,
        commands: Vec<Command<'static>>,
        return_output: bool,
    ) -> Result<TaskHandle, TaskError> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = mpsc::channel(commands.len().max(1));
        let join = thread::Builder::new()
            .name(format!("task-{id}"))
            .spawn(move || {
                let _span = info_span!("task", id).entered();
                for cmd in commands {
                    let result = if return_output {
                        CommandResult::Output(capture_lines(&cmd))
                    } else {
                        CommandResult::Status(run_status(&cmd))
                    };
                    debug!(?result, "Command finished");
                    if tx.blocking_send(result).is_err() {
                        info!("Consumer went away, stopping");
                        break;
                    }
                }
            })?;

        info!(id, "Started task");
        Ok(TaskHandle {
            id,
            join,
            rx,
            last: None,
        })
    }
}

/// The consumer end of a running task.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    join: JoinHandle<()>,
    rx: mpsc::Receiver<CommandResult>,
    last: Option<CommandResult>,
}

/// Outcome of a non-blocking look at a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    /// Still running. Holds the results posted since the last poll.
    Running(Vec<CommandResult>),
    /// Finished. Holds the results posted since the last poll and the final
    /// state.
    Completed {
        new: Vec<CommandResult>,
        last: Option<CommandResult>,
    },
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Take whatever results are ready, without blocking.
    ///
    /// A worker that died without posting is seen as completed with no
    /// result, never as running forever.
    pub fn poll(&mut self) -> TaskPoll {
        // Check liveness before draining so that nothing posted between the
        // two steps is lost.
        let finished = self.join.is_finished();
        let mut new = Vec::new();

        loop {
            match self.rx.try_recv() {
                Ok(r) => {
                    trace!(id = self.id, ?r, "Received result");
                    self.last = Some(r.clone());
                    new.push(r);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return TaskPoll::Completed {
                        new,
                        last: self.last.clone(),
                    }
                }
            }
        }

        if finished {
            TaskPoll::Completed {
                new,
                last: self.last.clone(),
            }
        } else {
            TaskPoll::Running(new)
        }
    }

    /// Wait for the next result. `None` once the worker is done.
    pub async fn next(&mut self) -> Option<CommandResult> {
        let r = self.rx.recv().await;
        if let Some(r) = &r {
            self.last = Some(r.clone());
        }
        r
    }

    /// Block until the worker is done and return every result it posted.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(mut self) -> Vec<CommandResult> {
        let mut out = Vec::new();
        while let Some(r) = self.rx.blocking_recv() {
            out.push(r);
        }
        if self.join.join().is_err() {
            error!(id = self.id, "Worker thread panicked");
        }
        out
    }
}

/// Holds at most one task for an operation, refusing to start another while
/// it is in flight.
#[derive(Debug, Default)]
pub struct TaskSlot {
    current: Option<TaskHandle>,
    finished: Option<Option<CommandResult>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        runner: &mut TaskRunner,
        commands: Vec<Command<'static>>,
        return_output: bool,
    ) -> Result<TaskId, TaskError> {
        if let Some(h) = &self.current {
            return Err(TaskError::AlreadyRunning(h.id()));
        }
        let handle = runner.execute(commands, return_output)?;
        let id = handle.id();
        self.current = Some(handle);
        self.finished = None;
        Ok(id)
    }

    /// The id of the task in the slot, if one has not been seen to finish.
    pub fn current_id(&self) -> Option<TaskId> {
        self.current.as_ref().map(TaskHandle::id)
    }

    pub fn state(&self) -> TaskState {
        match (&self.current, &self.finished) {
            (Some(_), _) => TaskState::Running,
            (None, Some(last)) => TaskState::Completed(last.clone()),
            (None, None) => TaskState::Pending,
        }
    }

    /// Poll the task in the slot. Once it completes the slot is freed.
    pub fn poll(&mut self) -> Option<TaskPoll> {
        let poll = self.current.as_mut()?.poll();
        if let TaskPoll::Completed { last, .. } = &poll {
            self.finished = Some(last.clone());
            self.current = None;
        }
        Some(poll)
    }
}

fn run_status(cmd: &Command) -> Option<i32> {
    info!(%cmd, "Executing");
    let status = std::process::Command::from(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(s) => {
            debug!(%s, "Process exited");
            s.code()
        }
        Err(e) => {
            error!(%cmd, "Could not run command: {e}");
            None
        }
    }
}

/// Run `cmd` and return its stdout as lines. Any failure gives no lines.
pub fn capture_lines(cmd: &Command) -> Vec<String> {
    info!(%cmd, "Executing for output");
    let out = match std::process::Command::from(cmd)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            error!(%cmd, "Could not run command: {e}");
            return vec![];
        }
    };
    if !out.status.success() {
        debug!(status = %out.status, "Command failed, discarding output");
        return vec![];
    }

    let text = String::from_utf8_lossy(&out.stdout)
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    let text = text.trim();
    if text.is_empty() {
        return vec![];
    }
    text.split('\n').map(str::to_owned).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn sh(script: &str) -> Command<'static> {
        Command::new("sh").arg("-c").arg(script.to_owned())
    }

    fn poll_until_done(slot: &mut TaskSlot) -> Vec<CommandResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            match slot.poll() {
                Some(TaskPoll::Running(new)) => seen.extend(new),
                Some(TaskPoll::Completed { new, .. }) => {
                    seen.extend(new);
                    return seen;
                }
                None => panic!("slot is empty"),
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("task never completed");
    }

    #[test]
    fn results_arrive_in_order() {
        let mut runner = TaskRunner::new();
        let handle = runner
            .execute(vec![sh("exit 3"), sh("sleep 0.05; exit 0"), sh("exit 7")], false)
            .unwrap();

        let results = handle.wait();

        assert_eq!(
            results,
            [
                CommandResult::Status(Some(3)),
                CommandResult::Status(Some(0)),
                CommandResult::Status(Some(7)),
            ]
        );
    }

    #[test]
    fn execute_returns_before_commands_finish() {
        let mut runner = TaskRunner::new();
        let started = Instant::now();
        let mut handle = runner.execute(vec![sh("sleep 0.5")], false).unwrap();

        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(handle.is_running());
        assert_eq!(handle.poll(), TaskPoll::Running(vec![]));
        handle.wait();
    }

    #[test]
    fn output_mode_captures_lines() {
        let mut runner = TaskRunner::new();
        let handle = runner
            .execute(vec![sh("printf 'ubuntu debian\\r\\nsecond\\n'")], true)
            .unwrap();

        assert_eq!(
            handle.wait(),
            [CommandResult::Output(vec![
                "ubuntu debian".into(),
                "second".into()
            ])]
        );
    }

    #[test]
    fn failed_output_command_gives_no_lines() {
        let mut runner = TaskRunner::new();
        let handle = runner
            .execute(vec![sh("echo partial; exit 2")], true)
            .unwrap();

        assert_eq!(handle.wait(), [CommandResult::Output(vec![])]);
    }

    #[test]
    fn unstartable_command_has_no_status() {
        let mut runner = TaskRunner::new();
        let handle = runner
            .execute(vec![Command::new("/nonexistent/usb-creator")], false)
            .unwrap();

        assert_eq!(handle.wait(), [CommandResult::Status(None)]);
    }

    #[test]
    fn slot_refuses_second_task_and_frees_on_completion() {
        let mut runner = TaskRunner::new();
        let mut slot = TaskSlot::new();
        assert_eq!(slot.state(), TaskState::Pending);

        let id = slot
            .start(&mut runner, vec![sh("sleep 0.2; exit 5")], false)
            .unwrap();
        assert_eq!(slot.state(), TaskState::Running);

        let err = slot.start(&mut runner, vec![sh("true")], false).unwrap_err();
        assert!(matches!(err, TaskError::AlreadyRunning(i) if i == id));

        let seen = poll_until_done(&mut slot);
        assert_eq!(seen, [CommandResult::Status(Some(5))]);
        assert_eq!(
            slot.state(),
            TaskState::Completed(Some(CommandResult::Status(Some(5))))
        );
        assert!(slot.poll().is_none());

        let next = slot.start(&mut runner, vec![sh("true")], false).unwrap();
        assert_ne!(next, id);
        poll_until_done(&mut slot);
    }

    #[test]
    fn empty_task_completes_without_result() {
        let mut runner = TaskRunner::new();
        let mut slot = TaskSlot::new();
        slot.start(&mut runner, vec![], false).unwrap();

        assert!(poll_until_done(&mut slot).is_empty());
        assert_eq!(slot.state(), TaskState::Completed(None));
    }
}
