mod unix;

use serde::Deserialize;
use tracing::debug;

pub use self::unix::{Command, EscalationMethod};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not become root! Searched for sudo, doas, su")]
    UnixNotDetected,
}

/// When to run the writer tool through sudo and friends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Escalate {
    /// Only when we are not already root.
    #[default]
    Auto,
    Always,
    Never,
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Wrap `cmd` so that it runs as root, if the policy asks for it.
pub fn prepare(cmd: Command<'_>, policy: Escalate) -> Result<Command<'static>, Error> {
    let escalate = match policy {
        Escalate::Auto => !is_root(),
        Escalate::Always => true,
        Escalate::Never => false,
    };

    if !escalate {
        return Ok(cmd.into_owned());
    }

    let method = EscalationMethod::detect()?;
    debug!(%method, "Escalating command");
    Ok(method.wrap_command(&cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_leaves_command_alone() {
        let cmd = Command::new("usb-creator").arg("-D");
        assert_eq!(prepare(cmd.clone(), Escalate::Never).unwrap(), cmd);
    }
}
