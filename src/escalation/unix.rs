use std::{borrow::Cow, fmt::Display};

use itertools::Itertools;
use shell_words::{join, quote};
use which::which;

use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum EscalationMethod {
    #[display(fmt = "sudo")]
    Sudo,
    #[display(fmt = "doas")]
    Doas,
    #[display(fmt = "su")]
    Su,
}

/// Command components, backed by copy-on-write storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command<'a> {
    pub envs: Vec<(Cow<'a, str>, Cow<'a, str>)>,
    pub proc: Cow<'a, str>,
    pub args: Vec<Cow<'a, str>>,
}

impl<'a> Command<'a> {
    pub fn new(proc: impl Into<Cow<'a, str>>) -> Self {
        Self {
            envs: vec![],
            proc: proc.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<Cow<'a, str>>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn into_owned(self) -> Command<'static> {
        Command {
            envs: (self.envs.into_iter())
                .map(|(k, v)| (Cow::Owned(k.into_owned()), Cow::Owned(v.into_owned())))
                .collect(),
            proc: Cow::Owned(self.proc.into_owned()),
            args: (self.args.into_iter())
                .map(|a| Cow::Owned(a.into_owned()))
                .collect(),
        }
    }
}

impl EscalationMethod {
    const ALL: [EscalationMethod; 3] = [Self::Sudo, Self::Doas, Self::Su];

    pub fn detect() -> Result<Self, Error> {
        for m in Self::ALL {
            if m.is_supported() {
                return Ok(m);
            }
        }
        Err(Error::UnixNotDetected)
    }

    fn is_supported(&self) -> bool {
        which(self.cmd_name()).is_ok()
    }

    fn cmd_name(&self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Doas => "doas",
            Self::Su => "su",
        }
    }

    pub fn wrap_command(&self, cmd: &Command) -> Command<'static> {
        let raw = cmd.to_string();

        match self {
            Self::Sudo | Self::Doas => Command {
                envs: vec![],
                proc: self.cmd_name().into(),
                args: vec!["sh".into(), "-c".into(), raw.into()],
            },
            Self::Su => Command {
                envs: vec![],
                proc: "su".into(),
                args: vec![
                    "root".into(),
                    "-c".into(),
                    "sh".into(),
                    "-c".into(),
                    raw.into(),
                ],
            },
        }
    }
}

impl Display for Command<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args = join([&self.proc].into_iter().chain(self.args.iter()));

        if self.envs.is_empty() {
            write!(f, "{args}")
        } else {
            let envs = (self.envs.iter())
                .map(|(k, v)| format!("{}={}", quote(k), quote(v)))
                .join(" ");

            write!(f, "{envs} {args}")
        }
    }
}

impl From<&Command<'_>> for std::process::Command {
    fn from(value: &Command<'_>) -> Self {
        let mut c = std::process::Command::new(value.proc.as_ref());
        c.args(value.args.iter().map(|a| a.as_ref()));
        c.envs(value.envs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())));
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_string_no_env() {
        let command = Command::new("usb-creator")
            .arg("-f")
            .arg("ubuntu")
            .arg("/home/me/My ISOs/ubuntu.iso")
            .arg("/dev/sdb");

        assert_eq!(
            command.to_string(),
            "usb-creator -f ubuntu '/home/me/My ISOs/ubuntu.iso' /dev/sdb"
        )
    }

    #[test]
    fn test_to_string_with_env() {
        let command = Command {
            envs: vec![("LANG".into(), "en US".into())],
            proc: "usb-creator".into(),
            args: vec!["-D".into()],
        };

        assert_eq!(command.to_string(), "LANG='en US' usb-creator -D")
    }

    fn get_test_command() -> Command<'static> {
        Command::new("usb-creator")
            .arg("-u")
            .arg("it's.iso")
            .arg("/dev/sdb")
    }

    #[test]
    fn test_sudo() {
        let result = EscalationMethod::Sudo.wrap_command(&get_test_command());

        assert_eq!(result.proc, "sudo");
        assert_eq!(result.args[..2], ["sh", "-c"]);
        assert_eq!(result.args[2], "usb-creator -u 'it'\\''s.iso' /dev/sdb");
    }

    #[test]
    fn test_doas() {
        let result = EscalationMethod::Doas.wrap_command(&get_test_command());

        assert_eq!(result.proc, "doas");
        assert_eq!(result.args[..2], ["sh", "-c"]);
        assert_eq!(result.args[2], get_test_command().to_string());
    }

    #[test]
    fn test_su() {
        let result = EscalationMethod::Su.wrap_command(&get_test_command());

        assert_eq!(result.proc, "su");
        assert_eq!(result.args[..4], ["root", "-c", "sh", "-c"]);
        assert_eq!(result.args[4], get_test_command().to_string());
    }

    #[test]
    fn into_owned_keeps_contents() {
        let local = String::from("/dev/sdc");
        let cmd = Command::new("usb-creator").arg(local.as_str());
        assert_eq!(cmd.clone().into_owned(), cmd);
    }
}
