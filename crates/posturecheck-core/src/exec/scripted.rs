/// Deterministic [`CommandRunner`] that replays canned output.
///
/// Rules are matched against the full command line (`program arg1 arg2 …`
/// joined by single spaces). The first rule whose needle occurs in the
/// command line wins; a command that matches no rule behaves like a missing
/// binary. Used to simulate a macOS, Windows or Linux host from any build
/// target.
///
/// ```ignore
/// let runner = ScriptedRunner::new()
///     .on("systemctl list-units", "clamav-daemon.service loaded active running ClamAV daemon\n")
///     .env("XDG_SESSION_DESKTOP", "ubuntu");
/// ```
use super::{CommandError, CommandRunner};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Exit(i32),
    Hang,
}

#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Reply)>,
    env: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` succeed with `stdout`.
    pub fn on(mut self, needle: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Stdout(stdout.into())));
        self
    }

    /// Commands containing `needle` exit with `code`.
    pub fn fail(mut self, needle: impl Into<String>, code: i32) -> Self {
        self.rules.push((needle.into(), Reply::Exit(code)));
        self
    }

    /// Commands containing `needle` never finish and hit the timeout.
    pub fn hang(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Hang));
        self
    }

    /// Set a session environment variable visible through `env_var`.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of recorded command lines containing `needle`.
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.contains(needle)).count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, CommandError> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().push(line.clone());

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Stdout(out)) => Ok(out),
            Some(Reply::Exit(code)) => Err(CommandError::Failed {
                program: program.to_owned(),
                code: Some(code),
                stderr: String::new(),
            }),
            Some(Reply::Hang) => Err(CommandError::TimedOut {
                program: program.to_owned(),
                timeout,
            }),
            None => Err(CommandError::Spawn {
                program: program.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no scripted reply"),
            }),
        }
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.env.get(key).cloned()
    }
}
