/// Command executor: the only sanctioned way probes touch the OS.
///
/// Provides four operations on top of a pluggable [`CommandRunner`]:
///
/// - [`Executor::run_shell`]: run a command line through the host shell.
/// - [`Executor::run_query`]: run an osquery statement; failures yield zero rows.
/// - [`Executor::detect_interpreter`]: locate `pwsh` or `powershell` (Windows only).
/// - [`Executor::run_powershell`]: run a script through the detected interpreter.
///
/// # Timeouts
///
/// Every spawn is bounded by [`ExecutorOptions::command_timeout`]. A command
/// that outlives it is killed and reported as [`CommandError::TimedOut`], which
/// the probes convert to absence like any other failure.
///
/// # Interpreter cache
///
/// Interpreter discovery costs two process spawns, so the result is memoised
/// for the lifetime of the `Executor`. Build one executor at startup and pass
/// it to every probe.
pub mod query;
pub mod scripted;
pub mod system;

pub use query::Row;
pub use scripted::ScriptedRunner;
pub use system::SystemRunner;

use crate::platform::Platform;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default upper bound for a single external command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Binary name of the osquery interactive shell.
const OSQUERY_BIN: &str = "osqueryi";

/// Failure of an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started (binary missing, permission denied).
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// Waiting on a running process failed.
    #[error("failed to wait on `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The process ran and exited unsuccessfully.
    #[error("`{program}` exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    /// The process was killed after exceeding the executor timeout.
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    /// Neither `pwsh` nor `powershell` is available.
    #[error("no scripting shell available: neither pwsh nor powershell was found")]
    NoInterpreter,
}

/// Spawns processes on behalf of the [`Executor`].
///
/// [`SystemRunner`] talks to the real OS; [`ScriptedRunner`] replays canned
/// output so a whole host can be simulated in tests.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning captured stdout on success.
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, CommandError>;

    /// Read a variable from the session environment.
    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Available PowerShell flavour on a Windows host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    /// PowerShell 7+ (`pwsh`). Preferred when both are installed.
    Pwsh,
    /// Legacy Windows PowerShell 5.x (`powershell`).
    WindowsPowerShell,
}

impl Interpreter {
    /// Discovery order: modern first, then legacy.
    pub const SEARCH_ORDER: [Interpreter; 2] = [Interpreter::Pwsh, Interpreter::WindowsPowerShell];

    /// Executable name as resolved through `PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Self::Pwsh => "pwsh",
            Self::WindowsPowerShell => "powershell",
        }
    }
}

/// Tunables for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Upper bound for each spawned process.
    pub command_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Shared command-execution handle. Construct once, reuse for every probe.
pub struct Executor {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
    options: ExecutorOptions,
    interpreter: OnceLock<Option<Interpreter>>,
}

impl Executor {
    pub fn new(
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            platform,
            runner,
            options,
            interpreter: OnceLock::new(),
        }
    }

    /// Executor for the machine this process is running on.
    pub fn system(options: ExecutorOptions) -> Self {
        Self::new(Platform::current(), Arc::new(SystemRunner), options)
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Read a session environment variable through the runner.
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.runner.env_var(key)
    }

    /// Run a program directly, without a shell in between.
    pub fn run_program(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        debug!("exec: {} {:?}", program, args);
        self.runner.run(program, args, self.options.command_timeout)
    }

    /// Run a command line through the host shell (`cmd /C` on Windows,
    /// `sh -c` elsewhere). Pipes and redirections are interpreted by the shell.
    pub fn run_shell(&self, command_line: &str) -> Result<String, CommandError> {
        if self.platform.is_windows() {
            self.run_program("cmd", &["/C", command_line])
        } else {
            self.run_program("sh", &["-c", command_line])
        }
    }

    /// Run an osquery statement and return its rows.
    ///
    /// Never fails: a missing agent, malformed query, non-zero exit, or
    /// unparseable output all yield an empty row set. Callers treat zero rows
    /// as "signal not found".
    pub fn run_query(&self, sql: &str) -> Vec<Row> {
        let stdout = match self.run_program(OSQUERY_BIN, &["--json", sql]) {
            Ok(out) => out,
            Err(e) => {
                warn!("osquery: query {:?} failed: {}", sql, e);
                return Vec::new();
            }
        };

        match query::parse_rows(&stdout) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("osquery: unparseable output for {:?}: {}", sql, e);
                Vec::new()
            }
        }
    }

    /// Locate a PowerShell interpreter, preferring `pwsh`.
    ///
    /// Only meaningful on Windows; every other platform reports `None`.
    /// The answer is computed once per executor.
    pub fn detect_interpreter(&self) -> Option<Interpreter> {
        *self.interpreter.get_or_init(|| {
            if !self.platform.is_windows() {
                debug!("exec: interpreter discovery skipped on {}", self.platform);
                return None;
            }
            let found = Interpreter::SEARCH_ORDER
                .into_iter()
                .find(|interp| self.has_executable(interp.binary()));
            debug!("exec: detected interpreter {:?}", found);
            found
        })
    }

    /// Run a PowerShell script, returning stdout without trailing whitespace.
    ///
    /// Fails fast with [`CommandError::NoInterpreter`] when no interpreter is
    /// installed; nothing is spawned in that case.
    pub fn run_powershell(&self, script: &str) -> Result<String, CommandError> {
        let interp = self.detect_interpreter().ok_or(CommandError::NoInterpreter)?;
        let stdout = self.run_program(
            interp.binary(),
            &["-NoProfile", "-NonInteractive", "-Command", script],
        )?;
        Ok(stdout.trim_end().to_owned())
    }

    /// Ask the Windows shell whether `name` resolves on `PATH`.
    fn has_executable(&self, name: &str) -> bool {
        let probe = format!("where {name} > nul 2> nul && echo true || echo false");
        match self.run_shell(&probe) {
            Ok(out) => out.trim() == "true",
            Err(e) => {
                debug!("exec: lookup of {} failed: {}", name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows_with(runner: ScriptedRunner) -> (Executor, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let exec = Executor::new(Platform::Windows, runner.clone(), ExecutorOptions::default());
        (exec, runner)
    }

    #[test]
    fn pwsh_is_preferred_when_both_exist() {
        let (exec, _) = windows_with(
            ScriptedRunner::new()
                .on("where pwsh", "true\r\n")
                .on("where powershell", "true\r\n"),
        );
        assert_eq!(exec.detect_interpreter(), Some(Interpreter::Pwsh));
    }

    #[test]
    fn legacy_powershell_is_used_when_pwsh_is_missing() {
        let (exec, _) = windows_with(
            ScriptedRunner::new()
                .on("where pwsh", "false\r\n")
                .on("where powershell", "true\r\n"),
        );
        assert_eq!(exec.detect_interpreter(), Some(Interpreter::WindowsPowerShell));
    }

    #[test]
    fn missing_interpreter_fails_fast_without_spawning_a_script() {
        let (exec, runner) = windows_with(
            ScriptedRunner::new()
                .on("where pwsh", "false")
                .on("where powershell", "false")
                .on("Get-Anything", "should never run"),
        );
        let err = exec.run_powershell("Get-Anything").unwrap_err();
        assert!(matches!(err, CommandError::NoInterpreter));
        assert_eq!(runner.call_count("Get-Anything"), 0);
    }

    #[test]
    fn interpreter_discovery_is_memoised() {
        let (exec, runner) = windows_with(
            ScriptedRunner::new()
                .on("where pwsh", "true")
                .on("Write-Output", "ok"),
        );
        exec.run_powershell("Write-Output ok").unwrap();
        exec.run_powershell("Write-Output ok").unwrap();
        assert_eq!(runner.call_count("where pwsh"), 1);
    }

    #[test]
    fn powershell_output_is_trimmed_at_the_end_only() {
        let (exec, _) = windows_with(
            ScriptedRunner::new()
                .on("where pwsh", "true")
                .on("Get-Thing", "  value\r\n\r\n"),
        );
        assert_eq!(exec.run_powershell("Get-Thing").unwrap(), "  value");
    }

    #[test]
    fn interpreter_is_never_detected_off_windows() {
        let runner = Arc::new(ScriptedRunner::new().on("where pwsh", "true"));
        let exec = Executor::new(Platform::Linux, runner.clone(), ExecutorOptions::default());
        assert_eq!(exec.detect_interpreter(), None);
        assert_eq!(runner.call_count("where"), 0);
    }

    #[test]
    fn shell_selection_follows_platform() {
        let runner = Arc::new(ScriptedRunner::new().on("echo hi", "hi\n"));
        let linux = Executor::new(Platform::Linux, runner.clone(), ExecutorOptions::default());
        let windows = Executor::new(Platform::Windows, runner.clone(), ExecutorOptions::default());
        linux.run_shell("echo hi").unwrap();
        windows.run_shell("echo hi").unwrap();
        assert_eq!(runner.calls(), vec!["sh -c echo hi", "cmd /C echo hi"]);
    }

    #[test]
    fn query_failures_become_empty_row_sets() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .fail("FROM broken", 1)
                .on("FROM garbage", "not json"),
        );
        let exec = Executor::new(Platform::MacOs, runner, ExecutorOptions::default());
        assert!(exec.run_query("SELECT * FROM broken;").is_empty());
        assert!(exec.run_query("SELECT * FROM garbage;").is_empty());
        // No rule at all: behaves like osqueryi not being installed.
        assert!(exec.run_query("SELECT * FROM missing;").is_empty());
    }

    #[test]
    fn query_rows_are_returned() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "FROM disk_encryption",
            r#"[{"name":"/dev/disk1s1","encrypted":"1"},{"name":"/dev/disk2","encrypted":"0"}]"#,
        ));
        let exec = Executor::new(Platform::MacOs, runner, ExecutorOptions::default());
        let rows = exec.run_query("SELECT * FROM disk_encryption;");
        assert_eq!(rows.len(), 2);
        assert_eq!(query::field_i64(&rows[0], "encrypted"), Some(1));
    }
}
