/// Real process runner with a hard timeout.
///
/// `std::process::Child` has no timed wait, so the runner polls
/// `try_wait` every [`POLL_INTERVAL`] until the child exits or the deadline
/// passes. stdout and stderr are drained on helper threads while polling so a
/// chatty child can never block on a full pipe.
///
/// On expiry the child is killed and reaped. Grandchildren spawned through a
/// shell may keep the pipes open after the child exits, so collecting the
/// output is bounded by the same deadline; past it the drain threads are
/// detached and exit when the last writer closes.
use super::{CommandError, CommandRunner};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a running child is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Spawns commands on the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, CommandError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console_window(&mut command);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: program.to_owned(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let deadline = started + timeout;

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    let _ = child.kill();
                    return Err(CommandError::Wait {
                        program: program.to_owned(),
                        source,
                    });
                }
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                warn!("exec: `{}` killed after {:?}", program, timeout);
                return Err(CommandError::TimedOut {
                    program: program.to_owned(),
                    timeout,
                });
            }

            thread::sleep(POLL_INTERVAL);
        };

        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
        else {
            warn!("exec: `{}` output still open after {:?}", program, timeout);
            return Err(CommandError::TimedOut {
                program: program.to_owned(),
                timeout,
            });
        };
        debug!(
            "exec: `{}` finished with {} in {} ms",
            program,
            status,
            started.elapsed().as_millis()
        );

        if status.success() {
            Ok(String::from_utf8_lossy(&stdout).into_owned())
        } else {
            Err(CommandError::Failed {
                program: program.to_owned(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_owned(),
            })
        }
    }
}

/// Read a pipe to the end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<Vec<u8>>> {
    let mut pipe = pipe?;
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("posturecheck-pipe".to_owned())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        })
        .ok()?;
    Some(rx)
}

/// Drained bytes, or `None` if the pipe is still open at `deadline`.
fn collect(pipe: Option<Receiver<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    let Some(rx) = pipe else {
        return Some(Vec::new());
    };
    match rx.recv_deadline(deadline) {
        Ok(buf) => Some(buf),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(Vec::new()),
    }
}

/// Stop console hosts (`cmd`, `powershell`) from flashing a window when the
/// parent process has none.
#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    use windows::Win32::System::Threading::CREATE_NO_WINDOW;

    command.creation_flags(CREATE_NO_WINDOW.0);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}
