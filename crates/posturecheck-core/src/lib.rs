/// PostureCheck Core: security posture probes, command execution and
/// persistent application state.
///
/// This crate contains all detection logic with zero CLI dependencies.
/// It is designed to be reusable across different frontends (CLI, tray, service).
///
/// # Modules
///
/// - [`platform`]: Host OS identity and operating system name/version.
/// - [`exec`]: Timeout-bounded process execution used by every probe,
///   plus the scripted runner for simulated hosts.
/// - [`probes`]: Antivirus, disk encryption and screen-lock detection.
/// - [`report`]: Parallel scan orchestration and the normalised `SecurityReport`.
/// - [`config`]: Debounced, crash-safe persistence of application state.
pub mod config;
pub mod exec;
pub mod platform;
pub mod probes;
pub mod report;
