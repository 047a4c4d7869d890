/// Screen-lock timeout detection.
///
/// No single OS setting describes "how long until this machine locks", so
/// each platform combines several knobs into one number of minutes:
///
/// - **macOS:** the largest of the screensaver idle time and the AC/battery
///   display-sleep timers, plus the extra delay `sysadminctl` reports between
///   sleep and lock.
/// - **Windows:** the display-off (`VIDEOIDLE`) timer of the active power
///   scheme, taking the longer of AC and DC when the machine has a battery.
///   The `powercfg` labels are localised, so the UI language selects them.
/// - **Linux:** GNOME-family `gsettings`: idle delay plus lock delay, when
///   screensaver locking is enabled.
///
/// The parsing and combination steps are exposed as pure functions so they
/// can be checked against captured command output.
use super::absent;
use crate::exec::Executor;
use crate::platform::Platform;
use tracing::{debug, info, warn};

// ── macOS ───────────────────────────────────────────────────────────────────

const MACOS_LOCK_STATUS: &str = "sysadminctl -screenLock status 2>&1";
const MACOS_SCREENSAVER_IDLE: &str = "defaults -currentHost read com.apple.screensaver idleTime";
const MACOS_POWER_PROFILES: &str = "pmset -g custom";

/// Extra time between the display idling and the lock engaging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockDelay {
    Immediate,
    Seconds(u64),
}

impl LockDelay {
    fn minutes(self) -> f64 {
        match self {
            Self::Immediate => 0.0,
            Self::Seconds(s) => s as f64 / 60.0,
        }
    }
}

/// `pmset -g custom` power source sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Ac,
    Battery,
}

impl PowerSource {
    fn section_header(self) -> &'static str {
        match self {
            Self::Ac => "AC Power",
            Self::Battery => "Battery Power",
        }
    }
}

/// True when `sysadminctl` reports that the screen never locks.
pub fn lock_disabled(status: &str) -> bool {
    status.contains("screenLock is off")
}

/// Extract the lock delay from `sysadminctl -screenLock status` output.
pub fn parse_lock_delay(status: &str) -> Option<LockDelay> {
    if status.contains("screenLock delay is immediate") {
        return Some(LockDelay::Immediate);
    }
    let (_, rest) = status.split_once("screenLock delay is ")?;
    let mut words = rest.split_whitespace();
    let seconds: u64 = words.next()?.parse().ok()?;
    words
        .next()
        .filter(|unit| unit.starts_with("second"))
        .map(|_| LockDelay::Seconds(seconds))
}

/// `displaysleep` minutes for one power source of a `pmset -g custom` dump.
pub fn parse_display_sleep(profiles: &str, source: PowerSource) -> Option<f64> {
    let mut in_section = false;
    for line in profiles.lines() {
        let trimmed = line.trim();
        if trimmed.ends_with(':') && trimmed.contains("Power") {
            in_section = trimmed.starts_with(source.section_header());
            continue;
        }
        if !in_section {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        if fields.next() == Some("displaysleep") {
            return fields.next()?.parse().ok();
        }
    }
    None
}

/// Combine the macOS idle candidates (minutes) with the lock delay.
///
/// Missing candidates are ignored. A baseline of zero means nothing ever
/// idles the screen, which is reported as absence.
pub fn combine_macos(candidates: &[Option<f64>], delay: LockDelay) -> Option<f64> {
    let baseline = candidates
        .iter()
        .flatten()
        .copied()
        .filter(|m| m.is_finite())
        .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))))?;
    if baseline <= 0.0 {
        return None;
    }
    Some(baseline + delay.minutes())
}

fn detect_macos(exec: &Executor) -> Option<f64> {
    let status = match exec.run_shell(MACOS_LOCK_STATUS) {
        Ok(out) => out.trim().to_owned(),
        Err(e) => return absent("screen_lock", e),
    };
    if lock_disabled(&status) {
        debug!("screen_lock: sysadminctl reports screen lock off");
        return None;
    }

    let screensaver = exec
        .run_shell(MACOS_SCREENSAVER_IDLE)
        .ok()
        .and_then(|out| out.trim().parse::<f64>().ok())
        .map(|secs| secs / 60.0);
    let (ac, battery) = match exec.run_shell(MACOS_POWER_PROFILES) {
        Ok(profiles) => (
            parse_display_sleep(&profiles, PowerSource::Ac),
            parse_display_sleep(&profiles, PowerSource::Battery),
        ),
        Err(e) => {
            debug!("screen_lock: pmset failed: {}", e);
            (None, None)
        }
    };
    debug!(
        "screen_lock: screensaver={:?} ac={:?} battery={:?}",
        screensaver, ac, battery
    );

    let Some(delay) = parse_lock_delay(&status) else {
        warn!("screen_lock: unrecognised sysadminctl status {:?}", status);
        return None;
    };
    combine_macos(&[screensaver, ac, battery], delay)
}

// ── Windows ─────────────────────────────────────────────────────────────────

const WINDOWS_LANGUAGE: &str = "(Get-WinUserLanguageList)[0].LanguageTag";
const WINDOWS_VIDEO_IDLE: &str = "powercfg /q SCHEME_CURRENT SUB_VIDEO VIDEOIDLE";
const WINDOWS_HAS_BATTERY: &str =
    "[bool](Get-CimInstance -ClassName Win32_Battery -ErrorAction SilentlyContinue)";

/// UI languages whose `powercfg` labels are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLanguage {
    English,
    Spanish,
}

impl UiLanguage {
    /// Map a language tag (`es-ES`) or name (`Spanish`, `Español`).
    /// Anything unrecognised is treated as English.
    pub fn from_tag(tag: &str) -> Self {
        let lower = tag.trim().to_lowercase();
        let primary = lower.split(['-', '_', ' ']).next().unwrap_or_default();
        match primary {
            "es" | "spanish" | "español" | "espanol" => Self::Spanish,
            _ => Self::English,
        }
    }

    pub fn ac_label(self) -> &'static str {
        match self {
            Self::English => "Current AC Power Setting Index",
            Self::Spanish => "Índice de configuración de corriente alterna actual",
        }
    }

    pub fn dc_label(self) -> &'static str {
        match self {
            Self::English => "Current DC Power Setting Index",
            Self::Spanish => "Índice de configuración de corriente continua actual",
        }
    }
}

/// Raw `VIDEOIDLE` indexes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoIdle {
    pub ac: u64,
    pub dc: Option<u64>,
}

/// Parse a `0x…` hexadecimal setting index.
pub fn parse_hex_index(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u64::from_str_radix(digits, 16).ok()
}

fn labelled_index(report: &str, label: &str) -> Option<u64> {
    report
        .lines()
        .find(|line| line.contains(label))
        .and_then(|line| line.split_once(':'))
        .and_then(|(_, value)| parse_hex_index(value))
}

/// Parse the `powercfg /q … VIDEOIDLE` report.
///
/// Labels for `language` are tried first. For locales without known labels
/// the last two hexadecimal lines of the block are taken as AC then DC,
/// which is the order `powercfg` always prints them in.
pub fn parse_video_idle(report: &str, language: UiLanguage) -> Option<VideoIdle> {
    if let Some(ac) = labelled_index(report, language.ac_label()) {
        return Some(VideoIdle {
            ac,
            dc: labelled_index(report, language.dc_label()),
        });
    }

    let hex_values: Vec<u64> = report
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(_, value)| value.trim())
        .filter(|value| value.starts_with("0x") || value.starts_with("0X"))
        .filter_map(parse_hex_index)
        .collect();
    match hex_values.as_slice() {
        [.., ac, dc] if hex_values.len() >= 4 => Some(VideoIdle {
            ac: *ac,
            dc: Some(*dc),
        }),
        _ => None,
    }
}

/// Effective Windows timeout in minutes. A raw value of zero is "never".
pub fn windows_timeout_minutes(idle: VideoIdle, has_battery: bool) -> Option<f64> {
    let seconds = if has_battery {
        idle.ac.max(idle.dc.unwrap_or(0))
    } else {
        idle.ac
    };
    if seconds == 0 {
        return None;
    }
    Some(seconds as f64 / 60.0)
}

fn detect_windows(exec: &Executor) -> Option<f64> {
    let language = match exec.run_powershell(WINDOWS_LANGUAGE) {
        Ok(tag) => UiLanguage::from_tag(&tag),
        Err(e) => {
            debug!("screen_lock: UI language unavailable ({}), assuming English", e);
            UiLanguage::English
        }
    };

    let report = match exec.run_powershell(WINDOWS_VIDEO_IDLE) {
        Ok(out) => out,
        Err(e) => return absent("screen_lock", e),
    };
    let Some(idle) = parse_video_idle(&report, language) else {
        warn!("screen_lock: no VIDEOIDLE index in powercfg output ({:?})", language);
        return None;
    };

    let has_battery = exec
        .run_powershell(WINDOWS_HAS_BATTERY)
        .map(|out| out.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    debug!("screen_lock: {:?} battery={}", idle, has_battery);

    windows_timeout_minutes(idle, has_battery)
}

// ── Linux ───────────────────────────────────────────────────────────────────

const LINUX_DESKTOP_VAR: &str = "XDG_SESSION_DESKTOP";
const LINUX_SESSION_BINARIES: &str = "ls /usr/bin/*session";

/// Fold a session desktop name onto the settings schema it uses.
///
/// Ubuntu ships GNOME under its own name; `awesome` installed next to GNOME
/// runs with GNOME's screensaver settings.
pub fn fold_desktop(raw: &str, gnome_session_installed: bool) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.as_str() {
        "ubuntu" => "gnome".to_owned(),
        "awesome" if gnome_session_installed => "gnome".to_owned(),
        _ => lower,
    }
}

/// Read the value of a `gsettings get` for an unsigned integer key
/// (`uint32 300`).
pub fn parse_gsettings_uint(output: &str) -> Option<u64> {
    output.split_whitespace().last()?.parse().ok()
}

/// Linux lock timeout: idle delay plus lock delay. An idle delay of zero
/// means the session never goes idle.
pub fn linux_lock_minutes(idle_delay_secs: u64, lock_delay_secs: u64) -> Option<f64> {
    if idle_delay_secs == 0 {
        return None;
    }
    Some((idle_delay_secs + lock_delay_secs) as f64 / 60.0)
}

fn is_schema_component(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn linux_desktop(exec: &Executor) -> Option<String> {
    let raw = exec.env_var(LINUX_DESKTOP_VAR).filter(|d| !d.trim().is_empty());
    let Some(raw) = raw else {
        debug!("screen_lock: {} not set", LINUX_DESKTOP_VAR);
        return None;
    };

    let gnome_installed = raw.trim().eq_ignore_ascii_case("awesome")
        && exec
            .run_shell(LINUX_SESSION_BINARIES)
            .map(|listing| listing.contains("gnome"))
            .unwrap_or(false);
    let desktop = fold_desktop(&raw, gnome_installed);

    // The name is interpolated into a shell command line.
    if !is_schema_component(&desktop) {
        warn!("screen_lock: refusing desktop name {:?}", desktop);
        return None;
    }
    Some(desktop)
}

fn detect_linux(exec: &Executor) -> Option<f64> {
    let desktop = linux_desktop(exec)?;
    let gsettings =
        |key: &str| exec.run_shell(&format!("gsettings get org.{desktop}.desktop.{key}"));

    let enabled = match gsettings("screensaver lock-enabled") {
        Ok(out) => out.trim() == "true",
        Err(e) => return absent("screen_lock", e),
    };
    if !enabled {
        debug!("screen_lock: {} screensaver lock disabled", desktop);
        return None;
    }

    let idle = match gsettings("session idle-delay") {
        Ok(out) => match parse_gsettings_uint(&out) {
            Some(secs) => secs,
            None => {
                warn!("screen_lock: unreadable idle-delay {:?}", out.trim());
                return None;
            }
        },
        Err(e) => return absent("screen_lock", e),
    };
    let lock = gsettings("screensaver lock-delay")
        .ok()
        .and_then(|out| parse_gsettings_uint(&out))
        .unwrap_or(0);
    debug!("screen_lock: {} idle={}s lock={}s", desktop, idle, lock);

    linux_lock_minutes(idle, lock)
}

// ── Dispatch ────────────────────────────────────────────────────────────────

/// Detect the effective idle-to-lock timeout in minutes.
pub fn detect_screen_lock_minutes(exec: &Executor) -> Option<f64> {
    let found = match exec.platform() {
        Platform::MacOs => detect_macos(exec),
        Platform::Windows => detect_windows(exec),
        Platform::Linux => detect_linux(exec),
        Platform::Unsupported(os) => {
            debug!("screen_lock: unsupported platform {}", os);
            None
        }
    };
    info!("screen_lock: {:?} minutes", found);
    found
}
