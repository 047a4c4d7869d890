/// Antivirus detection.
///
/// - **macOS:** built-in XProtect/MRT signals through osquery. Third-party
///   products are not probed.
/// - **Windows:** products registered with Security Center (`root\SecurityCenter2`).
/// - **Linux:** running systemd services from well-known AV vendors.
use super::{absent, LIST_SEPARATOR};
use crate::exec::Executor;
use crate::platform::Platform;
use tracing::{debug, info};

/// Label reported when any macOS built-in protection signal is present.
pub const MACOS_BUILTIN_LABEL: &str = "XProtect/MRT (Built-in macOS protection)";

/// osquery statements checked in order; the first with rows wins.
const MACOS_QUERIES: [&str; 4] = [
    "SELECT * FROM xprotect_entries;",
    "SELECT * FROM xprotect_meta;",
    "SELECT * FROM launchd WHERE name LIKE '%com.apple.MRT%' OR name LIKE '%com.apple.XProtect%';",
    "SELECT * FROM processes WHERE name LIKE '%MRT%' OR name LIKE '%XProtect%';",
];

/// Lower-case vendor tokens matched against running service lines.
pub const LINUX_AV_TOKENS: [&str; 7] = [
    "clamav",
    "sophos",
    "eset",
    "comodo",
    "avg",
    "avast",
    "bitdefender",
];

const WINDOWS_WMIC: &str =
    r"wmic /node:localhost /namespace:\\root\SecurityCenter2 path AntiVirusProduct Get DisplayName";
const WINDOWS_CIM: &str =
    "Get-CimInstance -Namespace root/SecurityCenter2 -ClassName AntiVirusProduct | ForEach-Object { $_.displayName }";

const LINUX_RUNNING_SERVICES: &str =
    "systemctl list-units --type=service --state=running --no-pager --no-legend --plain";

/// Number of leading `systemctl list-units` columns (unit, load, active, sub).
const SERVICE_METADATA_COLUMNS: usize = 4;

/// Detect active antivirus protection on the host.
pub fn detect_antivirus(exec: &Executor) -> Option<String> {
    let found = match exec.platform() {
        Platform::MacOs => detect_macos(exec),
        Platform::Windows => detect_windows(exec),
        Platform::Linux => detect_linux(exec),
        Platform::Unsupported(os) => {
            debug!("antivirus: unsupported platform {}", os);
            None
        }
    };
    info!("antivirus: {:?}", found);
    found
}

fn detect_macos(exec: &Executor) -> Option<String> {
    MACOS_QUERIES
        .iter()
        .any(|q| !exec.run_query(q).is_empty())
        .then(|| MACOS_BUILTIN_LABEL.to_owned())
}

fn detect_windows(exec: &Executor) -> Option<String> {
    let listing = match exec.run_powershell(WINDOWS_WMIC) {
        Ok(out) => out,
        Err(wmic_err) => {
            // wmic is gone from recent Windows builds; ask CIM for the same class.
            debug!("antivirus: wmic unavailable ({}), trying CIM", wmic_err);
            match exec.run_powershell(WINDOWS_CIM) {
                Ok(out) => out,
                Err(e) => return absent("antivirus", e),
            }
        }
    };
    parse_display_names(&listing)
}

fn detect_linux(exec: &Executor) -> Option<String> {
    match exec.run_shell(LINUX_RUNNING_SERVICES) {
        Ok(listing) => parse_running_services(&listing),
        Err(e) => absent("antivirus", e),
    }
}

/// Join Security Center display names, dropping the `DisplayName` header
/// echo and blank lines.
pub fn parse_display_names(listing: &str) -> Option<String> {
    let names: Vec<&str> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("displayname"))
        .collect();
    join_non_empty(names)
}

/// Pick AV vendor services out of a `systemctl list-units` listing and
/// return their descriptions.
pub fn parse_running_services(listing: &str) -> Option<String> {
    let matches: Vec<String> = listing
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            LINUX_AV_TOKENS.iter().any(|token| lower.contains(token))
        })
        .filter_map(service_description)
        .collect();
    join_non_empty(matches)
}

/// Strip the unit/load/active/sub columns. Falls back to the unit name when
/// the unit has no description.
fn service_description(line: &str) -> Option<String> {
    let mut columns = line.split_whitespace();
    // Failed units are prefixed with a status bullet in some systemd versions.
    let unit = columns.by_ref().find(|c| *c != "●" && *c != "*")?;
    let description = columns
        .skip(SERVICE_METADATA_COLUMNS - 1)
        .collect::<Vec<_>>()
        .join(" ");
    if description.is_empty() {
        Some(unit.to_owned())
    } else {
        Some(description)
    }
}

fn join_non_empty<S: AsRef<str>>(items: Vec<S>) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecutorOptions, ScriptedRunner};
    use std::sync::Arc;

    fn host(platform: Platform, runner: ScriptedRunner) -> Executor {
        Executor::new(platform, Arc::new(runner), ExecutorOptions::default())
    }

    #[test]
    fn linux_service_listing_timeout_is_absent() {
        let exec = host(Platform::Linux, ScriptedRunner::new().hang("systemctl"));
        assert_eq!(detect_antivirus(&exec), None);
    }

    #[test]
    fn display_name_header_and_blanks_are_dropped() {
        let listing = "DisplayName\r\nWindows Defender\r\n\r\nESET Security\r\n";
        assert_eq!(
            parse_display_names(listing).as_deref(),
            Some("Windows Defender, ESET Security")
        );
    }

    #[test]
    fn header_only_listing_is_absent() {
        assert_eq!(parse_display_names("DisplayName\r\n\r\n"), None);
        assert_eq!(parse_display_names(""), None);
    }

    #[test]
    fn service_metadata_columns_are_stripped() {
        let listing = "\
clamav-daemon.service      loaded active running Clam AntiVirus userspace daemon
cron.service               loaded active running Regular background program processing daemon
";
        assert_eq!(
            parse_running_services(listing).as_deref(),
            Some("Clam AntiVirus userspace daemon")
        );
    }

    #[test]
    fn several_vendor_services_are_joined() {
        let listing = "\
clamav-freshclam.service loaded active running ClamAV virus database updater
sophos-spl.service       loaded active running Sophos Linux Protection
";
        assert_eq!(
            parse_running_services(listing).as_deref(),
            Some("ClamAV virus database updater, Sophos Linux Protection")
        );
    }

    #[test]
    fn unit_without_description_reports_its_name() {
        let listing = "bitdefender.service loaded active running\n";
        assert_eq!(
            parse_running_services(listing).as_deref(),
            Some("bitdefender.service")
        );
    }

    #[test]
    fn no_vendor_service_is_absent() {
        let listing = "ssh.service loaded active running OpenBSD Secure Shell server\n";
        assert_eq!(parse_running_services(listing), None);
    }

    #[test]
    fn macos_short_circuits_on_first_query_with_rows() {
        let runner = ScriptedRunner::new()
            .on("FROM xprotect_entries", "[]")
            .on("FROM xprotect_meta", r#"[{"identifier":"com.apple.XProtect"}]"#)
            .on("FROM launchd", r#"[{"name":"com.apple.MRT"}]"#);
        let runner = Arc::new(runner);
        let exec = Executor::new(Platform::MacOs, runner.clone(), ExecutorOptions::default());
        assert_eq!(detect_antivirus(&exec).as_deref(), Some(MACOS_BUILTIN_LABEL));
        assert_eq!(runner.call_count("FROM launchd"), 0);
    }

    #[test]
    fn macos_without_any_signal_is_absent() {
        let exec = host(Platform::MacOs, ScriptedRunner::new().on("osqueryi", "[]"));
        assert_eq!(detect_antivirus(&exec), None);
    }

    #[test]
    fn windows_falls_back_to_cim_when_wmic_fails() {
        let exec = host(
            Platform::Windows,
            ScriptedRunner::new()
                .on("where pwsh", "true")
                .fail("wmic", 1)
                .on("Get-CimInstance", "Windows Defender\r\n"),
        );
        assert_eq!(detect_antivirus(&exec).as_deref(), Some("Windows Defender"));
    }

    #[test]
    fn windows_security_center_failure_is_absent() {
        let exec = host(
            Platform::Windows,
            ScriptedRunner::new()
                .on("where pwsh", "true")
                .fail("SecurityCenter2", 1),
        );
        assert_eq!(detect_antivirus(&exec), None);
    }

    #[test]
    fn windows_without_powershell_is_absent() {
        let exec = host(
            Platform::Windows,
            ScriptedRunner::new().on("where", "false"),
        );
        assert_eq!(detect_antivirus(&exec), None);
    }

    #[test]
    fn unsupported_platform_is_absent() {
        let exec = host(Platform::Unsupported("haiku".into()), ScriptedRunner::new());
        assert_eq!(detect_antivirus(&exec), None);
    }
}
