/// Operating system name and version for the security report.
use super::Platform;
use crate::exec::Executor;
use tracing::debug;

/// Placeholder when a version cannot be determined.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Operating system identity as shown in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    /// Product name, e.g. "macOS", "Windows", "Ubuntu".
    pub operating_system: String,
    /// Product version, e.g. "14.4.1", "10.0.22631.3296", "22.04".
    pub os_version: String,
}

/// Detect the operating system name and version. Never fails; missing
/// pieces fall back to the platform label and [`UNKNOWN_VERSION`].
pub fn detect_system_info(exec: &Executor) -> SystemInfo {
    let platform = exec.platform();
    let fallback = || SystemInfo {
        operating_system: platform.label().to_owned(),
        os_version: UNKNOWN_VERSION.to_owned(),
    };

    let info = match platform {
        Platform::MacOs => exec
            .run_program("sw_vers", &["-productVersion"])
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .map(|os_version| SystemInfo {
                operating_system: platform.label().to_owned(),
                os_version,
            }),
        Platform::Windows => exec
            .run_shell("ver")
            .ok()
            .and_then(|out| parse_windows_ver(&out))
            .map(|os_version| SystemInfo {
                operating_system: platform.label().to_owned(),
                os_version,
            }),
        Platform::Linux => linux_info(exec),
        Platform::Unsupported(_) => None,
    };

    let info = info.unwrap_or_else(fallback);
    debug!("platform: {} {}", info.operating_system, info.os_version);
    info
}

fn linux_info(exec: &Executor) -> Option<SystemInfo> {
    if let Some(info) = exec
        .run_shell("cat /etc/os-release")
        .ok()
        .and_then(|text| parse_os_release(&text))
    {
        return Some(info);
    }
    // No os-release: report the kernel release instead.
    let kernel = exec.run_program("uname", &["-r"]).ok()?;
    Some(SystemInfo {
        operating_system: Platform::Linux.label().to_owned(),
        os_version: kernel.trim().to_owned(),
    })
}

/// Extract `10.0.22631.3296` from `Microsoft Windows [Version 10.0.22631.3296]`.
pub fn parse_windows_ver(output: &str) -> Option<String> {
    let start = output.find('[')? + 1;
    let end = start + output[start..].find(']')?;
    let inside = output[start..end].trim();
    let version = inside.rsplit(' ').next()?.trim();
    (!version.is_empty()).then(|| version.to_owned())
}

/// Read `NAME` and `VERSION_ID` from an os-release file.
pub fn parse_os_release(text: &str) -> Option<SystemInfo> {
    let value = |key: &str| {
        text.lines()
            .filter_map(|line| line.split_once('='))
            .find(|(k, _)| k.trim() == key)
            .map(|(_, v)| v.trim().trim_matches('"').to_owned())
            .filter(|v| !v.is_empty())
    };
    let name = value("NAME")?;
    let version = value("VERSION_ID").unwrap_or_else(|| UNKNOWN_VERSION.to_owned());
    Some(SystemInfo {
        operating_system: name,
        os_version: version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecutorOptions, ScriptedRunner};
    use std::sync::Arc;

    #[test]
    fn windows_ver_banner_is_parsed() {
        assert_eq!(
            parse_windows_ver("\r\nMicrosoft Windows [Version 10.0.22631.3296]\r\n").as_deref(),
            Some("10.0.22631.3296")
        );
        // Localised banners keep the bracketed version.
        assert_eq!(
            parse_windows_ver("Microsoft Windows [Versión 10.0.19045.4170]").as_deref(),
            Some("10.0.19045.4170")
        );
        assert_eq!(parse_windows_ver("garbage"), None);
    }

    #[test]
    fn os_release_name_and_version_are_read() {
        let text = "PRETTY_NAME=\"Ubuntu 22.04.4 LTS\"\nNAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\n";
        assert_eq!(
            parse_os_release(text),
            Some(SystemInfo {
                operating_system: "Ubuntu".into(),
                os_version: "22.04".into(),
            })
        );
    }

    #[test]
    fn rolling_release_without_version_id_is_unknown() {
        let info = parse_os_release("NAME=\"Arch Linux\"\nID=arch\n").unwrap();
        assert_eq!(info.os_version, UNKNOWN_VERSION);
    }

    #[test]
    fn linux_falls_back_to_kernel_release() {
        let runner = ScriptedRunner::new().on("uname -r", "6.8.0-31-generic\n");
        let exec = Executor::new(Platform::Linux, Arc::new(runner), ExecutorOptions::default());
        let info = detect_system_info(&exec);
        assert_eq!(info.operating_system, "Linux");
        assert_eq!(info.os_version, "6.8.0-31-generic");
    }

    #[test]
    fn unsupported_platform_reports_its_name() {
        let exec = Executor::new(
            Platform::Unsupported("netbsd".into()),
            Arc::new(ScriptedRunner::new()),
            ExecutorOptions::default(),
        );
        let info = detect_system_info(&exec);
        assert_eq!(info.operating_system, "netbsd");
        assert_eq!(info.os_version, UNKNOWN_VERSION);
    }
}
