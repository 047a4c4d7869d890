/// Platform identity: which operating family the probes are talking to,
/// plus operating system name/version detection for the report.
pub mod info;

pub use info::{detect_system_info, SystemInfo};

/// Operating family of the inspected host.
///
/// Every probe dispatches on this value. It is injected through the
/// [`Executor`](crate::exec::Executor) rather than read from `cfg!` at the
/// call site, so a simulated host can be inspected from any build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
    /// Any other OS. Carries the `std::env::consts::OS` name for logging.
    Unsupported(String),
}

impl Platform {
    /// Identity of the platform this binary was built for.
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name to a platform.
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            other => Self::Unsupported(other.to_owned()),
        }
    }

    /// Human-readable operating system family name.
    pub fn label(&self) -> &str {
        match self {
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Unsupported(name) => name,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_os_names_map_to_families() {
        assert_eq!(Platform::from_os_name("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os_name("windows"), Platform::Windows);
        assert_eq!(Platform::from_os_name("linux"), Platform::Linux);
    }

    #[test]
    fn unknown_os_name_is_unsupported_and_keeps_its_name() {
        let p = Platform::from_os_name("freebsd");
        assert_eq!(p, Platform::Unsupported("freebsd".into()));
        assert_eq!(p.label(), "freebsd");
    }
}
