/// Disk encryption detection.
///
/// - **macOS:** FileVault via the osquery `disk_encryption` table.
/// - **Windows:** BitLocker protection status of `C:` via the
///   `System.Volume.BitLockerProtection` shell property.
/// - **Linux:** an `ecryptfs` home-directory mount first, then a `crypt`
///   (LUKS/dm-crypt) block device.
use super::absent;
use crate::exec::{query, Executor};
use crate::platform::Platform;
use tracing::{debug, info};

const MACOS_QUERY: &str = "SELECT * FROM disk_encryption;";

const WINDOWS_BITLOCKER_PROPERTY: &str = "(New-Object -ComObject Shell.Application).NameSpace('C:').Self.ExtendedProperty('System.Volume.BitLockerProtection')";

/// Encryption mechanism found on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionKind {
    /// macOS full-disk encryption.
    FileVault,
    /// BitLocker with the whole volume encrypted.
    BitLocker,
    /// BitLocker with only the used space encrypted.
    BitLockerUsedSpaceOnly,
    /// Stacked home-directory encryption on Linux.
    Ecryptfs,
    /// dm-crypt/LUKS block device on Linux.
    Luks,
}

impl EncryptionKind {
    /// Name reported in the security report.
    pub fn label(self) -> &'static str {
        match self {
            Self::FileVault => "FileVault",
            Self::BitLocker => "BitLocker",
            Self::BitLockerUsedSpaceOnly => "BitLocker: only space used",
            Self::Ecryptfs => "ecryptfs",
            Self::Luks => "LUKS",
        }
    }
}

impl std::fmt::Display for EncryptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Values of the `System.Volume.BitLockerProtection` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitLockerStatus {
    Unencryptable = 0,
    Encrypted = 1,
    NotEncrypted = 2,
    EncryptionInProgress = 3,
    EncryptedUsedSpaceOnly = 7,
}

impl BitLockerStatus {
    /// Map a raw status code. Codes outside the table are `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unencryptable),
            1 => Some(Self::Encrypted),
            2 => Some(Self::NotEncrypted),
            3 => Some(Self::EncryptionInProgress),
            7 => Some(Self::EncryptedUsedSpaceOnly),
            _ => None,
        }
    }

    /// Only a completed encryption counts as protected.
    pub fn encryption_kind(self) -> Option<EncryptionKind> {
        match self {
            Self::Encrypted => Some(EncryptionKind::BitLocker),
            Self::EncryptedUsedSpaceOnly => Some(EncryptionKind::BitLockerUsedSpaceOnly),
            Self::Unencryptable | Self::NotEncrypted | Self::EncryptionInProgress => None,
        }
    }
}

/// Map the raw shell-property output to an encryption kind.
pub fn bitlocker_kind(raw: &str) -> Option<EncryptionKind> {
    let code: i64 = raw.trim().parse().ok()?;
    BitLockerStatus::from_code(code)?.encryption_kind()
}

/// Detect disk encryption on the host.
///
/// Unsupported platforms report absence rather than an error, like every
/// other probe.
pub fn detect_disk_encryption(exec: &Executor) -> Option<EncryptionKind> {
    let found = match exec.platform() {
        Platform::MacOs => detect_macos(exec),
        Platform::Windows => detect_windows(exec),
        Platform::Linux => detect_linux(exec),
        Platform::Unsupported(os) => {
            debug!("encryption: unsupported platform {}", os);
            None
        }
    };
    info!("encryption: {:?}", found);
    found
}

fn detect_macos(exec: &Executor) -> Option<EncryptionKind> {
    exec.run_query(MACOS_QUERY)
        .iter()
        .any(|row| query::field_i64(row, "encrypted") == Some(1))
        .then_some(EncryptionKind::FileVault)
}

fn detect_windows(exec: &Executor) -> Option<EncryptionKind> {
    match exec.run_powershell(WINDOWS_BITLOCKER_PROPERTY) {
        Ok(raw) => {
            debug!("encryption: BitLocker protection status {:?}", raw);
            bitlocker_kind(&raw)
        }
        Err(e) => absent("encryption", e),
    }
}

fn detect_linux(exec: &Executor) -> Option<EncryptionKind> {
    // The mount check wins even when a LUKS device also exists.
    match exec.run_shell("mount") {
        Ok(mounts) if has_ecryptfs_mount(&mounts) => return Some(EncryptionKind::Ecryptfs),
        Ok(_) => {}
        Err(e) => debug!("encryption: mount listing failed: {}", e),
    }

    match exec.run_shell("lsblk -o TYPE") {
        Ok(types) if has_crypt_device(&types) => Some(EncryptionKind::Luks),
        Ok(_) => None,
        Err(e) => absent("encryption", e),
    }
}

/// True if any mount line mentions ecryptfs.
pub fn has_ecryptfs_mount(mounts: &str) -> bool {
    mounts.lines().any(|line| line.contains("ecryptfs"))
}

/// True if `lsblk -o TYPE` lists a `crypt` device.
pub fn has_crypt_device(types: &str) -> bool {
    types.lines().any(|line| line.trim() == "crypt")
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
    fn bitlocker_codes_map_through_the_closed_table() {
        assert_eq!(bitlocker_kind("1"), Some(EncryptionKind::BitLocker));
        assert_eq!(bitlocker_kind("7"), Some(EncryptionKind::BitLockerUsedSpaceOnly));
        for code in ["0", "2", "3", "4", "42", "-1", "", "not a number"] {
            assert_eq!(bitlocker_kind(code), None, "code {code:?} must be absent");
        }
    }

    #[test]
    fn bitlocker_status_table_is_exhaustive_for_known_codes() {
        let known = [0, 1, 2, 3, 7];
        for code in known {
            assert!(BitLockerStatus::from_code(code).is_some());
        }
        assert_eq!(BitLockerStatus::from_code(5), None);
    }

    #[test]
    fn lsblk_crypt_type_is_recognised() {
        let types = "TYPE\ndisk\npart\npart\ncrypt\nlvm\n";
        assert!(has_crypt_device(types));
        assert!(!has_crypt_device("TYPE\ndisk\npart\nrom\n"));
    }

    #[test]
    fn macos_filevault_requires_an_encrypted_row() {
        let on = host(
            Platform::MacOs,
            ScriptedRunner::new().on(
                "disk_encryption",
                r#"[{"name":"/dev/disk3s1","encrypted":"0"},{"name":"/dev/disk3s5","encrypted":"1"}]"#,
            ),
        );
        assert_eq!(detect_disk_encryption(&on), Some(EncryptionKind::FileVault));

        let off = host(
            Platform::MacOs,
            ScriptedRunner::new()
                .on("disk_encryption", r#"[{"name":"/dev/disk3s1","encrypted":"0"}]"#),
        );
        assert_eq!(detect_disk_encryption(&off), None);
    }

    #[test]
    fn windows_reads_the_protection_status_of_c() {
        let exec = host(
            Platform::Windows,
            ScriptedRunner::new()
                .on("where pwsh", "true")
                .on("BitLockerProtection", "7\r\n"),
        );
        assert_eq!(
            detect_disk_encryption(&exec),
            Some(EncryptionKind::BitLockerUsedSpaceOnly)
        );
    }

    #[test]
    fn windows_com_failure_is_absent() {
        let exec = host(
            Platform::Windows,
            ScriptedRunner::new()
                .on("where pwsh", "true")
                .fail("BitLockerProtection", 1),
        );
        assert_eq!(detect_disk_encryption(&exec), None);
    }

    #[test]
    fn linux_falls_through_to_block_devices() {
        let exec = host(
            Platform::Linux,
            ScriptedRunner::new()
                .on("sh -c mount", "/dev/sda1 on / type ext4 (rw,relatime)\n")
                .on("lsblk", "TYPE\ndisk\npart\ncrypt\n"),
        );
        assert_eq!(detect_disk_encryption(&exec), Some(EncryptionKind::Luks));
    }

    #[test]
    fn linux_mount_listing_timing_out_still_checks_block_devices() {
        let exec = host(
            Platform::Linux,
            ScriptedRunner::new()
                .hang("sh -c mount")
                .on("lsblk", "TYPE\ndisk\npart\ncrypt\n"),
        );
        assert_eq!(detect_disk_encryption(&exec), Some(EncryptionKind::Luks));
    }

    #[test]
    fn linux_without_either_signal_is_absent() {
        let exec = host(
            Platform::Linux,
            ScriptedRunner::new()
                .on("sh -c mount", "/dev/sda1 on / type ext4 (rw,relatime)\n")
                .on("lsblk", "TYPE\ndisk\npart\n"),
        );
        assert_eq!(detect_disk_encryption(&exec), None);
    }

    #[test]
    fn unsupported_platform_is_absent_not_an_error() {
        let exec = host(Platform::Unsupported("solaris".into()), ScriptedRunner::new());
        assert_eq!(detect_disk_encryption(&exec), None);
    }
}
