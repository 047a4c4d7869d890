/// Security probes: one function per control, each dispatching on the
/// host [`Platform`](crate::platform::Platform).
///
/// Every probe returns `Option<T>`: `Some` carries the detected value,
/// `None` means "not configured or undetectable". Absence is a finding, not
/// an error. Probes never propagate failures; a command that fails, times
/// out, or is missing is logged and folded into `None` so one broken
/// mechanism cannot take the other probes down with it.
pub mod antivirus;
pub mod encryption;
pub mod screen_lock;

pub use antivirus::detect_antivirus;
pub use encryption::{detect_disk_encryption, BitLockerStatus, EncryptionKind};
pub use screen_lock::detect_screen_lock_minutes;

use crate::exec::CommandError;
use tracing::warn;

/// Separator used when a probe reports several products at once.
pub const LIST_SEPARATOR: &str = ", ";

/// Log a failed OS call and turn it into absence.
fn absent<T>(probe: &str, err: CommandError) -> Option<T> {
    warn!("{}: {}", probe, err);
    None
}
