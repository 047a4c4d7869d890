/// Scan orchestration and the normalised security report.
///
/// The three probes are independent, so [`collect_findings`] runs each on
/// its own scoped thread and waits for all of them. A probe that panics is
/// contained at the join and reported as absence; the report can always be
/// produced, possibly with several absent fields.
///
/// [`SecurityReport`] derives its `*_detected` / `*_active` flags from the
/// values at construction and exposes them read-only, so a flag can never
/// disagree with the value it describes.
use crate::exec::Executor;
use crate::platform::{detect_system_info, SystemInfo};
use crate::probes::{
    detect_antivirus, detect_disk_encryption, detect_screen_lock_minutes, EncryptionKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Instant;
use tracing::{error, info};

/// Raw probe outputs, before normalisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub antivirus: Option<String>,
    pub encryption: Option<EncryptionKind>,
    pub screen_lock_minutes: Option<f64>,
}

/// Normalised report shape shared by every platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityReport {
    antivirus_detected: bool,
    antivirus_name: Option<String>,
    disk_encrypted: bool,
    encryption_type: Option<String>,
    screen_lock_active: bool,
    screen_lock_time: Option<f64>,
    operating_system: String,
    os_version: String,
    last_check: DateTime<Utc>,
}

impl SecurityReport {
    /// Aggregate settled probe results. `last_check` is the caller's
    /// wall-clock snapshot for this scan.
    pub fn new(findings: Findings, system: SystemInfo, last_check: DateTime<Utc>) -> Self {
        Self {
            antivirus_detected: findings.antivirus.is_some(),
            antivirus_name: findings.antivirus,
            disk_encrypted: findings.encryption.is_some(),
            encryption_type: findings.encryption.map(|kind| kind.label().to_owned()),
            screen_lock_active: findings.screen_lock_minutes.is_some(),
            screen_lock_time: findings.screen_lock_minutes,
            operating_system: system.operating_system,
            os_version: system.os_version,
            last_check,
        }
    }

    pub fn antivirus_detected(&self) -> bool {
        self.antivirus_detected
    }

    pub fn antivirus_name(&self) -> Option<&str> {
        self.antivirus_name.as_deref()
    }

    pub fn disk_encrypted(&self) -> bool {
        self.disk_encrypted
    }

    pub fn encryption_type(&self) -> Option<&str> {
        self.encryption_type.as_deref()
    }

    pub fn screen_lock_active(&self) -> bool {
        self.screen_lock_active
    }

    /// Minutes until the screen locks.
    pub fn screen_lock_time(&self) -> Option<f64> {
        self.screen_lock_time
    }

    pub fn operating_system(&self) -> &str {
        &self.operating_system
    }

    pub fn os_version(&self) -> &str {
        &self.os_version
    }

    pub fn last_check(&self) -> DateTime<Utc> {
        self.last_check
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// One header row plus one data row. Absent values are empty cells.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.serialize(self)?;
        csv.flush()?;
        Ok(())
    }
}

/// Run all three probes concurrently and wait for every one to settle.
pub fn collect_findings(exec: &Executor) -> Findings {
    let started = Instant::now();
    let findings = thread::scope(|scope| {
        let antivirus = spawn_probe(scope, "antivirus", || detect_antivirus(exec));
        let encryption = spawn_probe(scope, "encryption", || detect_disk_encryption(exec));
        let screen_lock = spawn_probe(scope, "screen-lock", || detect_screen_lock_minutes(exec));

        Findings {
            antivirus: join_probe("antivirus", antivirus),
            encryption: join_probe("encryption", encryption),
            screen_lock_minutes: join_probe("screen-lock", screen_lock),
        }
    });
    info!("Scan finished in {} ms", started.elapsed().as_millis());
    findings
}

/// Full scan: probes, OS identity, aggregation.
pub fn scan(exec: &Executor, checked_at: DateTime<Utc>) -> SecurityReport {
    let findings = collect_findings(exec);
    let system = detect_system_info(exec);
    SecurityReport::new(findings, system, checked_at)
}

type ProbeThread<'scope, T> = Option<ScopedJoinHandle<'scope, Option<T>>>;

fn spawn_probe<'scope, 'env, T, F>(
    scope: &'scope Scope<'scope, 'env>,
    name: &str,
    probe: F,
) -> ProbeThread<'scope, T>
where
    T: Send + 'scope,
    F: FnOnce() -> Option<T> + Send + 'scope,
{
    match thread::Builder::new()
        .name(format!("posturecheck-{name}"))
        .spawn_scoped(scope, probe)
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("{} probe: failed to spawn thread: {}", name, e);
            None
        }
    }
}

fn join_probe<T>(name: &str, handle: ProbeThread<'_, T>) -> Option<T> {
    match handle?.join() {
        Ok(value) => value,
        Err(_) => {
            error!("{} probe panicked; reporting absence", name);
            None
        }
    }
}
