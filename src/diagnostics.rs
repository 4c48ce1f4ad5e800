//! Where the archive reports non-fatal problems.
//!
//! Bulk operations keep going after a per-entry failure; the failure is
//! handed to the [`DiagnosticSink`] the archive was opened with. The default
//! [`TracingSink`] forwards to `tracing`.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: Severity, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug   => tracing::debug!("{message}"),
            Severity::Info    => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error   => tracing::error!("{message}"),
        }
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<(Severity, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(Severity, String)> {
        match self.reports.lock() {
            Ok(r)  => r.clone(),
            Err(p) => p.into_inner().clone(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.reports().iter().filter(|(s, _)| *s == severity).count()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, severity: Severity, message: &str) {
        let mut reports = match self.reports.lock() {
            Ok(r)  => r,
            Err(p) => p.into_inner(),
        };
        reports.push((severity, message.to_owned()));
    }
}
