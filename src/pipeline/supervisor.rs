//! Latest-request-wins coordination between analysis runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle for one analysis run.
///
/// Carries the cancellation token the run must honor and the generation it
/// was started in.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    generation: u64,
    token: CancellationToken,
}

impl AnalysisTicket {
    /// A ticket that no supervisor will ever cancel.
    pub fn detached() -> Self {
        Self {
            generation: 0,
            token: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Starts analysis runs so that a newer run cancels the one before it.
#[derive(Debug, Default)]
pub struct AnalysisSupervisor {
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
}

impl AnalysisSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the in-flight run, if any, and issues a ticket for a new one.
    pub fn begin(&self) -> AnalysisTicket {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "analysis started");

        AnalysisTicket { generation, token }
    }

    /// Whether `ticket` belongs to the most recent run.
    ///
    /// Results from a ticket that is no longer current must be discarded.
    pub fn is_current(&self, ticket: &AnalysisTicket) -> bool {
        ticket.generation != 0 && ticket.generation == self.generation.load(Ordering::SeqCst)
    }

    /// Cancels the in-flight run without starting another.
    pub fn cancel_current(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = current.as_ref() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_cancels_previous() {
        let supervisor = AnalysisSupervisor::new();
        let first = supervisor.begin();
        assert!(supervisor.is_current(&first));
        assert!(!first.is_cancelled());

        let second = supervisor.begin();
        assert!(first.is_cancelled());
        assert!(!supervisor.is_current(&first));
        assert!(supervisor.is_current(&second));
        assert!(!second.is_cancelled());
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_cancel_current_keeps_generation() {
        let supervisor = AnalysisSupervisor::new();
        let ticket = supervisor.begin();
        supervisor.cancel_current();

        assert!(ticket.is_cancelled());
        assert!(supervisor.is_current(&ticket));
    }

    #[test]
    fn test_detached_ticket_is_never_current() {
        let supervisor = AnalysisSupervisor::new();
        let detached = AnalysisTicket::detached();
        assert!(!supervisor.is_current(&detached));
        supervisor.begin();
        assert!(!detached.is_cancelled());
    }
}
