//! Orchestration of a single health check.
//!
//! `HealthChecker::run` owns the registration/deregistration of the check in
//! the active-check registry and the cancellation checkpoints around the
//! probe. A check interrupted mid-probe skips all state updates: the store's
//! existing record stays the ground truth, and whoever fired the token (the
//! cancel operator or the manual-check deadline) resets the status.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::HealthPulseError;
use crate::probe::{Notifier, ProbeOutcome, Prober};
use crate::registry::{ActiveChecks, InterruptToken};
use crate::state_machine::HealthStateMachine;

pub struct HealthChecker {
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    state_machine: Arc<HealthStateMachine>,
    active_checks: Arc<ActiveChecks>,
}

impl HealthChecker {
    pub fn new(
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
        state_machine: Arc<HealthStateMachine>,
        active_checks: Arc<ActiveChecks>,
    ) -> Self {
        Self {
            prober,
            notifier,
            state_machine,
            active_checks,
        }
    }

    /// Run one probe against `file_path` and route the outcome through the
    /// state machine and the notifier.
    ///
    /// Fails with `AlreadyActive` when a check for the path is in flight,
    /// and with `Interrupted` when the check's token (a child of `outer`,
    /// when given) fires before or during the probe.
    pub fn run(
        &self,
        file_path: &str,
        outer: Option<&InterruptToken>,
    ) -> Result<ProbeOutcome, HealthPulseError> {
        let token = match outer {
            Some(outer) => outer.child(),
            None => InterruptToken::new(),
        };

        self.active_checks.register(file_path, token.clone())?;
        let result = self.run_registered(file_path, &token);
        // Deregister on every exit path; tolerant of a concurrent cancel
        // having already removed the entry.
        self.active_checks.deregister(file_path);
        result
    }

    fn run_registered(
        &self,
        file_path: &str,
        token: &InterruptToken,
    ) -> Result<ProbeOutcome, HealthPulseError> {
        if token.is_interrupted() {
            return Err(HealthPulseError::Interrupted);
        }

        debug!("Probing '{}'", file_path);
        let outcome = self.prober.probe(file_path, token)?;

        // Interrupted mid-probe: the result is not trustworthy and the
        // record must not move.
        if token.is_interrupted() {
            return Err(HealthPulseError::Interrupted);
        }

        self.state_machine.apply(file_path, &outcome)?;

        if let Err(err) = self.notifier.notify(file_path, &outcome) {
            warn!("Failed to notify '{}' status change: {}", file_path, err);
        }

        Ok(outcome)
    }
}
