//! Provoke lost updates by releasing deposits in pulses.

use std::collections::BTreeSet;
use std::sync::Arc;

use lockstep_phased::PhasedExecutor;
use tracing::debug;

use crate::ledger::Ledger;

/// Amount every deposit adds.
pub const DEPOSIT: i64 = 10;

/// Outcome of one batch of concurrent deposits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceReport {
    pub deposits: usize,
    pub pulses: usize,
    pub expected: i64,
    pub observed: i64,
}

impl RaceReport {
    /// Deposits whose effect was overwritten by a concurrent one.
    pub fn lost_updates(&self) -> i64 {
        (self.expected - self.observed) / DEPOSIT
    }
}

/// Run `deposits` deposits against a fresh ledger through `executor`.
pub fn run_round(executor: &PhasedExecutor, deposits: usize, guarded: bool) -> eyre::Result<RaceReport> {
    let ledger = Arc::new(Ledger::default());

    let tasks = (0..deposits).map(|_| {
        let ledger = Arc::clone(&ledger);
        move || -> eyre::Result<()> {
            if guarded {
                ledger.deposit_guarded(DEPOSIT);
            } else {
                ledger.deposit_unguarded(DEPOSIT);
            }
            Ok(())
        }
    });

    let handles = executor.invoke_all(tasks)?;

    let mut pulses = BTreeSet::new();
    for handle in &handles {
        if let Some(pulse) = handle.pulse() {
            pulses.insert(pulse);
        }
        if let Err(err) = handle.result() {
            return Err(eyre::eyre!("deposit {} did not complete: {}", handle.index(), err));
        }
    }

    let report = RaceReport {
        deposits,
        pulses: pulses.len(),
        expected: DEPOSIT * deposits as i64,
        observed: ledger.balance(),
    };
    debug!(?report, guarded, "race round finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_guarded_round_loses_nothing() {
        let Ok(executor) = PhasedExecutor::new(2) else {
            return;
        };

        let report = run_round(&executor, 12, true).unwrap();
        assert_eq!(report.deposits, 12);
        assert_eq!(report.expected, 120);
        assert_eq!(report.observed, 120);
        assert_eq!(report.lost_updates(), 0);
        assert_eq!(report.pulses, 6);
    }

    #[test]
    fn test_lost_updates_arithmetic() {
        let report = RaceReport {
            deposits: 8,
            pulses: 2,
            expected: 80,
            observed: 50,
        };
        assert_eq!(report.lost_updates(), 3);
    }
}
