//! Replay the same lost update deterministically with scripted stages.

use std::sync::Arc;

use lockstep_stage::{StageScheduler, Yielder};

use crate::ledger::Ledger;

/// Opening balance of the scripted account.
pub const OPENING: i64 = 100;

/// Two deposits of 10 and 20.
///
/// The first deposit reads the balance and yields before writing it back; the
/// second reads and writes in one go. With `yield_mid_write` set, the first
/// write clobbers the second and the closing balance is 110. Without it the
/// deposits run back to back and the balance is 130.
pub fn lost_update(scheduler: &mut StageScheduler, yield_mid_write: bool) -> eyre::Result<i64> {
    let ledger = Arc::new(Ledger::with_balance(OPENING));

    let first = Arc::clone(&ledger);
    let second = Arc::clone(&ledger);
    scheduler
        .reset()
        .enqueue(move |y: &Yielder| {
            let seen = first.read();
            if yield_mid_write {
                y.yield_now()?;
            }
            first.write(seen + 10);
            Ok(())
        })
        .enqueue(move |_: &Yielder| {
            let seen = second.read();
            second.write(seen + 20);
            Ok(())
        })
        .run()?;

    Ok(ledger.balance())
}
