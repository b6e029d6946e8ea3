//! A single account balance, with and without a guard around deposits.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct Ledger {
    balance: AtomicI64,
    guard: Mutex<()>,
}

impl Ledger {
    pub fn with_balance(balance: i64) -> Self {
        Self {
            balance: AtomicI64::new(balance),
            guard: Mutex::new(()),
        }
    }

    pub fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    /// First half of a read-modify-write.
    pub fn read(&self) -> i64 {
        self.balance()
    }

    /// Second half of a read-modify-write. Overwrites whatever is there.
    pub fn write(&self, balance: i64) {
        self.balance.store(balance, Ordering::SeqCst);
    }

    /// Read, pause, write back. Concurrent callers overwrite each other.
    pub fn deposit_unguarded(&self, amount: i64) {
        let seen = self.read();
        std::thread::yield_now();
        self.write(seen + amount);
    }

    /// The same read-modify-write, serialised.
    pub fn deposit_guarded(&self, amount: i64) {
        let _guard = self.guard.lock();
        self.deposit_unguarded(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_deposits() {
        let ledger = Ledger::with_balance(5);
        ledger.deposit_unguarded(10);
        ledger.deposit_guarded(20);
        assert_eq!(ledger.balance(), 35);
    }
}
