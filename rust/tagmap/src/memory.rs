//! Resource-pressure probing.
//!
//! Mapping degrades gracefully under memory pressure: caches get disabled
//! and shrunk, never corrupted. The probe is pluggable so pressure can be
//! simulated in tests without allocating anything.

use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

pub trait MemoryProbe: Send + Sync {
    /// Share of the memory budget currently in use, in [0, 1+).
    fn used_share(&self) -> f64;
}

/// Tracks bytes accounted against a fixed budget.
///
/// Cache-owning components charge what they retain and release what they
/// drop; every consumer of one probe shares the same budget.
pub struct BudgetProbe {
    budget_bytes: usize,
    used_bytes: AtomicUsize,
}

impl BudgetProbe {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes: budget_bytes.max(1),
            used_bytes: AtomicUsize::new(0),
        }
    }

    pub fn charge(&self, bytes: usize) {
        self.used_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn release(&self, bytes: usize) {
        let mut current = self.used_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Relaxed)
    }
}

impl MemoryProbe for BudgetProbe {
    fn used_share(&self) -> f64 {
        self.used_bytes.load(Ordering::Relaxed) as f64 / self.budget_bytes as f64
    }
}

/// Test fake reporting a constant share.
pub struct FixedProbe(pub f64);

impl MemoryProbe for FixedProbe {
    fn used_share(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_accounting() {
        let probe = BudgetProbe::new(1000);
        assert_eq!(probe.used_share(), 0.0);
        probe.charge(900);
        assert!(probe.used_share() > 0.89);
        probe.release(400);
        assert_eq!(probe.used_bytes(), 500);
        // Releasing more than charged saturates at zero.
        probe.release(10_000);
        assert_eq!(probe.used_bytes(), 0);
    }

    #[test]
    fn test_fixed_probe() {
        assert_eq!(FixedProbe(0.95).used_share(), 0.95);
    }
}
