use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use relay_model::AgentLoad;
use tracing::{debug, trace};

/// Process-wide concurrency limiter shared by every job pipeline.
///
/// Admission is a single compare-and-increment: `in_flight` is only raised when the result stays within `ceiling`.
/// A successful admission yields an [`AdmissionPermit`]; dropping the permit is the only way a slot is released.
#[derive(Debug)]
pub struct AdmissionGate {
    in_flight: AtomicUsize,
    ceiling: AtomicUsize,
}

impl AdmissionGate {
    /// Ceiling used until the control server pushes its own.
    pub const DEFAULT_CEILING: usize = 1;

    pub fn new(ceiling: usize) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            ceiling: AtomicUsize::new(ceiling.max(1)),
        })
    }

    /// Reserves a slot, or returns `None` when the gate is at its ceiling.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        let ceiling = self.ceiling.load(Ordering::Acquire);
        let admitted = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < ceiling).then_some(n + 1)
            });

        match admitted {
            Ok(prev) => {
                trace!(in_flight = prev + 1, ceiling, "slot admitted");
                Some(AdmissionPermit {
                    gate: Arc::clone(self),
                })
            }
            Err(n) => {
                trace!(in_flight = n, ceiling, "no capacity");
                None
            }
        }
    }

    /// Applies a server-pushed ceiling. Values below 1 are raised to 1.
    ///
    /// Lowering the ceiling never revokes slots already held; it only blocks new ones until enough are released.
    pub fn set_ceiling(&self, ceiling: usize) {
        let ceiling = ceiling.max(1);
        let prev = self.ceiling.swap(ceiling, Ordering::AcqRel);
        if prev != ceiling {
            debug!(from = prev, to = ceiling, "admission ceiling updated");
        }
    }

    pub fn load(&self) -> AgentLoad {
        AgentLoad {
            in_flight: self.in_flight.load(Ordering::Acquire),
            ceiling: self.ceiling.load(Ordering::Acquire),
        }
    }

    fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            ceiling: AtomicUsize::new(Self::DEFAULT_CEILING),
        }
    }
}

/// A reserved admission slot, released exactly once on drop.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release();
        trace!(in_flight = self.gate.load().in_flight, "slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn third_admit_is_denied_at_ceiling_two() {
        let gate = AdmissionGate::new(2);
        let a = gate.try_admit();
        let b = gate.try_admit();
        let c = gate.try_admit();

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
        assert_eq!(gate.load().in_flight, 2);

        drop(a);
        assert_eq!(gate.load().in_flight, 1);
        assert!(gate.try_admit().is_some());
    }

    #[test]
    fn ceiling_is_clamped_to_one() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.load().ceiling, 1);
        gate.set_ceiling(0);
        assert_eq!(gate.load().ceiling, 1);
    }

    #[test]
    fn lowering_ceiling_keeps_held_slots() {
        let gate = AdmissionGate::new(3);
        let held: Vec<_> = (0..3).filter_map(|_| gate.try_admit()).collect();
        assert_eq!(held.len(), 3);

        gate.set_ceiling(1);
        assert!(gate.try_admit().is_none());
        assert_eq!(gate.load().in_flight, 3);

        drop(held);
        assert_eq!(gate.load().in_flight, 0);
        assert!(gate.try_admit().is_some());
    }

    #[test]
    fn concurrent_admits_never_exceed_ceiling() {
        let gate = AdmissionGate::new(4);
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(p) = gate.try_admit() {
                            peak.fetch_max(gate.load().in_flight, Ordering::AcqRel);
                            drop(p);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(peak.load(Ordering::Acquire) <= 4);
        assert_eq!(gate.load().in_flight, 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Admit,
        Release(usize),
        SetCeiling(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Admit),
            2 => (0usize..8).prop_map(Op::Release),
            1 => (0usize..5).prop_map(Op::SetCeiling),
        ]
    }

    proptest! {
        #[test]
        fn admit_release_sequences_keep_counter_bounded(ops in prop::collection::vec(op(), 0..64)) {
            let gate = AdmissionGate::new(2);
            let mut held = Vec::new();

            for op in ops {
                match op {
                    Op::Admit => {
                        let ceiling = gate.load().ceiling;
                        let before = gate.load().in_flight;
                        match gate.try_admit() {
                            Some(p) => {
                                prop_assert!(before < ceiling);
                                held.push(p);
                            }
                            None => prop_assert!(before >= ceiling),
                        }
                    }
                    Op::Release(i) => {
                        if !held.is_empty() {
                            held.remove(i % held.len());
                        }
                    }
                    Op::SetCeiling(n) => gate.set_ceiling(n),
                }
                prop_assert_eq!(gate.load().in_flight, held.len());
            }

            drop(held);
            prop_assert_eq!(gate.load().in_flight, 0);
        }
    }
}
