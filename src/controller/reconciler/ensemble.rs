//! # Ensemble Plan
//!
//! Scaling and rolling-update state machine for the ensemble's peers.
//!
//! The plan is rebuilt every pass from the desired replica count and the
//! ordinals of peers that currently run (deployments with a non-zero
//! replica count). It owns one slot per ordinal and hands out one step at a
//! time; the reconciler performs the step and reports it back with
//! [`EnsemblePlan::advance`].
//!
//! Ordering rules:
//! - every excess peer is scaled to zero before any kept peer is touched
//! - peers are applied in increasing ordinal order, and a peer is only
//!   applied once the previous one is running
//! - in rolling mode a peer must also be ready before the next is applied
//!
//! Rolling mode is only honored when more than two peers are active and
//! the active count equals the desired count.


/// What this pass does to the ensemble as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleMode {
    Steady,
    ScalingUp,
    ScalingDown,
    Rolling,
}

/// Progress of one peer within the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPhase {
    /// Resources not yet applied this pass
    Pending,
    Applied,
    Running,
    Ready,
    /// Active but beyond the desired count
    Excess,
    /// Scaled to zero; storage and endpoints are kept
    Retired,
}

/// The next action the reconciler must perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStep {
    ScaleDown(u32),
    Apply(u32),
    AwaitRunning(u32),
    AwaitReady(u32),
}

impl PeerStep {
    pub fn ordinal(self) -> u32 {
        match self {
            PeerStep::ScaleDown(o)
            | PeerStep::Apply(o)
            | PeerStep::AwaitRunning(o)
            | PeerStep::AwaitReady(o) => o,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeerSlot {
    ordinal: u32,
    phase: PeerPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsemblePlan {
    desired: u32,
    active: u32,
    rolling: bool,
    /// Kept peers, indexed by `ordinal - 1`
    peers: Vec<PeerSlot>,
    /// Active peers beyond the desired count, ascending
    excess: Vec<PeerSlot>,
}

impl EnsemblePlan {
    pub fn new(desired: u32, active_ordinals: &[u32], rolling_requested: bool) -> Self {
        let mut active_ordinals = active_ordinals.to_vec();
        active_ordinals.sort_unstable();
        active_ordinals.dedup();
        let active = u32::try_from(active_ordinals.len()).unwrap_or(u32::MAX);

        let peers = (1..=desired)
            .map(|ordinal| PeerSlot {
                ordinal,
                phase: PeerPhase::Pending,
            })
            .collect();
        let excess = active_ordinals
            .iter()
            .filter(|ordinal| **ordinal > desired)
            .map(|&ordinal| PeerSlot {
                ordinal,
                phase: PeerPhase::Excess,
            })
            .collect();

        Self {
            desired,
            active,
            rolling: rolling_requested && active > 2 && active == desired,
            peers,
            excess,
        }
    }

    pub fn desired(&self) -> u32 {
        self.desired
    }

    pub fn active(&self) -> u32 {
        self.active
    }

    pub fn is_rolling(&self) -> bool {
        self.rolling
    }

    pub fn mode(&self) -> EnsembleMode {
        if self.active > self.desired || !self.excess.is_empty() {
            EnsembleMode::ScalingDown
        } else if self.active < self.desired {
            EnsembleMode::ScalingUp
        } else if self.rolling {
            EnsembleMode::Rolling
        } else {
            EnsembleMode::Steady
        }
    }

    pub fn phase(&self, ordinal: u32) -> Option<PeerPhase> {
        self.peers
            .iter()
            .chain(self.excess.iter())
            .find(|slot| slot.ordinal == ordinal)
            .map(|slot| slot.phase)
    }

    /// Next step, or `None` once every peer is done
    pub fn next_step(&self) -> Option<PeerStep> {
        if let Some(slot) = self.excess.iter().find(|s| s.phase == PeerPhase::Excess) {
            return Some(PeerStep::ScaleDown(slot.ordinal));
        }
        self.peers.iter().find_map(|slot| match slot.phase {
            PeerPhase::Pending => Some(PeerStep::Apply(slot.ordinal)),
            PeerPhase::Applied => Some(PeerStep::AwaitRunning(slot.ordinal)),
            PeerPhase::Running if self.rolling => Some(PeerStep::AwaitReady(slot.ordinal)),
            _ => None,
        })
    }

    /// Record that `step` completed
    pub fn advance(&mut self, step: PeerStep) {
        let (slots, phase) = match step {
            PeerStep::ScaleDown(_) => (&mut self.excess, PeerPhase::Retired),
            PeerStep::Apply(_) => (&mut self.peers, PeerPhase::Applied),
            PeerStep::AwaitRunning(_) => (&mut self.peers, PeerPhase::Running),
            PeerStep::AwaitReady(_) => (&mut self.peers, PeerPhase::Ready),
        };
        if let Some(slot) = slots.iter_mut().find(|s| s.ordinal == step.ordinal()) {
            slot.phase = phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(plan: &mut EnsemblePlan) -> Vec<PeerStep> {
        let mut steps = Vec::new();
        while let Some(step) = plan.next_step() {
            steps.push(step);
            plan.advance(step);
        }
        steps
    }

    #[test]
    fn cold_start_applies_peers_one_after_another() {
        let mut plan = EnsemblePlan::new(3, &[], true);
        assert_eq!(plan.mode(), EnsembleMode::ScalingUp);
        assert!(!plan.is_rolling());
        assert_eq!(
            drain(&mut plan),
            vec![
                PeerStep::Apply(1),
                PeerStep::AwaitRunning(1),
                PeerStep::Apply(2),
                PeerStep::AwaitRunning(2),
                PeerStep::Apply(3),
                PeerStep::AwaitRunning(3),
            ]
        );
    }

    #[test]
    fn scale_down_retires_excess_before_touching_kept_peers() {
        let mut plan = EnsemblePlan::new(1, &[1, 2, 3], false);
        assert_eq!(plan.mode(), EnsembleMode::ScalingDown);
        let steps = drain(&mut plan);
        assert_eq!(
            steps,
            vec![
                PeerStep::ScaleDown(2),
                PeerStep::ScaleDown(3),
                PeerStep::Apply(1),
                PeerStep::AwaitRunning(1),
            ]
        );
        assert_eq!(plan.phase(3), Some(PeerPhase::Retired));
    }

    #[test]
    fn rolling_waits_for_readiness_between_peers() {
        let mut plan = EnsemblePlan::new(3, &[1, 2, 3], true);
        assert_eq!(plan.mode(), EnsembleMode::Rolling);
        let steps = drain(&mut plan);
        assert_eq!(steps.len(), 9);
        assert_eq!(
            &steps[..4],
            &[
                PeerStep::Apply(1),
                PeerStep::AwaitRunning(1),
                PeerStep::AwaitReady(1),
                PeerStep::Apply(2),
            ]
        );
        assert_eq!(plan.phase(3), Some(PeerPhase::Ready));
    }

    #[test]
    fn rolling_is_never_active_below_quorum_safe_size_or_while_resizing() {
        for (desired, active) in [
            (2, vec![1, 2]),
            (1, vec![1]),
            (3, vec![1, 2]),
            (3, vec![1, 2, 3, 4]),
            (5, vec![1, 2, 3]),
        ] {
            let plan = EnsemblePlan::new(desired, &active, true);
            assert!(!plan.is_rolling(), "desired {desired} active {active:?}");
            assert!(!drain(&mut plan.clone())
                .iter()
                .any(|step| matches!(step, PeerStep::AwaitReady(_))));
        }
    }

    #[test]
    fn steady_ensemble_still_reapplies_every_peer() {
        let mut plan = EnsemblePlan::new(3, &[3, 1, 2], false);
        assert_eq!(plan.mode(), EnsembleMode::Steady);
        let applied: Vec<u32> = drain(&mut plan)
            .into_iter()
            .filter(|step| matches!(step, PeerStep::Apply(_)))
            .map(PeerStep::ordinal)
            .collect();
        assert_eq!(applied, vec![1, 2, 3]);
    }

    #[test]
    fn gaps_in_active_ordinals_are_handled() {
        let mut plan = EnsemblePlan::new(2, &[1, 4], false);
        assert_eq!(plan.active(), 2);
        assert_eq!(plan.mode(), EnsembleMode::ScalingDown);
        assert_eq!(plan.next_step(), Some(PeerStep::ScaleDown(4)));
        plan.advance(PeerStep::ScaleDown(4));
        assert_eq!(plan.next_step(), Some(PeerStep::Apply(1)));
    }
}
