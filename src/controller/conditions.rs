//! # Condition Tracker
//!
//! Maintains the ordered condition list on the document status.
//!
//! Conditions are keyed by `reason`: a new condition either replaces the
//! entry with the same reason in place or is appended, so the list keeps
//! the order in which reasons first appeared during the cycle.

use crate::crd::{ConditionType, StatusCondition};

/// Reason of the aggregate condition describing the whole cycle
pub const RECONCILE_CYCLE_REASON: &str = "ReconcileCycleStatus";

/// Upsert `condition` by reason
///
/// Returns `false` when an identical condition (type, status and message)
/// is already present, in which case the list is left untouched and the
/// original transition time is kept.
pub fn add_condition(conditions: &mut Vec<StatusCondition>, condition: StatusCondition) -> bool {
    match conditions
        .iter_mut()
        .find(|existing| existing.reason == condition.reason)
    {
        Some(existing) => {
            if existing.r#type == condition.r#type
                && existing.status == condition.status
                && existing.message == condition.message
            {
                return false;
            }
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Whether any condition reports a failure
pub fn has_failed_conditions(conditions: &[StatusCondition]) -> bool {
    conditions
        .iter()
        .any(|condition| condition.r#type == ConditionType::Failed)
}
