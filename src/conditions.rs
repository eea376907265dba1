//! Status condition helper shared by all three reconcilers (SPEC_FULL.md §B.4).

use schemars::JsonSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

/// A small ordered set of conditions with upsert semantics: `lastTransitionTime`
/// only moves when `status` actually changes, matching §6's condition schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Conditions(pub Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// Sets a condition, only touching `lastTransitionTime` if `status` changed.
    pub fn set(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: &str, now: DateTime<Utc>) {
        if let Some(existing) = self.0.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message.to_string();
        } else {
            self.0.push(Condition {
                type_: type_.to_string(),
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn new_condition_is_inserted_with_given_timestamp() {
        let mut conditions = Conditions::new();
        conditions.set("Ready", ConditionStatus::True, "Ready", "all good", t(100));
        let c = conditions.get("Ready").unwrap();
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.last_transition_time, t(100));
    }

    #[test]
    fn unchanged_status_does_not_move_transition_time() {
        let mut conditions = Conditions::new();
        conditions.set("Ready", ConditionStatus::True, "Ready", "msg1", t(100));
        conditions.set("Ready", ConditionStatus::True, "Ready", "msg2", t(200));
        let c = conditions.get("Ready").unwrap();
        assert_eq!(c.last_transition_time, t(100));
        assert_eq!(c.message, "msg2");
    }

    #[test]
    fn changed_status_moves_transition_time() {
        let mut conditions = Conditions::new();
        conditions.set("Ready", ConditionStatus::False, "Init", "not ready", t(100));
        conditions.set("Ready", ConditionStatus::True, "Ready", "now ready", t(200));
        let c = conditions.get("Ready").unwrap();
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.last_transition_time, t(200));
    }
}
