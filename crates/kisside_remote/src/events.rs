use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LifecyclePhase {
    Queued,
    Sending,
    Receiving,
    Completed,
    Failed,
    Aborted,
    Timeout,
}

impl LifecyclePhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecyclePhase::Completed
                | LifecyclePhase::Failed
                | LifecyclePhase::Aborted
                | LifecyclePhase::Timeout
        )
    }

    /// Fold all failure kinds into one phase for callers that opted in.
    pub(crate) fn coalesced(self) -> Self {
        match self {
            LifecyclePhase::Aborted | LifecyclePhase::Timeout => LifecyclePhase::Failed,
            other => other,
        }
    }
}

/// One observable lifecycle transition of a queued request. Per-sequence
/// phase order is monotone; ordering across sequences is not guaranteed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    pub seq: u64,
    pub ts_millis: i64,
    pub phase: LifecyclePhase,
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn only_end_states_are_terminal() {
        assert!(!LifecyclePhase::Queued.is_terminal());
        assert!(!LifecyclePhase::Sending.is_terminal());
        assert!(!LifecyclePhase::Receiving.is_terminal());
        assert!(LifecyclePhase::Completed.is_terminal());
        assert!(LifecyclePhase::Failed.is_terminal());
        assert!(LifecyclePhase::Aborted.is_terminal());
        assert!(LifecyclePhase::Timeout.is_terminal());
    }

    #[test]
    fn coalescing_folds_failure_kinds_only() {
        assert_eq!(LifecyclePhase::Aborted.coalesced(), LifecyclePhase::Failed);
        assert_eq!(LifecyclePhase::Timeout.coalesced(), LifecyclePhase::Failed);
        assert_eq!(LifecyclePhase::Failed.coalesced(), LifecyclePhase::Failed);
        assert_eq!(
            LifecyclePhase::Completed.coalesced(),
            LifecyclePhase::Completed
        );
        assert_eq!(LifecyclePhase::Sending.coalesced(), LifecyclePhase::Sending);
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = QueueEvent {
            seq: 9,
            ts_millis: 1_000,
            phase: LifecyclePhase::Receiving,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["tsMillis"], 1_000);
        assert_eq!(json["phase"], "receiving");
    }
}
