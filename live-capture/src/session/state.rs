//! Session status machine.
//!
//! ```text
//! Pending ──► Recording ──► Completed
//!    │          │  ▲  └────► Stopped
//!    │          ▼  │
//!    └─────► Reconnecting ──► Failed
//! ```
//!
//! Any non-terminal status may move to `Stopped`. Terminal statuses are final.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, no process launched yet.
    Pending,
    /// A capture process is running.
    Recording,
    /// The last attempt failed; waiting out the backoff before relaunching.
    Reconnecting,
    /// Stopped on request.
    Stopped,
    /// The capture process finished successfully.
    Completed,
    /// Every allowed attempt failed.
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Recording => "recording",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// Statuses during which the session owns a process handle.
    pub fn owns_process(&self) -> bool {
        matches!(self, Self::Recording | Self::Reconnecting)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Stopped) => true,
            (Pending, Recording | Reconnecting | Failed) => true,
            (Recording, Completed | Reconnecting | Failed) => true,
            (Reconnecting, Recording | Reconnecting | Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a session does after one capture attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    Stop,
    Complete,
    Reconnect { retry_count: u32 },
    Fail { retry_count: u32 },
}

/// Decide the next step after an attempt.
///
/// A stop request dominates everything, including a failure exit. A failure
/// spends one retry; once the retry count reaches `max_retries` the session fails.
pub fn decide_after_attempt(
    stop_requested: bool,
    succeeded: bool,
    retry_count: u32,
    max_retries: u32,
) -> AttemptDecision {
    if stop_requested {
        return AttemptDecision::Stop;
    }
    if succeeded {
        return AttemptDecision::Complete;
    }
    if retry_count >= max_retries {
        return AttemptDecision::Fail { retry_count };
    }

    let retry_count = retry_count + 1;
    if retry_count < max_retries {
        AttemptDecision::Reconnect { retry_count }
    } else {
        AttemptDecision::Fail { retry_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    const ALL: [SessionStatus; 6] = [Pending, Recording, Reconnecting, Stopped, Completed, Failed];

    #[test]
    fn test_terminal_statuses_are_final() {
        for from in [Stopped, Completed, Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_any_live_status_can_stop() {
        for from in [Pending, Recording, Reconnecting] {
            assert!(from.can_transition_to(Stopped));
        }
    }

    #[test]
    fn test_main_path_transitions() {
        assert!(Pending.can_transition_to(Recording));
        assert!(Recording.can_transition_to(Completed));
        assert!(Recording.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Recording));
        assert!(Reconnecting.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Reconnecting.can_transition_to(Completed));
        assert!(!Recording.can_transition_to(Pending));
    }

    #[test]
    fn test_process_ownership() {
        assert!(Recording.owns_process());
        assert!(Reconnecting.owns_process());
        assert!(!Pending.owns_process());
        assert!(!Stopped.owns_process());
    }

    #[test]
    fn test_stop_dominates_failure_exit() {
        assert_eq!(decide_after_attempt(true, false, 0, 3), AttemptDecision::Stop);
        assert_eq!(decide_after_attempt(true, true, 0, 3), AttemptDecision::Stop);
    }

    #[test]
    fn test_success_completes() {
        assert_eq!(decide_after_attempt(false, true, 2, 3), AttemptDecision::Complete);
    }

    #[test]
    fn test_failures_spend_retries_until_exhausted() {
        assert_eq!(
            decide_after_attempt(false, false, 0, 3),
            AttemptDecision::Reconnect { retry_count: 1 }
        );
        assert_eq!(
            decide_after_attempt(false, false, 1, 3),
            AttemptDecision::Reconnect { retry_count: 2 }
        );
        assert_eq!(
            decide_after_attempt(false, false, 2, 3),
            AttemptDecision::Fail { retry_count: 3 }
        );
    }

    #[test]
    fn test_retry_count_never_exceeds_max() {
        for max in 0..5 {
            let mut retries = 0;
            loop {
                match decide_after_attempt(false, false, retries, max) {
                    AttemptDecision::Reconnect { retry_count } => retries = retry_count,
                    AttemptDecision::Fail { retry_count } => {
                        assert!(retry_count <= max);
                        break;
                    }
                    other => panic!("unexpected decision {other:?}"),
                }
                assert!(retries <= max);
            }
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Reconnecting).unwrap(), "\"reconnecting\"");
        assert_eq!(Completed.to_string(), "completed");
    }
}
