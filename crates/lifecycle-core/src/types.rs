use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Conclusion
// ---------------------------------------------------------------------------

/// How a completed workflow run ended, as reported by the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    TimedOut,
    Cancelled,
    Neutral,
    Skipped,
    Stale,
    ActionRequired,
    /// A value the backend added after this list was written.
    #[serde(untagged)]
    Other(String),
}

impl Conclusion {
    pub fn as_str(&self) -> &str {
        match self {
            Conclusion::Success => "success",
            Conclusion::Failure => "failure",
            Conclusion::TimedOut => "timed_out",
            Conclusion::Cancelled => "cancelled",
            Conclusion::Neutral => "neutral",
            Conclusion::Skipped => "skipped",
            Conclusion::Stale => "stale",
            Conclusion::ActionRequired => "action_required",
            Conclusion::Other(s) => s,
        }
    }

    /// The terminal event a run with this conclusion resolves to.
    ///
    /// Total over `success`, `failure` and `timed_out`; `None` for everything
    /// else, which leaves the operation pending.
    pub fn terminal_event(&self) -> Option<EventType> {
        match self {
            Conclusion::Success => Some(EventType::Configured),
            Conclusion::Failure => Some(EventType::ConfigurationFailed),
            Conclusion::TimedOut => Some(EventType::ConfigurationTimedOut),
            _ => None,
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "SaaS.Lifecycle.Subscription.Configuring")]
    Configuring,
    #[serde(rename = "SaaS.Lifecycle.Subscription.Configured")]
    Configured,
    #[serde(rename = "SaaS.Lifecycle.Subscription.ConfigurationFailed")]
    ConfigurationFailed,
    #[serde(rename = "SaaS.Lifecycle.Subscription.ConfigurationTimedOut")]
    ConfigurationTimedOut,
}

impl EventType {
    pub fn all() -> &'static [EventType] {
        &[
            EventType::Configuring,
            EventType::Configured,
            EventType::ConfigurationFailed,
            EventType::ConfigurationTimedOut,
        ]
    }

    /// Wire name published to the event sink.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Configuring => "SaaS.Lifecycle.Subscription.Configuring",
            EventType::Configured => "SaaS.Lifecycle.Subscription.Configured",
            EventType::ConfigurationFailed => "SaaS.Lifecycle.Subscription.ConfigurationFailed",
            EventType::ConfigurationTimedOut => {
                "SaaS.Lifecycle.Subscription.ConfigurationTimedOut"
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, EventType::Configuring)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExecutionRun
// ---------------------------------------------------------------------------

/// Read-only view of a completed workflow run.
///
/// `branch_name` is what the reconciler matches against pending operation ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub run_id: String,
    pub branch_name: String,
    pub conclusion: Conclusion,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub url: String,
}
