use chrono::{DateTime, Utc};

use warden_core::{CheckStatus, ServiceId, TeamId};

/// A domain-agnostic event trait.
///
/// Kept separate from `GameEvent` so event-bus plumbing can stay generic
/// over whatever message type it is asked to carry.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name, e.g. "check" or "attack".
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time, not enqueue time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// The two kinds of fact the engine produces: a checker observation, or an
/// accepted flag theft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    Check {
        team: TeamId,
        service: ServiceId,
        status: CheckStatus,
        timestamp: DateTime<Utc>,
    },
    Attack {
        attacker: TeamId,
        service: ServiceId,
        victim: TeamId,
        timestamp: DateTime<Utc>,
    },
}

impl Event for GameEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GameEvent::Check { .. } => "check",
            GameEvent::Attack { .. } => "attack",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GameEvent::Check { timestamp, .. } => *timestamp,
            GameEvent::Attack { timestamp, .. } => *timestamp,
        }
    }
}
