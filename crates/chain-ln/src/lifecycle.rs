use serde::{Deserialize, Serialize};

use crate::api::OpenedChannel;

/// Progress reported while a channel-open run is in flight.
pub const PROGRESS_IDLE: i8 = 0;
pub const PROGRESS_ACTIVE: i8 = 100;
pub const PROGRESS_EXHAUSTED: i8 = -1;

const PROGRESS_STEP: i8 = 33;
const PROGRESS_ATTEMPT_CAP: i8 = 66;

/// State of one channel-open run across an ordered list of candidate nodes.
///
/// Transitions are pure: each consumes the state and returns the next one.
/// `Active` and `Exhausted` are terminal and absorb further events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChannelState {
    Idle,
    Attempting { index: usize },
    Active { index: usize, channel: OpenedChannel },
    Exhausted,
}

impl ChannelState {
    /// Begin a run over `candidates` nodes.
    pub fn start(self, candidates: usize) -> Self {
        match self {
            ChannelState::Idle if candidates > 0 => ChannelState::Attempting { index: 0 },
            ChannelState::Idle => ChannelState::Exhausted,
            other => other,
        }
    }

    pub fn on_success(self, channel: OpenedChannel) -> Self {
        match self {
            ChannelState::Attempting { index } => ChannelState::Active { index, channel },
            other => other,
        }
    }

    /// Move to the next candidate, or to `Exhausted` after the last one.
    pub fn on_failure(self, candidates: usize) -> Self {
        match self {
            ChannelState::Attempting { index } if index + 1 < candidates => {
                ChannelState::Attempting { index: index + 1 }
            }
            ChannelState::Attempting { .. } => ChannelState::Exhausted,
            other => other,
        }
    }

    /// Progress value persisted for this state.
    ///
    /// Attempt `i` reports `(i + 1) * 33`, capped at 66 so that progress stays
    /// within `{0, 33, 66, 100, -1}` however many candidates are configured.
    pub fn progress(&self) -> i8 {
        match self {
            ChannelState::Idle => PROGRESS_IDLE,
            ChannelState::Attempting { index } => {
                let step = i8::try_from(*index + 1).unwrap_or(i8::MAX);
                step.saturating_mul(PROGRESS_STEP).min(PROGRESS_ATTEMPT_CAP)
            }
            ChannelState::Active { .. } => PROGRESS_ACTIVE,
            ChannelState::Exhausted => PROGRESS_EXHAUSTED,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Active { .. } | ChannelState::Exhausted)
    }
}

/// Nodes to try, in order. An explicit node URI is tried alone and the
/// configured list is not consulted.
pub fn candidate_nodes(explicit: Option<&str>, configured: &[String]) -> Vec<String> {
    match explicit.map(str::trim).filter(|uri| !uri.is_empty()) {
        Some(uri) => vec![uri.to_string()],
        None => configured.to_vec(),
    }
}
