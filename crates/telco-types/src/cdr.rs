//! Call detail records.
//!
//! A [`Cdr`] describes one call attempt. It travels with the protocol
//! messages between a caller and a tower, and every participant that
//! touches it produces a new value rather than mutating a shared one. Each
//! value a tower publishes becomes one more snapshot appended to the
//! tower's event stream.
//!
//! # Wire form
//!
//! ```json
//! {
//!   "callerId": "01945c2a-3b4f-7def-8a12-bc34567890ab",
//!   "towerId": "0a1b2c3d",
//!   "state": "CONNECT",
//!   "startedAt": "2026-10-16T09:30:00Z",
//!   "endedAt": null,
//!   "previousTowerId": null
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CallerId, TowerId};

/// Lifecycle state of a call attempt.
///
/// `Init` is the only starting state and `Disconnect` the only terminal
/// one. A tower that stays silent produces no transition at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CdrState {
    /// Created by the caller, not yet admitted anywhere.
    Init,
    /// Admitted by a tower.
    Connect,
    /// Admitted by a tower after an earlier attempt did not get through.
    Reconnect,
    /// Explicitly rejected by a tower.
    Fail,
    /// Call finished by the caller.
    Disconnect,
}

impl CdrState {
    /// Upper-case wire name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Connect => "CONNECT",
            Self::Reconnect => "RECONNECT",
            Self::Fail => "FAIL",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl core::fmt::Display for CdrState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One snapshot of a call attempt's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cdr {
    /// The caller that created the record.
    pub caller_id: CallerId,
    /// The tower handling the attempt, once one has been chosen.
    pub tower_id: Option<TowerId>,
    /// Current lifecycle state.
    pub state: CdrState,
    /// When the caller started the attempt.
    pub started_at: DateTime<Utc>,
    /// When the caller hung up. Only set on `DISCONNECT` snapshots.
    pub ended_at: Option<DateTime<Utc>>,
    /// The tower an earlier attempt of this call went to, if any.
    pub previous_tower_id: Option<TowerId>,
}

impl Cdr {
    /// Start a new record in the `INIT` state.
    pub const fn new(caller_id: CallerId, started_at: DateTime<Utc>) -> Self {
        Self {
            caller_id,
            tower_id: None,
            state: CdrState::Init,
            started_at,
            ended_at: None,
            previous_tower_id: None,
        }
    }

    /// Copy of this record in a new state.
    #[must_use]
    pub fn with_state(mut self, state: CdrState) -> Self {
        self.state = state;
        self
    }

    /// Copy of this record addressed to `tower`.
    ///
    /// A tower already set on the record moves to `previous_tower_id`
    /// when it differs from the new one.
    #[must_use]
    pub fn with_tower(mut self, tower: TowerId) -> Self {
        match self.tower_id.take() {
            Some(old) if old != tower => {
                self.previous_tower_id = Some(old);
            }
            _ => {}
        }
        self.tower_id = Some(tower);
        self
    }

    /// Terminal copy of this record, hung up at `ended_at`.
    #[must_use]
    pub fn finished(mut self, ended_at: DateTime<Utc>) -> Self {
        self.state = CdrState::Disconnect;
        self.ended_at = Some(ended_at);
        self
    }

    /// Whether the record is in its terminal state.
    pub const fn is_terminal(&self) -> bool {
        matches!(self.state, CdrState::Disconnect)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn new_record_is_init_without_tower() {
        let cdr = Cdr::new(CallerId::new(), start());
        assert_eq!(cdr.state, CdrState::Init);
        assert!(cdr.tower_id.is_none());
        assert!(!cdr.is_terminal());
    }

    #[test]
    fn transitions_leave_the_original_untouched() {
        let original = Cdr::new(CallerId::new(), start());
        let connected = original.clone().with_state(CdrState::Connect);
        assert_eq!(original.state, CdrState::Init);
        assert_eq!(connected.state, CdrState::Connect);
        assert_eq!(connected.caller_id, original.caller_id);
    }

    #[test]
    fn retargeting_remembers_the_previous_tower() {
        let first = TowerId::from_u32(1);
        let second = TowerId::from_u32(2);
        let cdr = Cdr::new(CallerId::new(), start())
            .with_tower(first.clone())
            .with_tower(second.clone());
        assert_eq!(cdr.tower_id, Some(second.clone()));
        assert_eq!(cdr.previous_tower_id, Some(first));

        let same = cdr.clone().with_tower(second);
        assert_eq!(same.previous_tower_id, cdr.previous_tower_id);
    }

    #[test]
    fn finished_is_terminal_and_timestamped() {
        let end = start() + chrono::Duration::seconds(42);
        let cdr = Cdr::new(CallerId::new(), start()).finished(end);
        assert!(cdr.is_terminal());
        assert_eq!(cdr.ended_at, Some(end));
    }

    #[test]
    fn serializes_flat_with_camel_case_keys() {
        let cdr = Cdr::new(CallerId::new(), start())
            .with_tower(TowerId::from_u32(0xabc))
            .with_state(CdrState::Reconnect);
        let value = serde_json::to_value(&cdr);
        assert!(value.is_ok());
        let value = value.unwrap_or_default();

        assert_eq!(value["state"], "RECONNECT");
        assert_eq!(value["towerId"], "00000abc");
        assert_eq!(value["callerId"], cdr.caller_id.to_string());
        assert!(value["endedAt"].is_null());
        assert!(value.get("startedAt").is_some());

        let back = serde_json::from_value::<Cdr>(value);
        assert!(back.is_ok(), "{back:?}");
        assert_eq!(back.ok(), Some(cdr));
    }

    #[test]
    fn incomplete_json_is_not_a_cdr() {
        let partial = serde_json::json!({ "callerId": "x" });
        assert!(serde_json::from_value::<Cdr>(partial).is_err());
    }
}
