//! Well-known `method` names exchanged over the wire. Centralized so the scheduler,
//! result processor, and replication code never hand-type a string that the router
//! on the other side doesn't recognize.

pub const HEARTBEAT: &str = "event::Heartbeat";
pub const EXECUTE_COMMAND: &str = "event::ExecuteCommand";
pub const CHECK_RESULT: &str = "event::CheckResult";
pub const STATE_CHANGE: &str = "event::StateChange";
pub const SET_ACKNOWLEDGEMENT: &str = "event::SetAcknowledgement";
pub const CLEAR_ACKNOWLEDGEMENT: &str = "event::ClearAcknowledgement";
pub const SET_DOWNTIME: &str = "event::SetDowntime";
pub const REMOVE_DOWNTIME: &str = "event::RemoveDowntime";
pub const REPLAY_SYNC: &str = "event::ReplaySync";
