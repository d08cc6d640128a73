use serde::{Deserialize, Serialize};

/// One entry of the ordered event stream a run emits.
///
/// Events for round n always precede any event for round n+1, and the
/// stream closes after its terminal event. The serialized form is the wire
/// schema a transport forwards verbatim (e.g. as SSE data lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    WarningStart,
    Round { round: u32 },
    Response { content: String },
    /// Incremental model text, single-turn streaming only.
    Token { content: String },
    Image { path: String },
    Stopped,
    Error { message: String },
    WarningEnd,
    Done,
}
