//! Grounder drives a vision-grounded agent model through a bounded sequence
//! of observe-decide-act rounds: capture the screen, ask the model, decode
//! its grounded operation, annotate and execute it, then decide whether to
//! continue, stop, or fail. Transports consume the run as an ordered stream
//! of [`engine::events::AgentEvent`]s.

pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod protocol;
pub mod session;

pub use config::AgentConfig;
pub use engine::control_loop::{ControlLoop, MAX_ROUNDS};
pub use engine::events::AgentEvent;
pub use engine::single_turn::TurnRunner;
pub use errors::{GrounderError, GrounderResult};
pub use protocol::operation::{GroundedOperation, Operation};
pub use session::SessionStore;

/// Install the global tracing subscriber, honouring RUST_LOG-style env
/// filtering.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
