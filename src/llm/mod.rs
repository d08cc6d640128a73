pub mod client;
pub mod sse;
pub mod types;
