//! Pulls the grounded-operation step and the human-readable action out of a
//! raw model reply.

use std::sync::LazyLock;

use regex::Regex;

static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Grounded Operation:\s*(.*)").unwrap());
static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Action:\s*(.*)").unwrap());

/// Extract `(step, action)` from a reply.
///
/// Each label is looked up independently and only its first occurrence is
/// consulted; later instances are not an error, just ignored.
pub fn extract_grounded_operation(response: &str) -> (Option<String>, Option<String>) {
    let step = STEP_RE
        .captures(response)
        .map(|c| c[1].to_string());
    let action = ACTION_RE
        .captures(response)
        .map(|c| c[1].to_string());
    (step, action)
}
