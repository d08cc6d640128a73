//! Model-facing query assembly.

use std::path::Path;

use base64::Engine as _;

use crate::errors::GrounderResult;
use crate::llm::types::ChatMessage;

/// Five-part reply format used by the multi-round agent client.
pub const DEFAULT_FORMAT_KEY: &str = "status_plan_action_op_sensitive";

/// Output-format instruction selected by config key.
pub fn format_instruction(key: &str) -> Option<&'static str> {
    match key {
        "action_op_sensitive" => Some("(Answer in Action-Operation-Sensitive format.)"),
        "status_plan_action_op" => Some("(Answer in Status-Plan-Action-Operation format.)"),
        "status_action_op_sensitive" => Some("(Answer in Status-Action-Operation-Sensitive format.)"),
        "status_action_op" => Some("(Answer in Status-Action-Operation format.)"),
        "action_op" => Some("(Answer in Action-Operation format.)"),
        "status_plan_action_op_sensitive" => {
            Some("(Answer in Status-Plan-Action-Operation-Sensitive format.)")
        }
        _ => None,
    }
}

/// Concatenate task, rendered history, platform annotation and format
/// instruction into the query text for one round.
pub fn build_query(task: &str, history: &str, platform: &str, format: &str) -> String {
    format!("Task: {task}{history}\n(Platform: {platform})\n{format}\n")
}

/// Read the round's observation and pair it with the query as one user
/// message carrying a base64 JPEG data URL.
pub async fn image_message(query: String, img_path: &Path) -> GrounderResult<ChatMessage> {
    let bytes = tokio::fs::read(img_path).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    let url = format!("data:image/jpeg;base64,{encoded}");
    Ok(ChatMessage::user_with_image(query, url))
}
