use serde::{Deserialize, Serialize};

/// One role-tagged conversation message, OpenAI wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    /// User message pairing a text query with one image data URL.
    pub fn user_with_image(query: String, image_url: String) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: query },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image_url },
                },
            ]),
        }
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            top_p: default_top_p(),
            temperature: default_temperature(),
            presence_penalty: default_presence_penalty(),
        }
    }
}

fn default_max_length() -> u32 {
    4096
}

fn default_top_p() -> f64 {
    0.8
}

fn default_temperature() -> f64 {
    0.6
}

fn default_presence_penalty() -> f64 {
    1.0
}
