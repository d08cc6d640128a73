use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::{GrounderError, GrounderResult};

/// Perception collaborator: produces the observation image for a round.
///
/// The returned path must stay readable for the rest of the round; the
/// annotator re-opens it to draw bounding boxes.
#[async_trait]
pub trait Perception: Send + Sync {
    async fn capture(&self, round: u32) -> GrounderResult<PathBuf>;
}

/// Serves one pre-captured image for every round, materialized into the
/// cache directory as `img_{round}.png`. Backs the upload-then-run flow
/// where the observed screen is a user-provided screenshot.
pub struct StaticImageSource {
    source: PathBuf,
    cache_dir: PathBuf,
}

impl StaticImageSource {
    pub fn new(source: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            cache_dir: cache_dir.into(),
        }
    }
}

#[async_trait]
impl Perception for StaticImageSource {
    async fn capture(&self, round: u32) -> GrounderResult<PathBuf> {
        if !self.source.exists() {
            return Err(GrounderError::Perception(format!(
                "source image not found: {}",
                self.source.display()
            )));
        }
        let dest = self.cache_dir.join(round_image_name(round));
        tokio::fs::copy(&self.source, &dest).await?;
        tracing::debug!(round, path = %dest.display(), "observation captured");
        Ok(dest)
    }
}

/// Canonical cache filename for a round's observation.
pub fn round_image_name(round: u32) -> String {
    format!("img_{round}.png")
}
