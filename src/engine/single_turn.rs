//! One-shot turn against a user-provided image.
//!
//! Unlike the multi-round control loop, this flow streams the model reply
//! token by token, keeps its history in the session store, and never
//! executes the decoded operation; it exists to inspect what the model
//! would do on a given screen.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::engine::events::AgentEvent;
use crate::engine::prompt;
use crate::errors::{GrounderError, GrounderResult};
use crate::llm::client::Inference;
use crate::llm::types::SamplingParams;
use crate::perception::annotator;
use crate::protocol::extract::extract_grounded_operation;
use crate::session::{SessionStore, TurnRecord};

/// Route prefix under which the transport serves annotated results.
const RESULT_ROUTE: &str = "/results";

pub struct TurnRunner {
    inference: Arc<dyn Inference>,
    store: Arc<SessionStore>,
    sampling: SamplingParams,
    platform: String,
    format: &'static str,
    output_dir: PathBuf,
}

impl TurnRunner {
    pub fn new(
        config: &AgentConfig,
        inference: Arc<dyn Inference>,
        store: Arc<SessionStore>,
    ) -> GrounderResult<Self> {
        let format = prompt::format_instruction(&config.format_key).ok_or_else(|| {
            GrounderError::Config(format!("unknown format_key: {}", config.format_key))
        })?;
        Ok(Self {
            inference,
            store,
            sampling: config.sampling.clone(),
            platform: config.resolved_platform(),
            format,
            output_dir: config.ensure_cache_dir()?,
        })
    }

    /// Run one streamed turn, emitting `token* (image)? done` on `events`;
    /// cancellation mid-stream emits `stopped` instead of `done`.
    pub async fn run(
        &self,
        session_id: &str,
        task: &str,
        img_path: &Path,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) {
        match self.run_inner(session_id, task, img_path, &events, &cancel).await {
            Ok(true) => {
                let _ = events.send(AgentEvent::Done).await;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(error = %e, "single turn failed");
                let _ = events
                    .send(AgentEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn run_inner(
        &self,
        session_id: &str,
        task: &str,
        img_path: &Path,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> GrounderResult<bool> {
        let history = self.store.read(session_id).await;
        let query = prompt::build_query(
            task,
            &render_history_steps(&history),
            &self.platform,
            self.format,
        );
        let message = prompt::image_message(query, img_path).await?;

        let (tok_tx, mut tok_rx) = mpsc::channel::<String>(32);
        let inference = self.inference.clone();
        let sampling = self.sampling.clone();
        let handle = tokio::spawn(async move {
            inference
                .complete_stream(vec![message], &sampling, tok_tx)
                .await
        });

        while let Some(token) = tok_rx.recv().await {
            if cancel.is_cancelled() {
                tracing::info!("stop requested, turn abandoned");
                handle.abort();
                let _ = events.send(AgentEvent::Stopped).await;
                return Ok(false);
            }
            let _ = events.send(AgentEvent::Token { content: token }).await;
        }

        let response = handle
            .await
            .map_err(|e| GrounderError::Inference(e.to_string()))??;
        self.store.append(session_id, task, &response).await;

        let boxes = annotator::extract_norm_boxes(&response);
        if !boxes.is_empty() {
            let turn = self.store.read(session_id).await.len();
            let base = img_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("img");
            let filename = format!("{base}_{turn}.png");
            annotator::annotate_image_file(img_path, &boxes, &self.output_dir.join(&filename))?;
            let _ = events
                .send(AgentEvent::Image {
                    path: format!("{RESULT_ROUTE}/{filename}"),
                })
                .await;
        }

        Ok(true)
    }
}

/// Prior grounded-operation steps, one 0-based `index. step` line each.
/// Turns whose reply carried no step line contribute nothing.
fn render_history_steps(history: &[TurnRecord]) -> String {
    let mut out = String::from("\nHistory steps: ");
    let steps = history
        .iter()
        .filter_map(|turn| extract_grounded_operation(&turn.response).0);
    for (index, step) in steps.enumerate() {
        out.push_str(&format!("\n{index}. {step}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use image::RgbaImage;

    use crate::llm::types::ChatMessage;

    struct FixedInference {
        reply: String,
    }

    #[async_trait]
    impl Inference for FixedInference {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _params: &SamplingParams,
        ) -> GrounderResult<String> {
            Ok(self.reply.clone())
        }
    }

    fn runner(dir: &Path, reply: &str, store: Arc<SessionStore>) -> TurnRunner {
        TurnRunner {
            inference: Arc::new(FixedInference {
                reply: reply.to_string(),
            }),
            store,
            sampling: SamplingParams::default(),
            platform: "WIN".into(),
            format: prompt::format_instruction(prompt::DEFAULT_FORMAT_KEY).expect("format"),
            output_dir: dir.to_path_buf(),
        }
    }

    fn screenshot(dir: &Path) -> PathBuf {
        let path = dir.join("shot.png");
        image::DynamicImage::ImageRgba8(RgbaImage::new(10, 10))
            .save(&path)
            .expect("save screenshot");
        path
    }

    async fn collect(
        runner: &TurnRunner,
        img: &Path,
        cancel: CancellationToken,
    ) -> Vec<AgentEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        runner.run("s", "find the button", img, tx, cancel).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn streams_tokens_then_annotates_then_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        let img = screenshot(dir.path());
        let store = Arc::new(SessionStore::new());
        let reply = "Grounded Operation: tap(box=[[100,100,200,200]])";
        let runner = runner(dir.path(), reply, store.clone());

        let events = collect(&runner, &img, CancellationToken::new()).await;
        assert_eq!(
            events,
            vec![
                AgentEvent::Token {
                    content: reply.into()
                },
                AgentEvent::Image {
                    path: "/results/shot_1.png".into()
                },
                AgentEvent::Done,
            ]
        );
        assert!(dir.path().join("shot_1.png").exists());
        assert_eq!(store.read("s").await.len(), 1);
    }

    #[tokio::test]
    async fn boxless_reply_emits_no_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let img = screenshot(dir.path());
        let runner = runner(
            dir.path(),
            "Action: nothing to do",
            Arc::new(SessionStore::new()),
        );

        let events = collect(&runner, &img, CancellationToken::new()).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AgentEvent::Token { .. }));
        assert_eq!(events[1], AgentEvent::Done);
    }

    #[tokio::test]
    async fn cancellation_mid_stream_emits_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let img = screenshot(dir.path());
        let store = Arc::new(SessionStore::new());
        let runner = runner(dir.path(), "Action: whatever", store.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = collect(&runner, &img, cancel).await;
        assert_eq!(events, vec![AgentEvent::Stopped]);
        // The abandoned turn never reaches the session.
        assert!(store.read("s").await.is_empty());
    }

    #[tokio::test]
    async fn history_steps_come_from_prior_replies() {
        let store = Arc::new(SessionStore::new());
        store
            .append("s", "t1", "Grounded Operation: tap(x=1)\nAction: press")
            .await;
        store.append("s", "t2", "no step in this one").await;
        store
            .append("s", "t3", "Grounded Operation: scroll(d=down)")
            .await;

        let rendered = render_history_steps(&store.read("s").await);
        assert_eq!(
            rendered,
            "\nHistory steps: \n0. tap(x=1)\n1. scroll(d=down)"
        );
    }
}
