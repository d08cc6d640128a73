//! The per-task state machine: capture, infer, extract, annotate, execute,
//! decide, at most [`MAX_ROUNDS`] times.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::engine::events::AgentEvent;
use crate::engine::history::RoundHistory;
use crate::engine::prompt;
use crate::errors::{GrounderError, GrounderResult};
use crate::executor::{Executor, END_STATUS};
use crate::llm::client::Inference;
use crate::llm::types::SamplingParams;
use crate::perception::annotator;
use crate::perception::capture::Perception;
use crate::protocol::extract::extract_grounded_operation;
use crate::protocol::operation::Operation;
use crate::session::SessionStore;

/// Hard ceiling on observe-decide-act rounds per run.
pub const MAX_ROUNDS: u32 = 15;

/// Route prefix under which the transport serves cached images.
const CACHE_ROUTE: &str = "/caches";

/// Orchestrates one task run round by round and publishes a typed event
/// stream for the transport to drain in order.
pub struct ControlLoop {
    perception: Arc<dyn Perception>,
    inference: Arc<dyn Inference>,
    executor: Arc<dyn Executor>,
    store: Arc<SessionStore>,
    sampling: SamplingParams,
    platform: String,
    format: &'static str,
    cache_dir: PathBuf,
}

impl ControlLoop {
    pub fn new(
        config: &AgentConfig,
        perception: Arc<dyn Perception>,
        inference: Arc<dyn Inference>,
        executor: Arc<dyn Executor>,
        store: Arc<SessionStore>,
    ) -> GrounderResult<Self> {
        let format = prompt::format_instruction(&config.format_key).ok_or_else(|| {
            GrounderError::Config(format!("unknown format_key: {}", config.format_key))
        })?;
        Ok(Self {
            perception,
            inference,
            executor,
            store,
            sampling: config.sampling.clone(),
            platform: config.resolved_platform(),
            format,
            cache_dir: config.ensure_cache_dir()?,
        })
    }

    /// Spawn the run as its own task and hand back the event stream. The
    /// `cancel` token belongs to this invocation only, so a cancelled run
    /// cannot leak its state into the next one.
    pub fn start(
        self: Arc<Self>,
        session_id: String,
        task: String,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            self.run(&session_id, &task, tx, cancel).await;
        });
        rx
    }

    /// Run one task to completion, emitting events on `events`.
    ///
    /// Expected terminations (`NO_ACTION`, executor END, cancellation, the
    /// round ceiling) close the stream with the `warning_end`/`done` pair;
    /// an unexpected fault surfaces as a single `error` event instead.
    pub async fn run(
        &self,
        session_id: &str,
        task: &str,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) {
        let _ = events.send(AgentEvent::WarningStart).await;
        match self.run_rounds(session_id, task, &events, &cancel).await {
            Ok(()) => {
                let _ = events.send(AgentEvent::WarningEnd).await;
                let _ = events.send(AgentEvent::Done).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "task run failed");
                let _ = events
                    .send(AgentEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
        tracing::info!(session = %session_id, "task run ended");
    }

    async fn run_rounds(
        &self,
        session_id: &str,
        task: &str,
        events: &mpsc::Sender<AgentEvent>,
        cancel: &CancellationToken,
    ) -> GrounderResult<()> {
        let mut history = RoundHistory::new();
        let mut round: u32 = 1;

        loop {
            if round > MAX_ROUNDS {
                // Silent ceiling exit; warning_end/done still follow.
                tracing::warn!(rounds = MAX_ROUNDS, "round ceiling reached");
                break;
            }
            tracing::info!(round, task = %task, "round start");
            let _ = events.send(AgentEvent::Round { round }).await;

            // CAPTURE
            let img_path = self.perception.capture(round).await?;

            // INFER
            let query = prompt::build_query(task, &history.render(), &self.platform, self.format);
            let message = prompt::image_message(query, &img_path).await?;
            let response = self
                .inference
                .complete(vec![message], &self.sampling)
                .await?;
            if response.is_empty() {
                let _ = events
                    .send(AgentEvent::Error {
                        message: "Model returned empty response".into(),
                    })
                    .await;
                break;
            }
            let _ = events
                .send(AgentEvent::Response {
                    content: response.clone(),
                })
                .await;

            // EXTRACT: one step slot and one action slot per round, even
            // when either is absent.
            let (step, action) = extract_grounded_operation(&response);
            history.push(step.clone(), action);
            self.store.append(session_id, task, &response).await;

            // ANNOTATE
            let bbox_name =
                annotator::annotate_response(&response, &img_path, &self.cache_dir, round)?;

            let operation = Operation::parse(step.as_deref());
            let Operation::Grounded(operation) = operation else {
                tracing::info!(round, "no action decoded, run complete");
                break;
            };

            // EXECUTE
            let status = self.executor.execute(&operation).await?;

            if let Some(name) = &bbox_name {
                let _ = events
                    .send(AgentEvent::Image {
                        path: format!("{CACHE_ROUTE}/{name}"),
                    })
                    .await;
            }

            // DECIDE
            if status == END_STATUS || cancel.is_cancelled() {
                if bbox_name.is_some() && round > 1 {
                    // Re-emit the previous round's annotation as the final
                    // visual anchor.
                    let prev = annotator::round_annotation_name(round - 1);
                    let _ = events
                        .send(AgentEvent::Image {
                            path: format!("{CACHE_ROUTE}/{prev}"),
                        })
                        .await;
                }
                if cancel.is_cancelled() {
                    tracing::info!(round, "stop requested, run cancelled");
                    let _ = events.send(AgentEvent::Stopped).await;
                }
                break;
            }

            round += 1;
        }

        Ok(())
    }
}
