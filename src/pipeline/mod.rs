//! Content pipeline: generation, editing, scheduling and reconciliation of
//! content batches.
//!
//! Every generate/schedule call ends in exactly one notification. Errors are
//! also returned so callers can tell what happened, but nothing is left for
//! the caller to report.
use crate::clipboard::Clipboard;
use crate::config::Config;
use crate::gateway::{AgentGateway, GenerationPayload, SchedulingPayload};
use crate::history::HistoryStore;
use crate::kv::KvStore;
use crate::model::{
    join_platforms, BatchId, BatchStatus, ContentBatch, Platform, PlatformSet, PostingOutcome,
    Scripts, TrendInsights,
};
use crate::notify::NotificationQueue;
use crate::settings::Settings;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{info, instrument, warn};

pub mod instruction;

const GENERATED: &str = "Content generated successfully! Review and edit your scripts below.";
const SCHEDULED: &str = "Content scheduled/posted successfully!";
const GENERATION_FAILED: &str = "Failed to generate content.";
const SCHEDULING_FAILED: &str = "Failed to schedule content.";
const GENERATION_UNEXPECTED: &str = "An unexpected error occurred during content generation.";
const SCHEDULING_UNEXPECTED: &str = "An unexpected error occurred during scheduling.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Generation,
    Scheduling,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Generation => f.write_str("Content generation"),
            Operation::Scheduling => f.write_str("Scheduling"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Please enter a topic to generate content.")]
    EmptyTopic,
    #[error("Please select at least one platform.")]
    NoPlatforms,
    #[error("Please select at least one platform for posting.")]
    NoPostingPlatforms,
    #[error("Generate content before scheduling.")]
    NoActiveBatch,
    #[error("{platform} is not part of content batch {id}.")]
    PlatformNotInBatch { id: BatchId, platform: Platform },
    #[error("Content batch {0} was not found.")]
    UnknownBatch(BatchId),
    #[error("Content batch {0} has been posted and can no longer be edited.")]
    Immutable(BatchId),
    #[error("{0} is already in progress.")]
    Busy(Operation),
    #[error("{0}")]
    Gateway(String),
}

impl PipelineError {
    /// Rejected locally, before any agent call.
    pub fn is_validation(&self) -> bool {
        !matches!(self, PipelineError::Gateway(_))
    }
}

/// Fixed parameters of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub generation_agent_id: String,
    pub scheduling_agent_id: String,
    pub fallback_voice: String,
}

impl PipelineOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            generation_agent_id: cfg.agents.generation_agent_id.clone(),
            scheduling_agent_id: cfg.agents.scheduling_agent_id.clone(),
            fallback_voice: cfg.content.fallback_voice.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub batch_id: BatchId,
    pub trend_insights: Option<TrendInsights>,
    pub scripts: Scripts,
    /// Requested platforms that came back with script content.
    pub platforms_for_posting: PlatformSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingOutcome {
    pub batch_id: BatchId,
    /// Outcomes as reported by the agent for this attempt.
    pub posting_outcomes: Vec<PostingOutcome>,
    pub posting_summary: String,
    /// Status of the stored batch after reconciliation.
    pub status: Option<BatchStatus>,
    /// False when the batch vanished while the agent was working.
    pub reconciled: bool,
}

/// Ephemeral operator selection; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub topic: String,
    pub generation_platforms: PlatformSet,
    pub posting_platforms: PlatformSet,
    /// Batch produced by the most recent successful generation.
    pub active_batch: Option<BatchId>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Application state for one operator: history, settings, notifications,
/// the current selection and the in-flight guards.
pub struct PipelineController {
    gateway: Arc<dyn AgentGateway>,
    history: HistoryStore,
    settings: Settings,
    notifications: NotificationQueue,
    options: PipelineOptions,
    selection: Mutex<SelectionState>,
    generating: AtomicBool,
    scheduling: AtomicBool,
}

impl PipelineController {
    pub fn new(
        gateway: Arc<dyn AgentGateway>,
        history: HistoryStore,
        settings: Settings,
        notifications: NotificationQueue,
        options: PipelineOptions,
    ) -> Self {
        let defaults = settings.default_platforms();
        let selection = SelectionState {
            topic: String::new(),
            generation_platforms: defaults.clone(),
            posting_platforms: defaults,
            active_batch: None,
        };
        Self {
            gateway,
            history,
            settings,
            notifications,
            options,
            selection: Mutex::new(selection),
            generating: AtomicBool::new(false),
            scheduling: AtomicBool::new(false),
        }
    }

    /// Load history and settings from `kv` and wire everything up.
    pub async fn open(cfg: &Config, kv: Arc<dyn KvStore>, gateway: Arc<dyn AgentGateway>) -> Self {
        let history = HistoryStore::load(kv.clone()).await;
        let settings = Settings::load(kv).await;
        let notifications = NotificationQueue::new(cfg.app.notification_ttl());
        Self::new(
            gateway,
            history,
            settings,
            notifications,
            PipelineOptions::from_config(cfg),
        )
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    pub fn is_scheduling(&self) -> bool {
        self.scheduling.load(Ordering::Acquire)
    }

    fn selection_mut(&self) -> MutexGuard<'_, SelectionState> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn selection(&self) -> SelectionState {
        self.selection_mut().clone()
    }

    pub fn set_topic(&self, topic: &str) {
        self.selection_mut().topic = topic.to_string();
    }

    /// Returns whether the platform is selected afterwards.
    pub fn toggle_generation_platform(&self, platform: Platform) -> bool {
        toggle(&mut self.selection_mut().generation_platforms, platform)
    }

    /// Returns whether the platform is selected afterwards.
    pub fn toggle_posting_platform(&self, platform: Platform) -> bool {
        toggle(&mut self.selection_mut().posting_platforms, platform)
    }

    fn begin<'a>(&self, flag: &'a AtomicBool, op: Operation) -> Result<InFlight<'a>, PipelineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| InFlight(flag))
            .map_err(|_| PipelineError::Busy(op))
    }

    /// Generate using the current selection.
    pub async fn generate_selected(&self) -> Result<GenerationOutcome, PipelineError> {
        let selection = self.selection();
        self.generate(&selection.topic, &selection.generation_platforms, None)
            .await
    }

    /// Research trends and draft scripts for `topic`, then store the result
    /// as a new draft at the head of the history. `voice` falls back to the
    /// saved brand voice, then to the configured default.
    #[instrument(skip_all, fields(topic = %topic.trim()))]
    pub async fn generate(
        &self,
        topic: &str,
        platforms: &PlatformSet,
        voice: Option<&str>,
    ) -> Result<GenerationOutcome, PipelineError> {
        let result = self.run_generation(topic, platforms, voice).await;
        match &result {
            Ok(_) => self.notifications.success(GENERATED),
            Err(err) => self.notifications.error(err.to_string()),
        };
        result
    }

    async fn run_generation(
        &self,
        topic: &str,
        platforms: &PlatformSet,
        voice: Option<&str>,
    ) -> Result<GenerationOutcome, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::EmptyTopic);
        }
        if platforms.is_empty() {
            return Err(PipelineError::NoPlatforms);
        }
        let _in_flight = self.begin(&self.generating, Operation::Generation)?;

        let voice = match voice.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v.to_string(),
            None => self.settings.effective_voice(&self.options.fallback_voice),
        };
        let text = instruction::generation(topic, platforms, &voice);
        info!(platforms = %join_platforms(platforms), "requesting content generation");

        let reply = match self
            .gateway
            .invoke(&text, &self.options.generation_agent_id)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(?err, "generation agent call failed");
                return Err(PipelineError::Gateway(GENERATION_UNEXPECTED.into()));
            }
        };
        if !reply.success {
            let message = reply.failure_message().unwrap_or(GENERATION_FAILED).to_string();
            warn!(%message, "generation agent reported failure");
            return Err(PipelineError::Gateway(message));
        }

        let payload = GenerationPayload::from_result(reply.result());
        let batch = ContentBatch::new(
            topic,
            platforms.clone(),
            payload.trend_summary.present(),
            payload.scripts.present().unwrap_or_default(),
        );
        let outcome = GenerationOutcome {
            batch_id: batch.id().clone(),
            trend_insights: batch.trend_insights().cloned(),
            scripts: batch.scripts().clone(),
            platforms_for_posting: batch.eligible_platforms(),
        };
        self.history.append(batch).await;

        {
            let mut selection = self.selection_mut();
            selection.topic = topic.to_string();
            selection.posting_platforms = outcome.platforms_for_posting.clone();
            selection.active_batch = Some(outcome.batch_id.clone());
        }
        info!(
            batch_id = %outcome.batch_id,
            scripts = outcome.scripts.len(),
            eligible = %join_platforms(&outcome.platforms_for_posting),
            "content generated"
        );
        Ok(outcome)
    }

    /// Schedule the active batch for the selected posting platforms.
    pub async fn schedule_selected(&self) -> Result<SchedulingOutcome, PipelineError> {
        let selection = self.selection();
        let Some(batch_id) = selection.active_batch else {
            let err = PipelineError::NoActiveBatch;
            self.notifications.error(err.to_string());
            return Err(err);
        };
        self.schedule(&batch_id, &selection.posting_platforms).await
    }

    /// Hand the batch's current scripts to the scheduling agent and record
    /// the outcome on that same batch.
    #[instrument(skip_all, fields(batch_id = %batch_id))]
    pub async fn schedule(
        &self,
        batch_id: &BatchId,
        platforms: &PlatformSet,
    ) -> Result<SchedulingOutcome, PipelineError> {
        let result = self.run_scheduling(batch_id, platforms).await;
        match &result {
            Ok(outcome) if outcome.posting_summary.trim().is_empty() => {
                self.notifications.success(SCHEDULED)
            }
            Ok(outcome) => self.notifications.success(outcome.posting_summary.clone()),
            Err(err) => self.notifications.error(err.to_string()),
        };
        result
    }

    async fn run_scheduling(
        &self,
        batch_id: &BatchId,
        platforms: &PlatformSet,
    ) -> Result<SchedulingOutcome, PipelineError> {
        if platforms.is_empty() {
            return Err(PipelineError::NoPostingPlatforms);
        }
        // Held from before the snapshot until the reply is recorded; edits are rejected meanwhile.
        let _in_flight = self.begin(&self.scheduling, Operation::Scheduling)?;
        let batch = self
            .history
            .get(batch_id)
            .await
            .ok_or_else(|| PipelineError::UnknownBatch(batch_id.clone()))?;
        if let Some(platform) = platforms.iter().find(|p| !batch.platforms().contains(p)) {
            return Err(PipelineError::PlatformNotInBatch {
                id: batch_id.clone(),
                platform: *platform,
            });
        }

        let text = instruction::scheduling(batch.scripts(), platforms);
        info!(platforms = %join_platforms(platforms), "requesting scheduling");

        let reply = match self
            .gateway
            .invoke(&text, &self.options.scheduling_agent_id)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(?err, "scheduling agent call failed");
                return Err(PipelineError::Gateway(SCHEDULING_UNEXPECTED.into()));
            }
        };
        if !reply.success {
            let message = reply.failure_message().unwrap_or(SCHEDULING_FAILED).to_string();
            warn!(%message, "scheduling agent reported failure");
            return Err(PipelineError::Gateway(message));
        }

        let payload = SchedulingPayload::from_result(reply.result());
        let posting_outcomes = payload.posting_results.present().unwrap_or_default();
        let posting_summary = payload.summary.present().unwrap_or_default();

        let updated = self
            .history
            .update_by_id(batch_id, |entry| {
                entry.record_posting(posting_outcomes.clone(), posting_summary.clone());
                true
            })
            .await;
        let status = updated.as_ref().map(ContentBatch::status);
        match status {
            Some(status) => info!(status = status.as_str(), outcomes = posting_outcomes.len(), "batch reconciled"),
            None => warn!("scheduling result has no stored batch to update"),
        }

        Ok(SchedulingOutcome {
            batch_id: batch_id.clone(),
            posting_outcomes,
            posting_summary,
            status,
            reconciled: status.is_some(),
        })
    }

    /// Replace one script's content. Re-applying the same content changes
    /// nothing; posted batches reject edits, and so does any edit while a
    /// scheduling call is in flight.
    #[instrument(skip_all, fields(batch_id = %batch_id, platform = %platform))]
    pub async fn edit_script(
        &self,
        batch_id: &BatchId,
        platform: Platform,
        content: &str,
    ) -> Result<ContentBatch, PipelineError> {
        let mut rejection = None;
        let updated = self
            .history
            .update_by_id(batch_id, |entry| {
                // Checked under the history lock, which scheduling needs for its snapshot.
                if self.is_scheduling() {
                    rejection = Some(PipelineError::Busy(Operation::Scheduling));
                    return false;
                }
                if entry.status() == BatchStatus::Posted {
                    rejection = Some(PipelineError::Immutable(batch_id.clone()));
                    return false;
                }
                if !entry.platforms().contains(&platform) {
                    rejection = Some(PipelineError::PlatformNotInBatch {
                        id: batch_id.clone(),
                        platform,
                    });
                    return false;
                }
                entry.set_script_content(platform, content)
            })
            .await;

        let result = match (updated, rejection) {
            (_, Some(err)) => Err(err),
            (Some(entry), None) => Ok(entry),
            (None, None) => Err(PipelineError::UnknownBatch(batch_id.clone())),
        };
        if let Err(err) = &result {
            self.notifications.error(err.to_string());
        }
        result
    }

    /// Copy one script's content through the clipboard port.
    pub async fn copy_script(
        &self,
        batch_id: &BatchId,
        platform: Platform,
        clipboard: &dyn Clipboard,
    ) -> Result<bool, PipelineError> {
        let batch = self
            .history
            .get(batch_id)
            .await
            .ok_or_else(|| PipelineError::UnknownBatch(batch_id.clone()))?;
        if !batch.platforms().contains(&platform) {
            return Err(PipelineError::PlatformNotInBatch {
                id: batch_id.clone(),
                platform,
            });
        }
        Ok(clipboard.copy(batch.scripts().content(platform)))
    }

    /// Operator delete. Unknown ids are ignored.
    pub async fn delete(&self, batch_id: &BatchId) -> bool {
        let removed = self.history.remove_by_id(batch_id).await;
        if removed {
            let mut selection = self.selection_mut();
            if selection.active_batch.as_ref() == Some(batch_id) {
                selection.active_batch = None;
            }
            info!(batch_id = %batch_id, "batch deleted");
        }
        removed
    }
}

fn toggle(set: &mut PlatformSet, platform: Platform) -> bool {
    if set.remove(&platform) {
        false
    } else {
        set.insert(platform);
        true
    }
}
