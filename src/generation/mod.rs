//! Generation orchestration.
//!
//! [`Session`] is the single context shared by every handler: pending images,
//! the live-edited prompt text, the addendum, the last output and the
//! `Idle`/`Busy` state. [`Orchestrator`] drives one generation at a time
//! through it:
//!
//! ```text
//! Idle --begin_generation--> Busy --finish_generation--> Idle
//! ```
//!
//! `begin_generation` refuses to start while `Busy`, so an overlapping
//! request (a double click, a second shell command) is ignored rather than
//! racing the first. A generation whose future is dropped before the model
//! answers, e.g. under a timeout, also returns the session to `Idle`.

mod fence;

pub use fence::strip_code_fence;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::IntakeConfig;
use crate::cue::{SoundCue, play_best_effort};
use crate::gemini::{VisionClient, is_auth_failure};
use crate::intake::{ImageIntake, IncomingFile, IntakeReport, PageRasterizer, PendingImage};
use crate::prompts::PromptTemplate;
use crate::settings::Settings;

/// Heading placed before the free-text addendum in the prompt.
pub const ADDENDUM_HEADING: &str = "【追加の指示】";

/// Prefix of the output text when a generation fails.
pub const ERROR_OUTPUT_PREFIX: &str = "An error occurred: ";

/// Whether a generation is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationState {
    /// Ready to start.
    #[default]
    Idle,
    /// Waiting on the model.
    Busy,
}

/// Result of a generate or regenerate action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Another generation is in flight; this one was ignored.
    AlreadyRunning,
    /// No API key configured; the caller should open the settings.
    NeedsSettings,
    /// Nothing pending to send.
    NoImages,
    /// No prompt template to use.
    NoTemplate,
    /// The model answered; `text` is the fence-stripped output.
    Completed {
        /// Output text.
        text: String,
    },
    /// The request failed; the output shows the error.
    Failed {
        /// Error message.
        message: String,
        /// The failure looks like a bad API key.
        auth_hint: bool,
    },
}

/// Everything a started generation needs, detached from the session.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    /// Full prompt text, addendum included.
    pub prompt_text: String,
    /// Snapshot of the pending images in intake order.
    pub images: Vec<PendingImage>,
}

/// Compose the prompt sent to the model.
pub fn compose_prompt(display_prompt: &str, addendum: &str) -> String {
    let addendum = addendum.trim();
    if addendum.is_empty() {
        display_prompt.to_owned()
    } else {
        format!("{display_prompt}\n\n{ADDENDUM_HEADING}\n{addendum}")
    }
}

/// Session context.
#[derive(Debug, Clone, Default)]
pub struct Session {
    intake: ImageIntake,
    display_prompt: Option<String>,
    addendum: String,
    output: String,
    copy_available: bool,
    has_generated: bool,
    state: GenerationState,
}

impl Session {
    /// Start a session showing `template` (if any) as the prompt.
    pub fn new(config: &IntakeConfig, template: Option<&PromptTemplate>) -> Self {
        Self {
            intake: ImageIntake::new(config),
            display_prompt: template.map(|t| t.content.clone()),
            ..Self::default()
        }
    }

    /// Show a different template; discards unsent edits to the display copy.
    pub fn set_template(&mut self, template: Option<&PromptTemplate>) {
        self.display_prompt = template.map(|t| t.content.clone());
    }

    /// Replace the live-edited display copy of the prompt.
    pub fn edit_display_prompt(&mut self, text: &str) {
        self.display_prompt = Some(text.to_owned());
    }

    /// The prompt text that will be sent, before the addendum.
    pub fn display_prompt(&self) -> Option<&str> {
        self.display_prompt.as_deref()
    }

    /// Set the free-text addendum.
    pub fn set_addendum(&mut self, text: &str) {
        self.addendum = text.to_owned();
    }

    /// Current addendum.
    pub fn addendum(&self) -> &str {
        &self.addendum
    }

    /// Last output text (model output or error text).
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Whether the output is a successful result worth copying.
    pub fn copy_available(&self) -> bool {
        self.copy_available
    }

    /// Whether the last generation completed successfully.
    pub fn has_generated(&self) -> bool {
        self.has_generated
    }

    /// Current state.
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Pending images in intake order.
    pub fn images(&self) -> &[PendingImage] {
        self.intake.images()
    }

    /// Remove one pending image.
    pub fn remove_image(&mut self, id: &str) -> bool {
        self.intake.remove(id)
    }

    /// Generate is possible: API key set and at least one image pending.
    pub fn can_generate(&self, settings: &Settings) -> bool {
        settings.has_api_key() && !self.intake.is_empty()
    }

    /// Discard images, output and addendum if the previous generation
    /// completed. Returns whether anything was reset.
    pub fn reset_if_generated(&mut self) -> bool {
        if !self.has_generated {
            return false;
        }
        self.intake.clear();
        self.output.clear();
        self.addendum.clear();
        self.copy_available = false;
        self.has_generated = false;
        debug!("fresh batch: cleared previous images and output");
        true
    }

    /// Check the entry guards and move to `Busy`.
    ///
    /// On refusal nothing changes and the reason is returned.
    pub fn begin_generation(
        &mut self,
        settings: &Settings,
    ) -> std::result::Result<GenerationTicket, GenerateOutcome> {
        if self.state == GenerationState::Busy {
            return Err(GenerateOutcome::AlreadyRunning);
        }
        if !settings.has_api_key() {
            return Err(GenerateOutcome::NeedsSettings);
        }
        if self.intake.is_empty() {
            return Err(GenerateOutcome::NoImages);
        }
        let Some(display_prompt) = self.display_prompt.as_deref() else {
            return Err(GenerateOutcome::NoTemplate);
        };

        let ticket = GenerationTicket {
            prompt_text: compose_prompt(display_prompt, &self.addendum),
            images: self.intake.images().to_vec(),
        };
        self.state = GenerationState::Busy;
        self.output.clear();
        self.copy_available = false;
        Ok(ticket)
    }

    /// Record the model result and return to `Idle`.
    pub fn finish_generation(
        &mut self,
        result: crate::error::Result<String>,
    ) -> GenerateOutcome {
        self.state = GenerationState::Idle;
        match result {
            Ok(raw) => {
                let text = strip_code_fence(&raw);
                self.output = text.clone();
                self.copy_available = true;
                self.has_generated = true;
                GenerateOutcome::Completed { text }
            }
            Err(err) => {
                let message = err.message();
                let auth_hint = is_auth_failure(&err);
                self.output = format!("{ERROR_OUTPUT_PREFIX}{message}");
                GenerateOutcome::Failed { message, auth_hint }
            }
        }
    }
}

/// Returns the session to `Idle` when a started generation is abandoned,
/// e.g. its future is dropped by a timeout before the model answers.
struct BusyGuard<'a> {
    session: &'a mut Session,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.session.state == GenerationState::Busy {
            warn!("generation abandoned before completion");
            self.session.state = GenerationState::Idle;
        }
    }
}

/// Runs intake and generation against a [`Session`].
pub struct Orchestrator {
    client: Arc<dyn VisionClient>,
    rasterizer: Arc<dyn PageRasterizer>,
    cue: Arc<dyn SoundCue>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Wire the collaborators.
    pub fn new(
        client: Arc<dyn VisionClient>,
        rasterizer: Arc<dyn PageRasterizer>,
        cue: Arc<dyn SoundCue>,
    ) -> Self {
        Self {
            client,
            rasterizer,
            cue,
        }
    }

    /// Accept a batch of files, starting a fresh batch if the previous
    /// generation completed.
    pub async fn accept_files(
        &self,
        session: &mut Session,
        files: Vec<IncomingFile>,
    ) -> IntakeReport {
        if files.is_empty() {
            return IntakeReport::default();
        }
        session.reset_if_generated();
        session.intake.ingest(files, self.rasterizer.as_ref()).await
    }

    /// Run one generation with the current addendum.
    pub async fn generate(&self, session: &mut Session, settings: &Settings) -> GenerateOutcome {
        let ticket = match session.begin_generation(settings) {
            Ok(ticket) => ticket,
            Err(outcome) => {
                debug!(?outcome, "generation not started");
                return outcome;
            }
        };

        let guard = BusyGuard { session };
        let result = self
            .client
            .generate(settings, &ticket.prompt_text, &ticket.images)
            .await;
        let outcome = guard.session.finish_generation(result);
        drop(guard);

        match &outcome {
            GenerateOutcome::Completed { text } => {
                info!(chars = text.chars().count(), "generation completed");
                if settings.sound_enabled {
                    let cue = Arc::clone(&self.cue);
                    if let Err(e) =
                        tokio::task::spawn_blocking(move || play_best_effort(cue.as_ref())).await
                    {
                        warn!("sound task failed: {e}");
                    }
                }
            }
            GenerateOutcome::Failed { message, auth_hint } => {
                warn!(auth_hint, "generation failed: {message}");
            }
            _ => {}
        }
        outcome
    }

    /// Run again with the same images and the current addendum.
    pub async fn regenerate(&self, session: &mut Session, settings: &Settings) -> GenerateOutcome {
        self.generate(session, settings).await
    }
}
