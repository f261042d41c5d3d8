//! Drives user intents through the image and video providers.
//!
//! Every intent mutates the shared [`ConversationState`] under a short-lived
//! lock and publishes what changed on a broadcast channel. The lock is never
//! held across an `.await`; overlapping intents interleave freely and the
//! last one to finish wins the write to the current image.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::conversation_state::{
    Activity, ConversationState, Draft, InFlight, Message, MessageId, PROMPT_SUGGESTIONS,
};
use crate::config::WelcomeTiming;
use crate::error::GatewayError;
use crate::gateway::{ImageService, StyleSuggestion, VideoRequest, VideoService};
use crate::payload::{DEFAULT_MIME_TYPE, strip_prefix, to_data_url};

pub const WELCOME_GREETING: &str = "Hey, welcome to the Gemini Native image generation playground!";
pub const WELCOME_FEATURES: &str =
    "You can generate images, edit them, and even animate them with Veo!";
pub const WELCOME_PROMPT_HINT: &str = "Get started with the prompts below or write your own";

pub const IMAGE_CREATED: &str = "Here's what I created:";
pub const STYLE_APPLIED: &str = "Here's the image with the style applied:";
pub const IMAGE_EDITED: &str = "Here's your edited image:";
pub const VIDEO_CREATED: &str = "Here's your animated video:";

pub const VIDEO_LOADING: &str = "Generating video from your image... This may take a minute.";
pub const INSTANT_LOADING: &str = "Creating animation for your image...";
pub const INSTANT_DEFAULT_LOADING: &str = "Creating animation with default settings...";
pub const FALLBACK_ANIMATION_PROMPT: &str = "Gentle camera zoom and subtle movement in the scene";

pub const GENERATE_APOLOGY: &str =
    "Sorry, I was unable to generate an image. Please try a different prompt.";
pub const STYLE_APOLOGY: &str =
    "Sorry, I was unable to apply that style. Please try a different one.";
pub const EDIT_APOLOGY: &str =
    "Sorry, I was unable to edit the image. Please try a different prompt.";
pub const VIDEO_APOLOGY: &str =
    "Sorry, I was unable to generate a video. Please try a different prompt.";
pub const INSTANT_APOLOGY: &str = "Sorry, I was unable to generate a video. Please try again.";

const UPDATE_CAPACITY: usize = 256;

/// Short toast-style outcome of an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// A change to the conversation, published for renderers.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Appended(Message),
    Replaced(Message),
    Removed(MessageId),
    Flags(InFlight),
    Suggestions(Vec<StyleSuggestion>),
    PromptsVisible(bool),
    Notice(Notice),
    Cleared,
}

struct Shared {
    state: Mutex<ConversationState>,
    image: Arc<dyn ImageService>,
    video: Arc<dyn VideoService>,
    updates: broadcast::Sender<Update>,
    suggestion_task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share one conversation.
#[derive(Clone)]
pub struct Conversation {
    shared: Arc<Shared>,
}

/// Holds an activity counter up until dropped, whichever way the intent ends.
struct ActivityGuard {
    conversation: Conversation,
    activity: Activity,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let flags = {
            let mut state = self.conversation.state();
            state.finish(self.activity);
            state.in_flight()
        };
        self.conversation.publish(Update::Flags(flags));
    }
}

impl Conversation {
    pub fn new(image: Arc<dyn ImageService>, video: Arc<dyn VideoService>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ConversationState::new()),
                image,
                video,
                updates,
                suggestion_task: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.shared.updates.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages().to_vec()
    }

    pub fn current_image(&self) -> Option<String> {
        self.state().current_image().map(str::to_string)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.state().last_prompt().map(str::to_string)
    }

    pub fn in_flight(&self) -> InFlight {
        self.state().in_flight()
    }

    pub fn active_suggestions(&self) -> Vec<StyleSuggestion> {
        self.state().active_suggestions()
    }

    pub fn prompts_visible(&self) -> bool {
        self.state().prompts_visible()
    }

    fn state(&self) -> MutexGuard<'_, ConversationState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: Update) {
        // No subscribers is fine.
        let _ = self.shared.updates.send(update);
    }

    fn notify(&self, notice: Notice) {
        self.publish(Update::Notice(notice));
    }

    fn append(&self, draft: Draft) -> MessageId {
        let message = self.state().push(draft).clone();
        let id = message.id;
        self.publish(Update::Appended(message));
        id
    }

    fn replace(&self, id: MessageId, content: String) {
        let replaced = self.state().replace_content(id, content).cloned();
        match replaced {
            Some(message) => self.publish(Update::Replaced(message)),
            None => debug!("Message {:?} is gone; nothing to replace", id),
        }
    }

    fn remove(&self, id: MessageId) {
        let removed = self.state().remove(id);
        if removed.is_some() {
            self.publish(Update::Removed(id));
        }
    }

    fn start(&self, activity: Activity) -> ActivityGuard {
        let flags = {
            let mut state = self.state();
            state.begin(activity);
            state.in_flight()
        };
        self.publish(Update::Flags(flags));
        ActivityGuard {
            conversation: self.clone(),
            activity,
        }
    }

    fn set_current_image(&self, image: &str) {
        self.state().set_current_image(image);
    }

    /// Collapses an empty result and a failed call into one outcome. The
    /// provider's error text only goes to the log.
    fn produced<T>(what: &str, outcome: Result<Option<T>, GatewayError>) -> Option<T> {
        match outcome {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                warn!("{} returned no result", what);
                None
            }
            Err(e) => {
                error!("{} failed: {}", what, e);
                None
            }
        }
    }

    /// Text-to-image.
    pub async fn submit_prompt(&self, prompt: &str) {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }

        self.append(Draft::user(prompt));
        let _busy = self.start(Activity::Image);

        let outcome = self.shared.image.generate(prompt).await;
        match Self::produced("Image generation", outcome) {
            Some(image) => {
                {
                    let mut state = self.state();
                    state.set_current_image(image.as_str());
                    state.set_last_prompt(prompt);
                }
                self.append(Draft::assistant(IMAGE_CREATED).with_image(image));
                self.notify(Notice::Success("Image generated successfully!".to_string()));
                self.refresh_suggestions(prompt.to_string());
            }
            None => {
                self.append(Draft::assistant(GENERATE_APOLOGY));
                self.notify(Notice::Error("Failed to generate image".to_string()));
            }
        }
    }

    /// Picks one of the sample prompts. Returns false for an unknown index.
    pub async fn select_prompt_suggestion(&self, index: usize) -> bool {
        let Some(prompt) = PROMPT_SUGGESTIONS.get(index) else {
            return false;
        };
        self.state().set_prompts_visible(false);
        self.publish(Update::PromptsVisible(false));
        self.submit_prompt(prompt).await;
        true
    }

    /// Restyles the current image. Does nothing until an image and a prompt
    /// exist.
    pub async fn apply_style(&self, style: &str) {
        let plan = self.state().plan_style(style);
        let Some(plan) = plan else {
            debug!("No current image or prompt; ignoring style {:?}", style);
            return;
        };

        self.append(Draft::user(plan.instruction.as_str()));
        let _busy = self.start(Activity::Image);

        let outcome = self
            .shared
            .image
            .edit(&plan.instruction, strip_prefix(&plan.image))
            .await;
        match Self::produced("Style application", outcome) {
            Some(image) => {
                self.set_current_image(&image);
                self.append(Draft::assistant(STYLE_APPLIED).with_image(image));
                self.notify(Notice::Success("Style applied successfully!".to_string()));
                self.refresh_suggestions(plan.suggestion_seed);
            }
            None => {
                self.append(Draft::assistant(STYLE_APOLOGY));
                self.notify(Notice::Error("Failed to apply style".to_string()));
            }
        }
    }

    /// Edits an explicit source image, which need not be the current one.
    pub async fn edit_image(&self, instruction: &str, source_image: &str) {
        self.append(Draft::user(instruction));
        let _busy = self.start(Activity::Image);

        let outcome = self
            .shared
            .image
            .edit(instruction, strip_prefix(source_image))
            .await;
        match Self::produced("Image edit", outcome) {
            Some(image) => {
                {
                    let mut state = self.state();
                    state.set_current_image(image.as_str());
                    state.set_last_prompt(instruction);
                }
                self.append(Draft::assistant(IMAGE_EDITED).with_image(image));
                self.notify(Notice::Success("Image edited successfully!".to_string()));
                self.refresh_suggestions(instruction.to_string());
            }
            None => {
                self.append(Draft::assistant(EDIT_APOLOGY));
                self.notify(Notice::Error("Failed to edit image".to_string()));
            }
        }
    }

    /// Animates `source_image` with a caller-supplied prompt.
    pub async fn generate_video(&self, prompt: &str, source_image: &str) {
        self.append(Draft::user(format!("Animate this image: {prompt}")));
        let loading = self.append(Draft::assistant(VIDEO_LOADING).with_image(source_image));
        let _busy = self.start(Activity::Video);

        let request = VideoRequest::new(
            prompt,
            to_data_url(strip_prefix(source_image), DEFAULT_MIME_TYPE),
        );
        let outcome = self.shared.video.animate(&request).await;
        self.remove(loading);
        self.finish_video(outcome, source_image, VIDEO_APOLOGY);
    }

    /// Animates `source_image` with a prompt written by the image model,
    /// or a fixed one if that fails.
    pub async fn instant_animate(&self, source_image: &str) {
        let _busy = self.start(Activity::Video);
        let loading = self.append(Draft::assistant(INSTANT_LOADING).with_image(source_image));

        let seed = self.state().animation_seed();
        let outcome = self.shared.image.suggest_animation(&seed).await;
        let prompt = match Self::produced("Animation prompt", outcome) {
            Some(prompt) => {
                self.replace(loading, format!("Creating animation: \"{prompt}\"..."));
                prompt
            }
            None => {
                self.replace(loading, INSTANT_DEFAULT_LOADING.to_string());
                FALLBACK_ANIMATION_PROMPT.to_string()
            }
        };

        let request = VideoRequest::new(
            prompt,
            to_data_url(strip_prefix(source_image), DEFAULT_MIME_TYPE),
        );
        let outcome = self.shared.video.animate(&request).await;
        self.remove(loading);
        self.finish_video(outcome, source_image, INSTANT_APOLOGY);
    }

    fn finish_video(
        &self,
        outcome: Result<Option<String>, GatewayError>,
        source_image: &str,
        apology: &str,
    ) {
        match Self::produced("Video generation", outcome) {
            Some(url) => {
                info!("Video ready at {}", url);
                self.append(
                    Draft::assistant(VIDEO_CREATED)
                        .with_image(source_image)
                        .with_video(url),
                );
                self.notify(Notice::Success("Video generated successfully!".to_string()));
            }
            None => {
                self.append(Draft::assistant(apology).with_image(source_image));
                self.notify(Notice::Error("Failed to generate video".to_string()));
            }
        }
    }

    /// Fetches fresh style suggestions in the background. A newer refresh
    /// supersedes an older one; failures are silent.
    fn refresh_suggestions(&self, seed: String) {
        let (request, flags) = {
            let mut state = self.state();
            let request = state.begin_suggestion_fetch();
            (request, state.in_flight())
        };
        self.publish(Update::Flags(flags));

        let conversation = self.clone();
        let task = tokio::spawn(async move {
            let outcome = conversation.shared.image.suggest_styles(&seed).await;
            let suggestions = Self::produced("Style suggestions", outcome);
            let settled = {
                let mut state = conversation.state();
                state
                    .finish_suggestion_fetch(request, suggestions)
                    .then(|| (state.active_suggestions(), state.in_flight()))
            };
            match settled {
                Some((suggestions, flags)) => {
                    conversation.publish(Update::Flags(flags));
                    conversation.publish(Update::Suggestions(suggestions));
                }
                None => debug!("Dropping stale style suggestions (request {})", request),
            }
        });

        let previous = self
            .shared
            .suggestion_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Waits for the most recent suggestion refresh, if any, to finish.
    pub async fn suggestions_settled(&self) {
        let task = self
            .shared
            .suggestion_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Style suggestion task failed: {}", e);
                }
            }
        }
    }

    /// Plays the scripted greeting, then reveals the sample prompts.
    pub async fn play_welcome(&self, timing: WelcomeTiming) {
        self.set_initializing(true);
        self.append(Draft::assistant(WELCOME_GREETING));

        sleep(timing.before_thinking).await;
        sleep(timing.thinking).await;
        self.set_initializing(false);
        self.append(Draft::assistant(WELCOME_FEATURES));

        sleep(timing.before_prompt_hint).await;
        self.append(Draft::assistant(WELCOME_PROMPT_HINT));

        sleep(timing.before_prompts).await;
        self.state().set_prompts_visible(true);
        self.publish(Update::PromptsVisible(true));
    }

    fn set_initializing(&self, initializing: bool) {
        let flags = {
            let mut state = self.state();
            state.set_initializing(initializing);
            state.in_flight()
        };
        self.publish(Update::Flags(flags));
    }

    /// Starts over. Operations still in flight settle against the new state.
    pub fn clear(&self) {
        self.state().clear();
        let previous = self
            .shared
            .suggestion_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.abort();
        }
        self.publish(Update::Cleared);
    }
}
