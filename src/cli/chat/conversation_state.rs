use chrono::{DateTime, Local};

use crate::gateway::{StyleSuggestion, default_style_suggestions};

/// Sample prompts offered once the welcome script has finished.
pub const PROMPT_SUGGESTIONS: [&str; 6] = [
    "Magical floating islands with waterfalls and rainbows",
    "Futuristic cyberpunk city at night with neon lights",
    "Majestic mountains with a lake reflecting the sunset",
    "Cute cat astronaut floating in space",
    "Cozy coffee shop with rain falling outside the window",
    "Tropical beach at sunset with palm trees",
];

/// Stable handle of a message, independent of its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub image_data: Option<String>,
    pub video_url: Option<String>,
}

/// A message before it has been given an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub role: Role,
    pub content: String,
    pub image_data: Option<String>,
    pub video_url: Option<String>,
}

impl Draft {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_data: None,
            video_url: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image_data = Some(image.into());
        self
    }

    pub fn with_video(mut self, url: impl Into<String>) -> Self {
        self.video_url = Some(url.into());
        self
    }
}

/// Operation kinds that gate their own affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Image,
    Video,
}

/// In-flight counters. A flag reads true while its count is non-zero, so
/// overlapping operations of one kind never clear each other's flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InFlight {
    pub generating: usize,
    pub generating_video: usize,
    pub fetching_suggestions: bool,
    pub initializing: bool,
}

impl InFlight {
    pub fn is_generating(&self) -> bool {
        self.generating > 0
    }

    pub fn is_generating_video(&self) -> bool {
        self.generating_video > 0
    }

    /// True when the input affordance should be disabled.
    pub fn is_busy(&self) -> bool {
        self.is_generating() || self.is_generating_video() || self.initializing
    }
}

/// An image edit the caller should issue, with the suggestion seed to use if
/// it succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPlan {
    pub instruction: String,
    pub image: String,
    pub suggestion_seed: String,
}

pub struct ConversationState {
    messages: Vec<Message>,
    current_image: Option<String>,
    last_prompt: Option<String>,
    in_flight: InFlight,
    style_suggestions: Option<Vec<StyleSuggestion>>,
    suggestion_request: u64,
    prompts_visible: bool,
    next_id: u64,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            current_image: None,
            last_prompt: None,
            in_flight: InFlight::default(),
            style_suggestions: None,
            suggestion_request: 0,
            prompts_visible: false,
            next_id: 1,
        }
    }

    pub fn push(&mut self, draft: Draft) -> &Message {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.messages.push(Message {
            id,
            role: draft.role,
            content: draft.content,
            timestamp: Local::now(),
            image_data: draft.image_data,
            video_url: draft.video_url,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Rewrites the content of `id` in place. The slot and id are kept.
    pub fn replace_content(&mut self, id: MessageId, content: impl Into<String>) -> Option<&Message> {
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        message.content = content.into();
        Some(message)
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn current_image(&self) -> Option<&str> {
        self.current_image.as_deref()
    }

    pub fn set_current_image(&mut self, image: impl Into<String>) {
        self.current_image = Some(image.into());
    }

    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn set_last_prompt(&mut self, prompt: impl Into<String>) {
        self.last_prompt = Some(prompt.into());
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight
    }

    pub fn begin(&mut self, activity: Activity) {
        match activity {
            Activity::Image => self.in_flight.generating += 1,
            Activity::Video => self.in_flight.generating_video += 1,
        }
    }

    pub fn finish(&mut self, activity: Activity) {
        let counter = match activity {
            Activity::Image => &mut self.in_flight.generating,
            Activity::Video => &mut self.in_flight.generating_video,
        };
        *counter = counter.saturating_sub(1);
    }

    pub fn set_initializing(&mut self, initializing: bool) {
        self.in_flight.initializing = initializing;
    }

    pub fn prompts_visible(&self) -> bool {
        self.prompts_visible
    }

    pub fn set_prompts_visible(&mut self, visible: bool) {
        self.prompts_visible = visible;
    }

    /// The suggestion list currently on offer: the fetched one if any,
    /// otherwise the defaults. The two are never merged.
    pub fn active_suggestions(&self) -> Vec<StyleSuggestion> {
        self.style_suggestions
            .clone()
            .unwrap_or_else(default_style_suggestions)
    }

    /// Starts a suggestion fetch and returns its request number. Any fetch
    /// still running becomes stale.
    pub fn begin_suggestion_fetch(&mut self) -> u64 {
        self.suggestion_request += 1;
        self.in_flight.fetching_suggestions = true;
        self.suggestion_request
    }

    /// Completes fetch `request`. Returns false (and changes nothing) when a
    /// newer fetch has started since. A `None` result drops any fetched list,
    /// so the defaults are on offer again.
    pub fn finish_suggestion_fetch(
        &mut self,
        request: u64,
        suggestions: Option<Vec<StyleSuggestion>>,
    ) -> bool {
        if request != self.suggestion_request {
            return false;
        }
        self.in_flight.fetching_suggestions = false;
        self.style_suggestions = suggestions;
        true
    }

    /// Plans a style application against the current image. `None` when no
    /// image or no prompt is available yet.
    pub fn plan_style(&self, style: &str) -> Option<EditPlan> {
        let image = self.current_image.as_deref()?;
        let last_prompt = self.last_prompt.as_deref()?;
        Some(EditPlan {
            instruction: style.to_string(),
            image: image.to_string(),
            suggestion_seed: format!("{} with {}", last_prompt, style.to_lowercase()),
        })
    }

    /// Seed for an animation prompt: the last prompt or a placeholder.
    pub fn animation_seed(&self) -> String {
        self.last_prompt
            .clone()
            .unwrap_or_else(|| "an image".to_string())
    }

    /// Drops messages, images, prompts and fetched suggestions. In-flight
    /// counters are left alone so running operations still settle them.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.current_image = None;
        self.last_prompt = None;
        self.style_suggestions = None;
        self.suggestion_request += 1;
        self.in_flight.fetching_suggestions = false;
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let mut state = ConversationState::new();
        let a = state.push(Draft::user("one")).id;
        let b = state.push(Draft::assistant("two")).id;
        assert!(a < b);
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[0].role, Role::User);
        assert_eq!(state.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn replace_keeps_slot_and_identity() {
        let mut state = ConversationState::new();
        state.push(Draft::user("before"));
        let loading = state
            .push(Draft::assistant("Creating animation for your image...").with_image("IMG"))
            .id;
        state.push(Draft::user("after"));

        let replaced = state.replace_content(loading, "Creating animation: \"waves\"...").unwrap();
        assert_eq!(replaced.id, loading);
        assert_eq!(replaced.image_data.as_deref(), Some("IMG"));
        assert_eq!(state.messages()[1].id, loading);
        assert_eq!(state.messages()[1].content, "Creating animation: \"waves\"...");
    }

    #[test]
    fn remove_matches_identity_not_content() {
        let mut state = ConversationState::new();
        let first = state.push(Draft::assistant("Working...")).id;
        let second = state.push(Draft::assistant("Working...")).id;

        let removed = state.remove(second).unwrap();
        assert_eq!(removed.id, second);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].id, first);
        assert!(state.remove(second).is_none());
        assert!(state.replace_content(second, "x").is_none());
    }

    #[test]
    fn counters_do_not_clear_each_other() {
        let mut state = ConversationState::new();
        state.begin(Activity::Video);
        state.begin(Activity::Video);
        state.finish(Activity::Video);
        assert!(state.in_flight().is_generating_video());
        state.finish(Activity::Video);
        assert!(!state.in_flight().is_generating_video());
        state.finish(Activity::Video);
        assert_eq!(state.in_flight().generating_video, 0);
    }

    #[test]
    fn busy_tracks_every_blocking_flag() {
        let mut state = ConversationState::new();
        assert!(!state.in_flight().is_busy());
        state.set_initializing(true);
        assert!(state.in_flight().is_busy());
        state.set_initializing(false);
        state.begin(Activity::Image);
        assert!(state.in_flight().is_busy());
    }

    #[test]
    fn dynamic_suggestions_replace_defaults() {
        let mut state = ConversationState::new();
        assert_eq!(state.active_suggestions(), default_style_suggestions());

        let request = state.begin_suggestion_fetch();
        assert!(state.in_flight().fetching_suggestions);
        let fetched = vec![StyleSuggestion::new("Noir", "Make it noir")];
        assert!(state.finish_suggestion_fetch(request, Some(fetched.clone())));
        assert_eq!(state.active_suggestions(), fetched);
        assert!(!state.in_flight().fetching_suggestions);
    }

    #[test]
    fn failed_fetch_falls_back_to_defaults() {
        let mut state = ConversationState::new();
        let fetched = vec![StyleSuggestion::new("Noir", "Make it noir")];
        let first = state.begin_suggestion_fetch();
        state.finish_suggestion_fetch(first, Some(fetched.clone()));
        assert_eq!(state.active_suggestions(), fetched);

        let second = state.begin_suggestion_fetch();
        assert!(state.finish_suggestion_fetch(second, None));
        assert_eq!(state.active_suggestions(), default_style_suggestions());
        assert!(!state.in_flight().fetching_suggestions);
    }

    #[test]
    fn stale_fetch_is_discarded() {
        let mut state = ConversationState::new();
        let old = state.begin_suggestion_fetch();
        let new = state.begin_suggestion_fetch();

        assert!(!state.finish_suggestion_fetch(old, Some(vec![StyleSuggestion::new("Old", "old")])));
        assert!(state.in_flight().fetching_suggestions);
        assert_eq!(state.active_suggestions(), default_style_suggestions());

        assert!(state.finish_suggestion_fetch(new, Some(vec![StyleSuggestion::new("New", "new")])));
        assert_eq!(state.active_suggestions()[0].name, "New");
    }

    #[test]
    fn style_plan_needs_image_and_prompt() {
        let mut state = ConversationState::new();
        assert!(state.plan_style("Watercolor").is_none());
        state.set_current_image("IMG");
        assert!(state.plan_style("Watercolor").is_none());
        state.set_last_prompt("a red balloon");

        let plan = state.plan_style("Add Neon Glow").unwrap();
        assert_eq!(plan.instruction, "Add Neon Glow");
        assert_eq!(plan.image, "IMG");
        assert_eq!(plan.suggestion_seed, "a red balloon with add neon glow");
    }

    #[test]
    fn animation_seed_falls_back_to_placeholder() {
        let mut state = ConversationState::new();
        assert_eq!(state.animation_seed(), "an image");
        state.set_last_prompt("a lighthouse");
        assert_eq!(state.animation_seed(), "a lighthouse");
    }

    #[test]
    fn clear_resets_content_but_not_counters() {
        let mut state = ConversationState::new();
        state.push(Draft::user("hello"));
        state.set_current_image("IMG");
        state.set_last_prompt("hello");
        state.begin(Activity::Image);
        let request = state.begin_suggestion_fetch();

        state.clear();
        assert!(state.messages().is_empty());
        assert!(state.current_image().is_none());
        assert!(state.last_prompt().is_none());
        assert!(state.in_flight().is_generating());
        assert!(!state.finish_suggestion_fetch(request, Some(vec![])));
        assert!(!state.in_flight().fetching_suggestions);
    }

    #[test]
    fn prompt_suggestions_are_fixed() {
        assert_eq!(PROMPT_SUGGESTIONS.len(), 6);
        assert_eq!(PROMPT_SUGGESTIONS[3], "Cute cat astronaut floating in space");
    }
}
