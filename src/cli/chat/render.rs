use color_print::cformat;

use super::conversation_state::{InFlight, Message, PROMPT_SUGGESTIONS, Role};
use super::session::{Notice, Update};
use crate::gateway::StyleSuggestion;
use crate::payload::strip_prefix;

/// Turns conversation updates into terminal text. Tracks the last flags it
/// saw so it only announces transitions.
#[derive(Debug, Default)]
pub struct Renderer {
    flags: InFlight,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, update: &Update) -> Option<String> {
        match update {
            Update::Appended(message) => Some(render_message(message)),
            Update::Replaced(message) => Some(cformat!("  <dim>↳</dim> {}", message.content)),
            Update::Removed(_) => None,
            Update::Flags(flags) => {
                let previous = std::mem::replace(&mut self.flags, *flags);
                if flags.is_generating() && !previous.is_generating() {
                    Some(cformat!("<dim>Thinking...</dim>"))
                } else if flags.initializing && !previous.initializing {
                    Some(cformat!("<dim>...</dim>"))
                } else {
                    None
                }
            }
            Update::Suggestions(suggestions) => Some(format!(
                "{}\n{}",
                cformat!("<dim>Style suggestions updated:</dim>"),
                render_suggestions(suggestions)
            )),
            Update::PromptsVisible(true) => Some(render_prompts()),
            Update::PromptsVisible(false) => None,
            Update::Notice(Notice::Success(text)) => Some(cformat!("<green>✔ {}</green>", text)),
            Update::Notice(Notice::Error(text)) => Some(cformat!("<red>✖ {}</red>", text)),
            Update::Cleared => Some("Conversation cleared.".to_string()),
        }
    }
}

pub fn render_message(message: &Message) -> String {
    let mut out = match message.role {
        Role::User => cformat!("<bold><cyan>you</cyan></bold> {}", message.content),
        Role::Assistant => cformat!("<bold><magenta>gemini</magenta></bold> {}", message.content),
    };
    if let Some(image) = &message.image_data {
        out.push('\n');
        out.push_str(&cformat!("  <dim>[image · {}]</dim>", describe_image(image)));
    }
    if let Some(url) = &message.video_url {
        out.push('\n');
        out.push_str(&cformat!("  <green>▶ {}</green>", url));
    }
    out
}

pub fn render_suggestions(suggestions: &[StyleSuggestion]) -> String {
    suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| cformat!("  <bold>{}.</bold> {} <dim>({})</dim>", i + 1, s.name, s.style))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_prompts() -> String {
    let mut out = cformat!("<dim>Try one of these with {}:</dim>", "/prompt <n>");
    for (i, prompt) in PROMPT_SUGGESTIONS.iter().enumerate() {
        out.push('\n');
        out.push_str(&cformat!("  <bold>{}.</bold> {}", i + 1, prompt));
    }
    out
}

/// Approximate decoded size of a base64 payload.
fn describe_image(payload: &str) -> String {
    let bytes = strip_prefix(payload).len() * 3 / 4;
    if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}
