use rustyline::{Config, Editor, Result};

/// The REPL prompt. Shows a marker once there is an image to restyle or animate.
pub fn generate_prompt(has_image: bool) -> String {
    if has_image { "[image] > ".to_string() } else { "> ".to_string() }
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(false)
        .completion_type(rustyline::CompletionType::List)
        .build();
    Editor::with_config(config)
}
