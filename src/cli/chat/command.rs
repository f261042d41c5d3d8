use std::path::PathBuf;

use eyre::{Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleChoice {
    /// Zero-based index into the active suggestion list.
    Index(usize),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Style(StyleChoice),
    Styles,
    Edit {
        image: Option<PathBuf>,
        instruction: String,
    },
    Animate {
        image: Option<PathBuf>,
        prompt: String,
    },
    Instant {
        image: Option<PathBuf>,
    },
    Prompts,
    /// Zero-based index into the sample prompts.
    SelectPrompt(usize),
    Save(Option<PathBuf>),
    Clear,
    Help,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return Ok(Command::Prompt(input.to_string()));
        }

        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };

        let command = match name {
            "/style" => {
                if rest.is_empty() {
                    bail!("Usage: /style <number|instruction>");
                }
                match rest.parse::<usize>() {
                    Ok(0) => bail!("Style numbers start at 1"),
                    Ok(n) => Command::Style(StyleChoice::Index(n - 1)),
                    Err(_) => Command::Style(StyleChoice::Text(rest.to_string())),
                }
            }
            "/styles" => Command::Styles,
            "/edit" => {
                let (image, instruction) = split_source(rest);
                if instruction.is_empty() {
                    bail!("Usage: /edit [@image-file] <instruction>");
                }
                Command::Edit {
                    image,
                    instruction: instruction.to_string(),
                }
            }
            "/animate" => {
                let (image, prompt) = split_source(rest);
                if prompt.is_empty() {
                    bail!("Usage: /animate [@image-file] <prompt>");
                }
                Command::Animate {
                    image,
                    prompt: prompt.to_string(),
                }
            }
            "/instant" => {
                let (image, extra) = split_source(rest);
                if !extra.is_empty() {
                    bail!("Usage: /instant [@image-file]");
                }
                Command::Instant { image }
            }
            "/prompts" => Command::Prompts,
            "/prompt" => match rest.parse::<usize>() {
                Ok(n) if n > 0 => Command::SelectPrompt(n - 1),
                _ => bail!("Usage: /prompt <number>"),
            },
            "/save" => Command::Save((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "/clear" => Command::Clear,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => bail!("Unknown command: {}. Type /help for a list of commands.", name),
        };

        Ok(command)
    }
}

/// Splits an optional leading `@path` token off the arguments.
fn split_source(rest: &str) -> (Option<PathBuf>, &str) {
    let Some(stripped) = rest.strip_prefix('@') else {
        return (None, rest);
    };
    match stripped.split_once(char::is_whitespace) {
        Some((path, remainder)) => (Some(PathBuf::from(path)), remainder.trim()),
        None => (Some(PathBuf::from(stripped)), ""),
    }
}
