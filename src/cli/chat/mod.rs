pub mod command;
pub mod conversation_state;
pub mod prompt;
pub mod render;
pub mod session;

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use command::{Command, StyleChoice};
use eyre::Result;
use prompt::generate_prompt;
use render::{Renderer, render_prompts, render_suggestions};
use session::{Conversation, Update};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{error, warn};

use crate::config::WelcomeTiming;
use crate::payload::{default_save_path, read_image_file, write_image_file};

const HELP_TEXT: &str = "
Imagen Chat

<text>                       Generate an image from a prompt
/style <n|instruction>       Restyle the current image
/styles                      List the current style suggestions
/edit [@file] <instruction>  Edit the current image (or an image file)
/animate [@file] <prompt>    Turn the current image (or a file) into a video
/instant [@file]             Animate with a prompt written for you
/prompts                     Show the sample prompts
/prompt <n>                  Use a sample prompt
/save [path]                 Save the current image
/clear                       Clear the conversation
/help                        Show this help dialogue
/quit                        Quit the application
";

pub struct ChatOptions {
    /// Single prompt to run without entering the REPL.
    pub input: Option<String>,
    /// Where the single-prompt run writes its image.
    pub save_to: Option<PathBuf>,
    pub welcome: WelcomeTiming,
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    save_to: Option<PathBuf>,
    welcome: WelcomeTiming,
    conversation: Conversation,
    updates: Receiver<Update>,
    renderer: Renderer,
}

impl ChatContext {
    pub fn new(output: Box<dyn Write>, conversation: Conversation, options: ChatOptions) -> Self {
        let updates = conversation.subscribe();
        Self {
            output,
            input: options.input,
            save_to: options.save_to,
            welcome: options.welcome,
            conversation,
            updates,
            renderer: Renderer::new(),
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Handle non-interactive mode (single prompt)
        if let Some(input) = self.input.take() {
            return self.run_once(&input).await;
        }

        let conversation = self.conversation.clone();
        self.drive(conversation.play_welcome(self.welcome)).await?;
        writeln!(self.output, "Type /help for commands.")?;

        self.run_interactive().await?;
        Ok(ExitCode::SUCCESS)
    }

    async fn run_once(&mut self, input: &str) -> Result<ExitCode> {
        let conversation = self.conversation.clone();
        self.drive(conversation.submit_prompt(input)).await?;

        let Some(image) = self.conversation.current_image() else {
            return Ok(ExitCode::FAILURE);
        };
        if let Some(path) = self.save_to.clone() {
            write_image_file(&path, &image)?;
            writeln!(self.output, "Saved image to {}", path.display())?;
        }
        Ok(ExitCode::SUCCESS)
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            self.flush_updates()?;
            let prompt_text = generate_prompt(self.conversation.current_image().is_some());
            let readline = rl.readline(&prompt_text);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    match self.handle_input(&line).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => writeln!(self.output, "Error: {}", e)?,
                    }
                }
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Runs one line of input. Returns true when the user asked to quit.
    async fn handle_input(&mut self, input: &str) -> Result<bool> {
        let command = match Command::parse(input) {
            Ok(command) => command,
            Err(e) => {
                writeln!(self.output, "{}", e)?;
                return Ok(false);
            }
        };

        let conversation = self.conversation.clone();
        match command {
            Command::Prompt(prompt) => {
                self.drive(conversation.submit_prompt(&prompt)).await?;
            }
            Command::Style(choice) => {
                if conversation.current_image().is_none() {
                    writeln!(self.output, "Generate an image first, then restyle it.")?;
                    return Ok(false);
                }
                let style = match choice {
                    StyleChoice::Text(text) => text,
                    StyleChoice::Index(index) => {
                        match conversation.active_suggestions().into_iter().nth(index) {
                            Some(suggestion) => suggestion.style,
                            None => {
                                writeln!(self.output, "No style #{}. Try /styles.", index + 1)?;
                                return Ok(false);
                            }
                        }
                    }
                };
                self.drive(conversation.apply_style(&style)).await?;
            }
            Command::Styles => {
                if let Some(prompt) = conversation.last_prompt() {
                    writeln!(self.output, "Styles for \"{}\":", prompt)?;
                }
                writeln!(self.output, "{}", render_suggestions(&conversation.active_suggestions()))?;
            }
            Command::Edit { image, instruction } => {
                if let Some(source) = self.resolve_source(image)? {
                    self.drive(conversation.edit_image(&instruction, &source)).await?;
                }
            }
            Command::Animate { image, prompt } => {
                if let Some(source) = self.resolve_source(image)? {
                    self.drive(conversation.generate_video(&prompt, &source)).await?;
                }
            }
            Command::Instant { image } => {
                if let Some(source) = self.resolve_source(image)? {
                    self.drive(conversation.instant_animate(&source)).await?;
                }
            }
            Command::Prompts => {
                writeln!(self.output, "{}", render_prompts())?;
            }
            Command::SelectPrompt(index) => {
                if !self.drive(conversation.select_prompt_suggestion(index)).await? {
                    writeln!(self.output, "No prompt #{}. Try /prompts.", index + 1)?;
                }
            }
            Command::Save(path) => match conversation.current_image() {
                Some(image) => {
                    let path = path.unwrap_or_else(default_save_path);
                    if let Err(e) = write_image_file(&path, &image) {
                        error!("Saving image failed: {:?}", e);
                        writeln!(self.output, "Could not save the image to {}.", path.display())?;
                    } else {
                        writeln!(self.output, "Saved image to {}", path.display())?;
                    }
                }
                None => writeln!(self.output, "There is no image to save yet.")?,
            },
            Command::Clear => {
                conversation.clear();
                self.flush_updates()?;
            }
            Command::Help => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            Command::Quit => return Ok(true),
        }

        Ok(false)
    }

    /// The image an edit or animation should start from: a file when one was
    /// named, otherwise the current image.
    fn resolve_source(&mut self, image: Option<PathBuf>) -> Result<Option<String>> {
        if let Some(path) = image {
            return match read_image_file(&path) {
                Ok(payload) => Ok(Some(payload)),
                Err(e) => {
                    writeln!(self.output, "Could not read {}: {}", path.display(), e)?;
                    Ok(None)
                }
            };
        }

        let current = self.conversation.current_image();
        if current.is_none() {
            writeln!(self.output, "There is no image yet. Generate one or pass @file.")?;
        }
        Ok(current)
    }

    /// Awaits an intent while rendering the updates it publishes.
    async fn drive<F: Future>(&mut self, intent: F) -> Result<F::Output> {
        tokio::pin!(intent);
        let output = loop {
            tokio::select! {
                output = &mut intent => break output,
                update = self.updates.recv() => match update {
                    Ok(update) => self.show(&update)?,
                    Err(RecvError::Lagged(skipped)) => warn!("Renderer skipped {} updates", skipped),
                    Err(RecvError::Closed) => break (&mut intent).await,
                },
            }
        };
        self.flush_updates()?;
        Ok(output)
    }

    /// Renders whatever arrived since the last look, including background
    /// suggestion refreshes.
    fn flush_updates(&mut self) -> Result<()> {
        loop {
            match self.updates.try_recv() {
                Ok(update) => self.show(&update)?,
                Err(TryRecvError::Lagged(skipped)) => warn!("Renderer skipped {} updates", skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
            }
        }
    }

    fn show(&mut self, update: &Update) -> Result<()> {
        if let Some(text) = self.renderer.render(update) {
            writeln!(self.output, "{}", text)?;
        }
        Ok(())
    }
}
