//! Line-oriented chat loop.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chat_provider::Role;
use chat_session::{ConversationHistory, Session, StreamResult, TurnError, TurnOptions};
use history_store::{history_file_name, HistoryStore};
use time::OffsetDateTime;

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::config::AppConfig;
use crate::interrupt::Interrupt;
use crate::progress::{LiveProgress, TurnProgress, CLEAR_LINE};
use crate::prompts::{prompt_by_index, PROMPTS};
use crate::render::{format_user_text, DisplayStyle, MarkdownRenderer};

pub const DEFAULT_REVIEW_FILE: &str = "gitdiff.txt";

const FALLBACK_SUMMARY: &str = "chat_summary";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_RED: &str = "\x1b[31m";
const COLOR_RESET: &str = "\x1b[0m";

enum TurnKind {
    Message(String),
    SystemPrompt,
    Review(PathBuf),
}

pub struct Repl {
    session: Session,
    renderer: MarkdownRenderer,
    config: AppConfig,
    store: Option<HistoryStore>,
    interrupt: Interrupt,
}

impl Repl {
    /// Creates the loop. Ctrl-C cancels an in-flight turn and exits otherwise.
    pub fn new(session: Session, config: AppConfig, store: Option<HistoryStore>) -> io::Result<Self> {
        let interrupt = Interrupt::install()?;

        Ok(Self {
            session,
            renderer: MarkdownRenderer::new(config.display_style),
            config,
            store,
            interrupt,
        })
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    pub fn run(&mut self, input: impl BufRead) -> io::Result<()> {
        let profile = self.session.profile();
        println!(
            "ai-chat ({} / {}). Type /help for commands.",
            profile.provider_id, profile.model_id
        );
        self.print_prompt()?;

        for line in input.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.print_prompt()?;
                continue;
            }

            match parse_slash_command(trimmed) {
                Some(SlashCommand::Quit) => break,
                Some(command) => self.handle_command(command),
                None => self.run_turn(TurnKind::Message(trimmed.to_string())),
            }
            self.print_prompt()?;
        }

        tracing::info!(history = self.session.history_len(), "chat loop finished");
        Ok(())
    }

    fn print_prompt(&self) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if self.renderer.style() == DisplayStyle::Notty {
            write!(stdout, "> ")?;
        } else {
            write!(stdout, "{COLOR_GREEN}>{COLOR_RESET} ")?;
        }
        stdout.flush()
    }

    fn handle_command(&mut self, command: SlashCommand) {
        match command {
            SlashCommand::Help => println!("{HELP_TEXT}"),
            SlashCommand::Quit => {}
            SlashCommand::Clear => {
                self.session.clear_history();
                println!("History cleared.");
            }
            SlashCommand::History => {
                println!("History items: {}", self.session.history_len());
            }
            SlashCommand::Prompt(None) => {
                for (index, template) in PROMPTS.iter().enumerate() {
                    println!("{index}: {}", template.name);
                }
                println!("Current: {}", self.session.system_instruction());
            }
            SlashCommand::Prompt(Some(index)) => match prompt_by_index(index) {
                Some(template) => {
                    self.session.update_system_instruction(template.prompt);
                    println!("System instruction set to '{}'.", template.name);
                    self.run_turn(TurnKind::SystemPrompt);
                }
                None => self.print_error(&format!("No prompt template {index}.")),
            },
            SlashCommand::Style(None) => {
                for (index, style) in DisplayStyle::ALL.iter().enumerate() {
                    let marker = if *style == self.renderer.style() { "*" } else { " " };
                    println!("{marker}{index}: {style}");
                }
            }
            SlashCommand::Style(Some(name)) => match resolve_style(&name) {
                Some(style) => {
                    self.renderer = MarkdownRenderer::new(style);
                    self.config.display_style = style;
                    match last_reply_text(self.session.history()) {
                        Some(reply) => {
                            println!("Re-rendering last reply with style: {style}");
                            println!("{}", self.renderer.render(&reply));
                        }
                        None => println!("Display style: {style}"),
                    }
                }
                None => self.print_error(&format!("Unknown style '{name}'.")),
            },
            SlashCommand::Review(path) => {
                let path = PathBuf::from(path.unwrap_or_else(|| DEFAULT_REVIEW_FILE.to_string()));
                self.run_turn(TurnKind::Review(path));
            }
            SlashCommand::Save => self.save_history(),
            SlashCommand::Load(name) => self.load_history(name),
            SlashCommand::Models => match self.session.list_models() {
                Ok(models) => {
                    for model in models {
                        println!("{model}");
                    }
                }
                Err(error) => self.print_error(&format!("Error listing models: {error}")),
            },
            SlashCommand::Unknown(command) => {
                self.print_error(&format!("Unknown command '{command}'. Type /help."));
            }
        }
    }

    fn run_turn(&mut self, kind: TurnKind) {
        let options = TurnOptions::default().with_cancel(self.interrupt.begin_turn());

        let echoed = match &kind {
            TurnKind::Message(text) => text.clone(),
            TurnKind::SystemPrompt => format!("[SystemPrompt] {}", self.session.system_instruction()),
            TurnKind::Review(path) => format!("[ReviewFile] {}", path.display()),
        };
        print!(
            "{}",
            format_user_text(&echoed, self.session.history_len(), self.renderer.style())
        );

        let mut progress = TurnProgress::start();
        let mut live = LiveProgress::start();
        let show_status = move |fragment: &str| print_status(&live.update(fragment));
        let outcome = match kind {
            TurnKind::Message(text) => self.session.send_message_with(&text, options, show_status),
            TurnKind::SystemPrompt => self.session.send_system_prompt_with(options, show_status),
            TurnKind::Review(path) => self.session.review_file_with(&path, options, show_status),
        };
        self.interrupt.end_turn();
        print_status(CLEAR_LINE);

        match outcome {
            Ok(result) => {
                progress.finish(result.fragment_count, result.text.len());
                self.print_reply(&result);
            }
            Err(error) => {
                progress.finish(error.partial.fragment_count, error.partial.text.len());
                self.print_failed_turn(&error);
            }
        }
        println!("{progress}");
    }

    fn print_reply(&self, result: &StreamResult) {
        let rendered = self.renderer.render(&result.text);
        if !rendered.is_empty() {
            println!("{rendered}");
        }
    }

    fn print_failed_turn(&self, error: &TurnError) {
        if !error.partial.text.is_empty() {
            println!("{}", error.partial.text);
        }
        self.print_error(&error.to_string());
    }

    fn print_error(&self, message: &str) {
        if self.renderer.style() == DisplayStyle::Notty {
            println!("{message}");
        } else {
            println!("{COLOR_RED}{message}{COLOR_RESET}");
        }
    }

    fn save_history(&mut self) {
        let Some(store) = &self.store else {
            self.print_error("History storage is unavailable.");
            return;
        };

        let summary = match self.session.generate_chat_summary() {
            Ok(summary) => summary,
            Err(error) => {
                tracing::warn!(%error, "chat summary failed, using fallback name");
                FALLBACK_SUMMARY.to_string()
            }
        };
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let name = match history_file_name(&summary, now) {
            Ok(name) => name,
            Err(error) => {
                self.print_error(&format!("Error naming chat history: {error}"));
                return;
            }
        };

        match self.session.store_history(store, &name) {
            Ok(path) => println!("Chat history stored to:\n{}", path.display()),
            Err(error) => self.print_error(&format!("Error storing chat history: {error}")),
        }
    }

    fn load_history(&mut self, name: Option<String>) {
        let Some(store) = &self.store else {
            self.print_error("History storage is unavailable.");
            return;
        };

        let names = match store.list() {
            Ok(names) => names,
            Err(error) => {
                self.print_error(&format!("Error listing chat histories: {error}"));
                return;
            }
        };

        let Some(name) = name else {
            if names.is_empty() {
                println!("No stored chat histories in {}.", store.root().display());
            }
            for (index, name) in names.iter().enumerate() {
                println!("{index}: {name}");
            }
            return;
        };

        let name = resolve_history_name(&name, &names);
        match self.session.load_history(store, &name) {
            Ok(entries) => println!("Loaded {name} ({entries} history items)."),
            Err(error) => self.print_error(&format!("Error loading chat history: {error}")),
        }
    }
}

/// Overwrites the live status line; the final render replaces it.
fn print_status(line: &str) {
    let mut stdout = io::stdout().lock();
    if stdout.write_all(line.as_bytes()).is_ok() {
        let _ = stdout.flush();
    }
}

/// Text of the newest model reply, or `None` when the last entry is not one.
pub fn last_reply_text(history: &ConversationHistory) -> Option<String> {
    history
        .last()
        .filter(|content| content.role == Role::Model)
        .map(|content| content.text())
}

/// Accepts a style name or its position in the style list.
pub fn resolve_style(argument: &str) -> Option<DisplayStyle> {
    match argument.trim().parse::<usize>() {
        Ok(index) => DisplayStyle::from_index(index),
        Err(_) => DisplayStyle::parse(argument),
    }
}

/// Maps a list position to its file name; anything else is taken as a name.
pub fn resolve_history_name(argument: &str, names: &[String]) -> String {
    argument
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|index| names.get(index).cloned())
        .unwrap_or_else(|| argument.trim().to_string())
}
