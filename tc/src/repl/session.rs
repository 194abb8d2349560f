//! REPL session management

use colored::Colorize;
use eyre::Result;
use itinerary::{ItemId, ReorderOutcome};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::render;
use crate::sync::{SyncEvent, SyncHandle, SyncResponse};

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Chat(String),
    Ask(String),
    Move { item: ItemId, day: u32, position: u32 },
    Remove(ItemId),
    Pin(u32),
    Unpin(u32),
    Show,
    History,
    Refresh,
    Status,
    Help,
    Quit,
}

impl ReplInput {
    /// Parse a trimmed, non-empty line; plain text is chat
    pub fn parse(input: &str) -> Result<Self, String> {
        if !input.starts_with('/') {
            return Ok(Self::Chat(input.to_string()));
        }

        let (cmd, rest) = input.split_once(char::is_whitespace).unwrap_or((input, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        match cmd {
            "/help" | "/h" => Ok(Self::Help),
            "/quit" | "/q" | "/exit" => Ok(Self::Quit),
            "/show" | "/s" => Ok(Self::Show),
            "/history" => Ok(Self::History),
            "/refresh" => Ok(Self::Refresh),
            "/status" => Ok(Self::Status),
            "/ask" | "/a" => {
                if rest.is_empty() {
                    return Err("Usage: /ask <prompt>".to_string());
                }
                Ok(Self::Ask(rest.to_string()))
            }
            "/move" | "/mv" => match args.as_slice() {
                [item, day, position] => Ok(Self::Move {
                    item: ItemId(number(item)?),
                    day: number(day)?,
                    position: number(position)?,
                }),
                _ => Err("Usage: /move <item> <day> <position>".to_string()),
            },
            "/rm" => match args.as_slice() {
                [item] => Ok(Self::Remove(ItemId(number(item)?))),
                _ => Err("Usage: /rm <item>".to_string()),
            },
            "/pin" => match args.as_slice() {
                [day] => Ok(Self::Pin(number(day)?)),
                _ => Err("Usage: /pin <day>".to_string()),
            },
            "/unpin" => match args.as_slice() {
                [day] => Ok(Self::Unpin(number(day)?)),
                _ => Err("Usage: /unpin <day>".to_string()),
            },
            _ => Err(format!("Unknown command: {}", cmd)),
        }
    }
}

fn number<T: std::str::FromStr>(raw: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("Not a number: {}", raw))
}

/// Interactive session on one trip
pub struct ReplSession {
    handle: SyncHandle,
}

impl ReplSession {
    /// Create a new REPL session
    pub fn new(handle: SyncHandle) -> Self {
        Self { handle }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();
        self.print_itinerary().await?;

        // Inbound chat and notices are printed as they arrive
        let printer = spawn_event_printer(self.handle.subscribe_events());

        // Create readline editor for proper line editing
        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        // Main REPL loop
        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    // Add to history
                    let _ = rl.add_history_entry(input);

                    match ReplInput::parse(input) {
                        Ok(parsed) => match self.handle_input(parsed).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        },
                        Err(message) => {
                            println!("{} {}", "?".yellow(), message);
                            println!("Type {} for available commands", "/help".yellow());
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C - just show new prompt
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    // Ctrl+D - exit
                    println!();
                    break;
                }
                Err(err) => {
                    printer.abort();
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        printer.abort();
        let _ = self.handle.shutdown().await;
        println!("Goodbye!");
        Ok(())
    }

    /// Print welcome message
    fn print_welcome(&self) {
        println!();
        println!("{}", format!("TripCrew · {}", self.handle.title()).bright_cyan().bold());
        println!("Trip: {}", self.handle.trip_id());
        println!(
            "Type to chat, {} to ask the assistant, {} for help, {} to quit",
            "/ask".yellow(),
            "/help".yellow(),
            "/quit".yellow()
        );
        println!();
    }

    async fn handle_input(&self, input: ReplInput) -> SlashResult {
        debug!(?input, "handle_input: called");
        let result = match input {
            ReplInput::Quit => return SlashResult::Quit,
            ReplInput::Help => {
                self.print_help();
                Ok(())
            }
            ReplInput::Chat(text) => self.handle.send_chat(text).await.map(|_| ()),
            ReplInput::Ask(text) => self.handle.send_prompt(text).await.map(|_| ()),
            ReplInput::Move { item, day, position } => match self.handle.move_item(item, day, position).await {
                Ok(ReorderOutcome::Unchanged) => {
                    println!("{}", "Nothing moved.".dimmed());
                    Ok(())
                }
                Ok(ReorderOutcome::Staged { changes, .. }) => {
                    print!("{}", render::changes(&changes));
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ReplInput::Remove(item) => self.handle.remove_item(item).await.map(|_| {
                println!("{}", format!("Removed #{}", item).dimmed());
            }),
            ReplInput::Pin(day) => self.handle.pin_day(day).await,
            ReplInput::Unpin(day) => self.handle.unpin_day(day).await,
            ReplInput::Refresh => self.handle.refresh().await,
            ReplInput::Show => self.print_itinerary().await,
            ReplInput::History => self.print_history().await,
            ReplInput::Status => self.handle.status().await.map(|status| {
                println!(
                    "channel: {:?}, pending edits: {}, unsent chats: {}, submitting: {}, refetching: {}",
                    status.channel,
                    status.pending_edits,
                    status.unconfirmed_chats,
                    status.submitting,
                    status.refetching
                );
            }),
        };

        if let Err(e) = result {
            println!("{} {}", "Error:".red(), e);
        }
        SlashResult::Continue
    }

    /// Print help message
    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:26} Send a chat message", "<text>".yellow());
        println!("  {:26} Ask the assistant", "/ask <prompt>".yellow());
        println!("  {:26} Move an item", "/move <item> <day> <pos>".yellow());
        println!("  {:26} Delete an item", "/rm <item>".yellow());
        println!("  {:26} Keep an empty day visible", "/pin <day>".yellow());
        println!("  {:26} Stop keeping an empty day", "/unpin <day>".yellow());
        println!("  {:26} Show the itinerary", "/show".yellow());
        println!("  {:26} Show the chat history", "/history".yellow());
        println!("  {:26} Reload from the server", "/refresh".yellow());
        println!("  {:26} Show sync status", "/status".yellow());
        println!("  {:26} Show this help", "/help".yellow());
        println!("  {:26} Leave the trip", "/quit".yellow());
        println!();
    }

    async fn print_itinerary(&self) -> SyncResponse<()> {
        let list = self.handle.snapshot().await?;
        println!();
        print!("{}", render::itinerary(&list));
        println!();
        Ok(())
    }

    async fn print_history(&self) -> SyncResponse<()> {
        let messages = self.handle.transcript().await?;
        if messages.is_empty() {
            println!("{}", "No messages yet.".dimmed());
            return Ok(());
        }
        println!();
        for message in &messages {
            println!("{}", render::chat_line(message));
        }
        println!();
        Ok(())
    }
}

fn spawn_event_printer(mut events: broadcast::Receiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render::event_line(&event) {
                        println!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Result of handling an input line
enum SlashResult {
    Continue,
    Quit,
}
