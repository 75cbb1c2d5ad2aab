//! Interactive terminal driver for the Studio conversation pipeline.
//!
//! Wires the controller to the real Groq clients and the local snapshot
//! store, and stands in for the excluded collaborators: `/user` supplies the
//! auth id, `/attach` plays the upload service by base64-encoding a local
//! file. Sends run in background tasks so the prompt stays responsive while
//! a dispatch is in flight.

use std::borrow::Cow::{self, Borrowed, Owned};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing_subscriber::EnvFilter;

use studio_application::{ConversationController, ConversationStore};
use studio_core::{AttachmentRef, HistoryRepository, ModelCatalog, ModelId};
use studio_infrastructure::{
    FileSnapshotStorage, HttpHistoryRepository, InMemoryHistoryRepository,
};
use studio_interaction::{GroqCatalogClient, GroqConfig, GroqDispatcher};

const COMMANDS: &[&str] = &[
    "/models", "/model", "/new", "/list", "/open", "/attach", "/user", "/close", "/history",
    "/delete",
];

/// CLI helper for rustyline that provides completion, highlighting, and hints.
#[derive(Clone)]
struct CliHelper {
    commands: Vec<String>,
}

impl CliHelper {
    fn new() -> Self {
        Self {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Helper for CliHelper {}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];

        if line.starts_with('/') {
            let candidates: Vec<Pair> = self
                .commands
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|cmd| Pair {
                    display: cmd.clone(),
                    replacement: cmd.clone(),
                })
                .collect();
            Ok((0, candidates))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Highlighter for CliHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for CliHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];

        if line.starts_with('/') && !line.contains(' ') {
            self.commands
                .iter()
                .find(|cmd| cmd.starts_with(line) && cmd.len() > line.len())
                .map(|cmd| cmd[line.len()..].to_string())
        } else {
            None
        }
    }
}

impl Validator for CliHelper {}

fn attachment_from_path(path: &str) -> Result<AttachmentRef> {
    let path = Path::new(path);
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "attachment".to_string());
    let media_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

    Ok(AttachmentRef {
        file_name,
        media_type,
        data: BASE64_STANDARD.encode(bytes),
    })
}

fn print_catalog(catalog: &ModelCatalog, selected: Option<&ModelId>) {
    for model in catalog.iter() {
        let marker = if Some(model) == selected { "*" } else { " " };
        println!("  {} {}", marker.bright_green(), model);
    }
}

async fn print_conversations(controller: &ConversationController) {
    if let Some(active) = controller.active_conversation().await {
        println!(
            "{} {} - {}",
            "  active:".bright_green(),
            active.title,
            active.preview().bright_black()
        );
    }
    for (index, conversation) in controller.archived_conversations().await.iter().enumerate() {
        println!(
            "  [{}] {} - {}",
            index,
            conversation.title,
            conversation.preview().bright_black()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = GroqConfig::from_env()?;
    let dispatcher = Arc::new(GroqDispatcher::new(config.clone()));
    let catalog_client = Arc::new(GroqCatalogClient::new(config));

    // A remote history endpoint is optional; without one the session archive
    // lives in memory only.
    let history: Arc<dyn HistoryRepository> = match std::env::var("HISTORY_API_URL") {
        Ok(url) if !url.trim().is_empty() => Arc::new(HttpHistoryRepository::new(url)),
        _ => {
            tracing::info!("HISTORY_API_URL not set, using the in-memory history repository");
            Arc::new(InMemoryHistoryRepository::new())
        }
    };

    let storage = Arc::new(FileSnapshotStorage::default_location()?);
    let store = Arc::new(ConversationStore::load(storage).await);
    let controller = Arc::new(ConversationController::new(
        store,
        dispatcher,
        catalog_client,
        history,
    ));

    println!("{}", "=== Studio ===".bright_magenta().bold());
    println!(
        "{}",
        "Type a message to chat, '/models' to list models, or 'quit' to exit."
            .bright_black()
    );
    println!();

    let mut catalog = match controller.load_catalog().await {
        Ok(catalog) => Some(catalog),
        Err(err) => {
            eprintln!("{}", format!("Could not load the model catalog: {err}").red());
            eprintln!("{}", "Run '/models' to retry.".bright_black());
            None
        }
    };
    let mut model: Option<ModelId> = catalog.as_ref().and_then(|c| c.first().cloned());
    if let Some(model) = model.as_ref() {
        println!("{}", format!("Using model {model}").bright_black());
    }

    let mut pending_attachment: Option<AttachmentRef> = None;

    let helper = CliHelper::new();
    let mut rl = Editor::new()?;
    rl.set_helper(Some(helper));

    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed == "quit" || trimmed == "exit" {
                    // Session boundary: archive the active conversation
                    // remotely when a user id was supplied.
                    match controller.close_session().await {
                        Ok(Some(record)) => {
                            println!(
                                "{}",
                                format!("Session archived as {}", record.id).bright_green()
                            );
                        }
                        Ok(None) => {}
                        Err(err) => {
                            eprintln!("{}", format!("Could not archive session: {err}").red())
                        }
                    }
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                if trimmed.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);

                let mut parts = trimmed.splitn(2, ' ');
                let command = parts.next().unwrap_or_default();
                let argument = parts.next().map(str::trim).unwrap_or_default();

                match command {
                    "/models" => match controller.load_catalog().await {
                        Ok(fresh) => {
                            if model.is_none() {
                                model = fresh.first().cloned();
                            }
                            print_catalog(&fresh, model.as_ref());
                            catalog = Some(fresh);
                        }
                        Err(err) => {
                            eprintln!("{}", format!("Could not load models: {err}").red())
                        }
                    },
                    "/model" => {
                        let requested = ModelId::from(argument);
                        match catalog.as_ref() {
                            Some(catalog) if catalog.contains(&requested) => {
                                println!("{}", format!("Using model {requested}").bright_black());
                                model = Some(requested);
                            }
                            Some(_) => {
                                eprintln!("{}", format!("Unknown model: {argument}").red())
                            }
                            None => eprintln!(
                                "{}",
                                "No catalog loaded yet; run '/models' first.".red()
                            ),
                        }
                    }
                    "/new" => match controller.new_conversation().await {
                        Ok(()) => println!("{}", "Started a new conversation.".bright_black()),
                        Err(err) => eprintln!("{}", format!("{err}").red()),
                    },
                    "/list" => print_conversations(&controller).await,
                    "/open" => {
                        let archived = controller.archived_conversations().await;
                        match argument.parse::<usize>().ok().and_then(|i| archived.get(i)) {
                            Some(conversation) => {
                                match controller.select_conversation(&conversation.id).await {
                                    Ok(restored) => {
                                        println!(
                                            "{}",
                                            format!("Opened '{}'", restored.title).bright_black()
                                        );
                                        for turn in &restored.turns {
                                            println!(
                                                "{} {}",
                                                format!("[{:?}]", turn.sender)
                                                    .to_lowercase()
                                                    .bright_magenta(),
                                                turn.text
                                            );
                                        }
                                    }
                                    Err(err) => eprintln!("{}", format!("{err}").red()),
                                }
                            }
                            None => eprintln!("{}", "Usage: /open <index from /list>".red()),
                        }
                    }
                    "/attach" => match attachment_from_path(argument) {
                        Ok(attachment) => {
                            println!(
                                "{}",
                                format!(
                                    "Attached {} ({})",
                                    attachment.file_name, attachment.media_type
                                )
                                .bright_black()
                            );
                            pending_attachment = Some(attachment);
                        }
                        Err(err) => eprintln!("{}", format!("Could not attach: {err}").red()),
                    },
                    "/user" => {
                        if argument.is_empty() {
                            eprintln!("{}", "Usage: /user <id>".red());
                        } else {
                            controller.set_user(argument).await;
                            println!("{}", format!("User set to {argument}").bright_black());
                        }
                    }
                    "/close" => match controller.close_session().await {
                        Ok(Some(record)) => println!(
                            "{}",
                            format!("Session archived as {}", record.id).bright_green()
                        ),
                        Ok(None) => {
                            println!("{}", "Nothing to archive.".bright_black())
                        }
                        Err(err) => eprintln!("{}", format!("{err}").red()),
                    },
                    "/history" => match controller.history().await {
                        Ok(records) => {
                            for record in records {
                                println!(
                                    "  {} {} ({} exchanges)",
                                    record.id.bright_black(),
                                    record.topic,
                                    record.messages.len()
                                );
                            }
                        }
                        Err(err) => eprintln!("{}", format!("{err}").red()),
                    },
                    "/delete" => match controller.delete_history(argument).await {
                        Ok(record) => println!(
                            "{}",
                            format!("Deleted '{}' from history", record.topic).bright_black()
                        ),
                        Err(err) => eprintln!("{}", format!("{err}").red()),
                    },
                    _ if trimmed.starts_with('/') => {
                        eprintln!("{}", format!("Unknown command: {command}").red())
                    }
                    _ => {
                        let Some(model) = model.clone() else {
                            eprintln!(
                                "{}",
                                "No model selected; run '/models' first.".red()
                            );
                            continue;
                        };

                        println!("{}", format!("> {trimmed}").green());

                        let controller = controller.clone();
                        let attachment = pending_attachment.take();
                        let input = trimmed.to_string();

                        // The prompt stays usable while the dispatch is in
                        // flight; the reply resolves against its own
                        // conversation even if the user switches meanwhile.
                        tokio::spawn(async move {
                            match controller.send_turn(&input, attachment, &model).await {
                                Ok(reply) => {
                                    println!("{}", "[assistant]".bright_magenta());
                                    for line in reply.lines() {
                                        println!("{}", line.bright_blue());
                                    }
                                }
                                Err(err) => {
                                    eprintln!("{}", format!("Send failed: {err}").red())
                                }
                            }
                        });
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {err:?}").red());
                break;
            }
        }
    }

    Ok(())
}
