/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `auth`      - sign in, sign up, Google sign-in, sign out, whoami
- `documents` - list and delete uploaded documents
- `upload`    - one-shot upload with a progress bar and preview
- `chat`      - one-shot questions and the interactive session

Handlers share an [`AppContext`] holding the configuration, the API client,
and the session store.
*/

pub mod documents;
pub mod special_commands;

use crate::api::{ApiClient, RagApi};
use crate::config::Config;
use crate::error::{RagChatError, Result};
use crate::session::{SessionManager, SessionState};
use crate::storage::{KeyValueStore, SqliteStorage};
use crate::types::{format_file_size, Document, User};

use colored::Colorize;
use rustyline::completion::Completer;
use rustyline::config::Configurer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{ColorMode, DefaultEditor, Editor, Helper};
use std::borrow::Cow;
use std::sync::Arc;

/// Shared dependencies of every command
pub struct AppContext {
    /// Validated configuration
    pub config: Config,
    /// Backend client
    pub api: Arc<dyn RagApi>,
    /// Session store
    pub session: SessionManager,
}

impl AppContext {
    /// Build the context from configuration
    ///
    /// Opens the session database and restores any persisted session.
    ///
    /// # Errors
    ///
    /// Returns error if storage or the HTTP client cannot be initialized
    pub fn new(config: Config) -> Result<Self> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage.path {
            Some(path) => Arc::new(SqliteStorage::new_with_path(path)?),
            None => Arc::new(SqliteStorage::new()?),
        };
        let api: Arc<dyn RagApi> = Arc::new(ApiClient::new(&config.api, Arc::clone(&storage))?);
        Self::with_parts(config, api, storage)
    }

    /// Build the context from explicit parts
    pub fn with_parts(
        config: Config,
        api: Arc<dyn RagApi>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let session = SessionManager::init(Arc::clone(&api), storage)?;
        Ok(Self {
            config,
            api,
            session,
        })
    }

    /// The signed-in user, or an error telling the user to sign in
    ///
    /// # Errors
    ///
    /// Returns error when no session is active
    pub fn require_user(&self) -> Result<User> {
        match self.session.state() {
            SessionState::Authenticated(user) => Ok(user),
            SessionState::ReauthenticationRequired => Err(RagChatError::Validation(
                "Your session has expired. Please sign in again with `ragchat login`.".to_string(),
            )
            .into()),
            SessionState::Anonymous => Err(RagChatError::Validation(
                "You are not signed in. Run `ragchat login` first.".to_string(),
            )
            .into()),
        }
    }
}

/// Read one line from the terminal
fn prompt_line(prompt: &str) -> Result<String> {
    let mut rl = DefaultEditor::new()?;
    Ok(rl.readline(prompt)?)
}

/// Line helper that renders every typed character as `*`
#[derive(Debug, Default)]
struct PasswordMask;

impl Highlighter for PasswordMask {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Completer for PasswordMask {
    type Candidate = String;
}

impl Hinter for PasswordMask {
    type Hint = String;
}

impl Validator for PasswordMask {}

impl Helper for PasswordMask {}

/// Read a password, masking the typed characters
fn prompt_password(prompt: &str) -> Result<String> {
    let mut rl: Editor<PasswordMask, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(PasswordMask));
    rl.set_color_mode(ColorMode::Forced);
    rl.set_auto_add_history(false);
    Ok(rl.readline(prompt)?)
}

/// Print name, size, kind, id, and a preview of a document
pub fn print_document(document: &Document, preview_chars: usize) {
    println!("{} {}", "Document:".bold(), document.name.green());
    println!("Size:     {}", format_file_size(document.size));
    println!("Type:     {}", document.kind.to_string().to_uppercase());
    println!("Id:       {}", document.id);
    println!(
        "Uploaded: {}",
        document.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("\n{}", document.preview(preview_chars).dimmed());
    println!();
}

pub mod auth {
    //! Authentication commands

    use super::*;

    /// Sign in with email and password
    ///
    /// # Arguments
    ///
    /// * `ctx` - Application context
    /// * `email` - Account email
    /// * `password` - Password; prompted for when `None`
    pub async fn login(ctx: &AppContext, email: &str, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(p) => p,
            None => prompt_password("Password: ")?,
        };
        let user = ctx.session.login(email, &password).await?;
        println!(
            "{}",
            format!("Signed in as {} <{}>", user.name, user.email).green()
        );
        Ok(())
    }

    /// Create an account and sign in
    pub async fn signup(
        ctx: &AppContext,
        email: &str,
        name: &str,
        password: Option<String>,
    ) -> Result<()> {
        let password = match password {
            Some(p) => p,
            None => prompt_password("Choose a password: ")?,
        };
        let user = ctx.session.signup(email, &password, name).await?;
        println!(
            "{}",
            format!("Account created. Signed in as {} <{}>", user.name, user.email).green()
        );
        Ok(())
    }

    /// Start or finish Google sign-in
    ///
    /// Without a code the authorization page is opened and instructions
    /// for finishing are printed.
    pub async fn google_login(ctx: &AppContext, code: Option<String>) -> Result<()> {
        match code {
            None => {
                let url = ctx.session.login_with_google()?;
                println!("Opening Google sign-in in your browser:\n\n  {}\n", url.cyan());
                println!(
                    "After signing in, copy the `code` parameter from the callback URL and run:\n\n  ragchat google-login --code <code>\n"
                );
            }
            Some(code) => {
                let user = ctx.session.complete_google_login(&code).await?;
                println!(
                    "{}",
                    format!("Signed in as {} <{}>", user.name, user.email).green()
                );
            }
        }
        Ok(())
    }

    /// Sign out
    pub fn logout(ctx: &AppContext) -> Result<()> {
        ctx.session.logout();
        println!("Signed out");
        Ok(())
    }

    /// Show the session state
    pub fn whoami(ctx: &AppContext) -> Result<()> {
        match ctx.session.state() {
            SessionState::Authenticated(user) => {
                println!("{} <{}>", user.name.bold(), user.email);
                println!("Id: {}", user.id);
                if let Some(avatar) = user.avatar {
                    println!("Avatar: {}", avatar);
                }
            }
            SessionState::ReauthenticationRequired => {
                println!(
                    "{}",
                    "Your session has expired. Please sign in again.".yellow()
                );
            }
            SessionState::Anonymous => println!("Not signed in"),
        }
        Ok(())
    }
}

pub mod upload {
    //! One-shot upload with a progress bar

    use super::*;
    use crate::upload::{UploadOrchestrator, UploadOutcome};
    use indicatif::{ProgressBar, ProgressStyle};
    use std::path::Path;

    /// Upload `path` while rendering progress from the orchestrator state
    pub async fn upload_with_progress(uploads: &UploadOrchestrator, path: &Path) -> UploadOutcome {
        let mut rx = uploads.subscribe();
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("Uploading [{bar:30}] {pos:>3}%")
                .map(|style| style.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let render = {
            let bar = bar.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let progress = rx.borrow().progress;
                    bar.set_position(u64::from(progress));
                }
            })
        };

        let outcome = uploads.upload_document(path).await;
        render.abort();
        bar.finish_and_clear();
        outcome
    }

    /// `ragchat upload <path>`
    pub async fn run_upload(ctx: &AppContext, path: &Path) -> Result<()> {
        ctx.require_user()?;
        tracing::info!("Uploading {}", path.display());

        let uploads = UploadOrchestrator::new(Arc::clone(&ctx.api), ctx.config.upload.clone());
        match upload_with_progress(&uploads, path).await {
            UploadOutcome::Completed(document) => {
                println!("{}", "Upload complete".green());
                print_document(&document, ctx.config.chat.preview_chars);
                println!(
                    "Ask about it with: ragchat ask --document-id {} \"<question>\"",
                    document.id
                );
                Ok(())
            }
            UploadOutcome::Failed(message) => Err(anyhow::anyhow!(message)),
            UploadOutcome::Busy => Err(RagChatError::Busy("Upload").into()),
        }
    }
}

pub mod chat {
    //! Questions about documents: `ask` and the interactive session

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::upload::upload_with_progress;
    use super::*;
    use crate::chat::{ChatOrchestrator, ChatState, SendOutcome};
    use crate::types::{Message, Role, Source};
    use crate::upload::{UploadOrchestrator, UploadOutcome};
    use indicatif::{ProgressBar, ProgressStyle};
    use rustyline::error::ReadlineError;
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;

    /// One line summarizing the retrieved chunks, if there are any
    pub fn source_summary(sources: &[Source]) -> Option<String> {
        if sources.is_empty() {
            return None;
        }
        let parts: Vec<String> = sources
            .iter()
            .map(|s| format!("doc {} chunk {}", s.document_id, s.chunk_index))
            .collect();
        Some(format!("Sources: {}", parts.join(", ")))
    }

    /// One line of `/history` output
    pub fn format_history_line(message: &Message) -> String {
        let who = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        format!(
            "[{}] {}: {}",
            message.timestamp.format("%H:%M"),
            who,
            message.content
        )
    }

    /// REPL prompt, naming the active document
    pub fn format_prompt(document: Option<&Document>) -> String {
        match document {
            Some(doc) => format!("[{}] >> ", doc.name),
            None => ">> ".to_string(),
        }
    }

    /// Spin `bar` while the chat state reports a pending answer
    pub fn spawn_waiting_indicator(
        mut rx: watch::Receiver<ChatState>,
        bar: ProgressBar,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let loading = rx.borrow().is_loading;
                if !loading {
                    bar.finish_and_clear();
                    break;
                }
                if !bar.is_finished() {
                    bar.enable_steady_tick(Duration::from_millis(100));
                }
            }
        })
    }

    /// Send a question and print the reply
    async fn ask_and_print(
        chat: &ChatOrchestrator,
        question: &str,
        scope: Option<i64>,
    ) -> SendOutcome {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Waiting for the answer...");
        let indicator = spawn_waiting_indicator(chat.subscribe(), spinner.clone());

        let mut printed = false;
        let outcome = chat
            .send_scoped(question, scope, |chunk| {
                if !printed {
                    spinner.finish_and_clear();
                    printed = true;
                }
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            })
            .await;
        spinner.finish_and_clear();
        indicator.abort();

        if printed {
            println!();
        }

        match &outcome {
            SendOutcome::Answered { message, sources } => {
                if !printed {
                    println!("{}", message.content);
                }
                if let Some(summary) = source_summary(sources) {
                    println!("{}", summary.dimmed());
                }
                println!();
            }
            SendOutcome::Fallback(message) => {
                println!("{}\n", message.content.yellow());
            }
            SendOutcome::Busy => {
                println!("{}", "Still waiting for the previous answer".yellow());
            }
            SendOutcome::Ignored => {}
        }

        outcome
    }

    /// `ragchat ask --document-id N "question"`
    pub async fn ask(ctx: &AppContext, document_id: i64, question: &str) -> Result<()> {
        ctx.require_user()?;
        if question.trim().is_empty() {
            return Err(RagChatError::Validation("Question must not be empty".to_string()).into());
        }

        let chat = ChatOrchestrator::new(Arc::clone(&ctx.api), &ctx.config.chat);
        match ask_and_print(&chat, question, Some(document_id)).await {
            SendOutcome::Fallback(_) => Err(anyhow::anyhow!("No answer received")),
            _ => Ok(()),
        }
    }

    fn print_welcome_banner(user: &User) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║               ragchat - Chat With Your Documents             ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Signed in as {} <{}>", user.name.bold(), user.email);
        println!("Upload a document with '/upload <path>', then ask questions about it.");
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_status(
        ctx: &AppContext,
        user: &User,
        document: Option<&Document>,
        chat: &ChatOrchestrator,
    ) {
        println!("\nSession Status");
        println!("==============");
        println!("User:      {} <{}>", user.name, user.email);
        println!("Backend:   {}", ctx.config.api.base_url);
        match document {
            Some(doc) => println!(
                "Document:  {} ({}, id {})",
                doc.name,
                format_file_size(doc.size),
                doc.id
            ),
            None => println!("Document:  none"),
        }
        println!("Messages:  {}", chat.messages().len());
        println!(
            "Streaming: {}\n",
            if chat.is_streaming() { "on" } else { "off" }
        );
    }

    async fn handle_upload(
        ctx: &AppContext,
        uploads: &UploadOrchestrator,
        chat: &ChatOrchestrator,
        path: &std::path::Path,
    ) {
        match upload_with_progress(uploads, path).await {
            UploadOutcome::Completed(document) => {
                chat.clear_messages();
                println!("{}", "Upload complete".green());
                print_document(&document, ctx.config.chat.preview_chars);
            }
            UploadOutcome::Failed(message) => println!("{}\n", message.red()),
            UploadOutcome::Busy => println!("{}", "An upload is already in progress".yellow()),
        }
    }

    /// Start the interactive chat session
    ///
    /// # Arguments
    ///
    /// * `ctx` - Application context
    /// * `document` - File to upload before the first prompt
    ///
    /// # Errors
    ///
    /// Returns error when not signed in or the terminal cannot be read
    pub async fn run_chat(ctx: &AppContext, document: Option<PathBuf>) -> Result<()> {
        let user = ctx.require_user()?;
        tracing::info!("Starting interactive chat session");

        let uploads = UploadOrchestrator::new(Arc::clone(&ctx.api), ctx.config.upload.clone());
        let chat = ChatOrchestrator::new(Arc::clone(&ctx.api), &ctx.config.chat);
        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&user);

        if let Some(path) = document {
            handle_upload(ctx, &uploads, &chat, &path).await;
        }

        loop {
            let active = uploads.document();
            let prompt = format_prompt(active.as_ref());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            println!("{}\n", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::Upload(path) => {
                            handle_upload(ctx, &uploads, &chat, &path).await;
                        }
                        SpecialCommand::ShowDocument => match &active {
                            Some(doc) => print_document(doc, ctx.config.chat.preview_chars),
                            None => println!("No document loaded\n"),
                        },
                        SpecialCommand::ClearDocument => {
                            uploads.clear_document();
                            chat.clear_messages();
                            println!("Document and chat cleared\n");
                        }
                        SpecialCommand::ClearChat => {
                            chat.clear_messages();
                            println!("Chat cleared\n");
                        }
                        SpecialCommand::History => {
                            let messages = chat.messages();
                            if messages.is_empty() {
                                println!("No messages yet\n");
                            }
                            for message in &messages {
                                println!("{}", format_history_line(message));
                            }
                            println!();
                        }
                        SpecialCommand::Status => {
                            print_status(ctx, &user, active.as_ref(), &chat);
                        }
                        SpecialCommand::Help => print_help(),
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {
                            if active.is_none() {
                                println!(
                                    "{}",
                                    "No document loaded; asking without document context".dimmed()
                                );
                            }
                            ask_and_print(&chat, trimmed, active.as_ref().map(|d| d.id)).await;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }
}
