//! Terminal chat front end: session bookkeeping goes through the store, replies
//! come from the configured LLM provider.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chatdesk_provider::{collect_stream, LlmProvider, LlmRequest};
use chatdesk_schema::ChatMessage;

use crate::client::StoreClient;
use crate::config::LlmConfig;

pub struct ChatSession {
    store: StoreClient,
    provider: Arc<dyn LlmProvider>,
    llm: LlmConfig,
    session_id: String,
}

impl ChatSession {
    /// Attach to `session_id`, or ask the store for a fresh session.
    pub async fn start(
        store: StoreClient,
        provider: Arc<dyn LlmProvider>,
        llm: LlmConfig,
        session_id: Option<String>,
    ) -> Result<Self> {
        let session_id = match session_id {
            Some(id) => id,
            None => store.new_chat().await?,
        };
        tracing::info!(%session_id, "chat session attached");
        Ok(Self {
            store,
            provider,
            llm,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn history(&self) -> Result<Vec<ChatMessage>> {
        self.store.history(&self.session_id).await
    }

    pub async fn new_session(&mut self) -> Result<&str> {
        self.session_id = self.store.new_chat().await?;
        tracing::info!(session_id = %self.session_id, "switched to new session");
        Ok(&self.session_id)
    }

    pub fn switch(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    pub async fn sessions(&self) -> Result<Vec<String>> {
        self.store.sessions().await
    }

    /// One turn: store the user text, stream a reply over the whole session,
    /// then store the assembled reply.
    pub async fn send<F>(&self, text: &str, on_delta: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let history = self
            .store
            .add_message(&self.session_id, ChatMessage::user(text))
            .await?;

        let request = LlmRequest::from_history(
            self.llm.model.clone(),
            Some(self.llm.system_prompt.clone()),
            &history,
            self.llm.max_tokens,
        );
        let stream = self.provider.stream(request).await?;
        let reply = collect_stream(stream, on_delta).await?;

        self.store
            .add_message(&self.session_id, ChatMessage::assistant(reply.clone()))
            .await?;
        Ok(reply)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    New,
    Sessions,
    History,
    Switch(String),
    Message(String),
    Empty,
    Unknown(String),
}

pub fn parse_repl_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Message(line.to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("quit" | "exit"), _) => ReplCommand::Quit,
        (Some("new"), _) => ReplCommand::New,
        (Some("sessions"), _) => ReplCommand::Sessions,
        (Some("history"), _) => ReplCommand::History,
        (Some("switch"), Some(id)) => ReplCommand::Switch(id.to_string()),
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

pub fn format_turn(message: &ChatMessage) -> String {
    match message.role.as_str() {
        "user" => format!("you> {}", message.content),
        "assistant" => format!("assistant> {}", message.content),
        "system" => format!("System: {}", message.content),
        other => format!("{other}> {}", message.content),
    }
}

/// Sidebar-style label: first eight characters of the id.
pub fn short_id(session_id: &str) -> &str {
    session_id
        .char_indices()
        .nth(8)
        .map_or(session_id, |(idx, _)| &session_id[..idx])
}

fn print_history(history: &[ChatMessage]) {
    for message in history {
        println!("{}", format_turn(message));
    }
}

pub async fn run_repl(mut session: ChatSession) -> Result<()> {
    println!("chatdesk chat. Commands: /new /sessions /switch <id> /history /quit");
    println!("Chat session: {}...", short_id(session.session_id()));
    println!("---");
    print_history(&session.history().await?);

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }

        match parse_repl_line(&input) {
            ReplCommand::Quit => break,
            ReplCommand::Empty => continue,
            ReplCommand::New => match session.new_session().await {
                Ok(id) => println!("Chat session: {}...", short_id(id)),
                Err(err) => eprintln!("Error: {err}"),
            },
            ReplCommand::Sessions => match session.sessions().await {
                Ok(ids) => {
                    for id in ids {
                        let marker = if id == session.session_id() { "*" } else { " " };
                        println!("{marker} Chat {} ({id})", short_id(&id));
                    }
                }
                Err(err) => eprintln!("Error: {err}"),
            },
            ReplCommand::History => match session.history().await {
                Ok(history) => print_history(&history),
                Err(err) => eprintln!("Error: {err}"),
            },
            ReplCommand::Switch(id) => {
                session.switch(id);
                println!("Chat session: {}...", short_id(session.session_id()));
                match session.history().await {
                    Ok(history) => print_history(&history),
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
            ReplCommand::Unknown(line) => eprintln!("Unknown command: {line}"),
            ReplCommand::Message(text) => {
                print!("assistant> ");
                std::io::stdout().flush()?;
                let result = session
                    .send(&text, |delta| {
                        print!("{delta}");
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!();
                if let Err(err) = result {
                    tracing::warn!("chat turn failed: {err:#}");
                    eprintln!("Error: {err:#}");
                }
            }
        }
    }

    Ok(())
}
