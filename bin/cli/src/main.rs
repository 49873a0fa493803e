//! Terminal front end.
//!
//! Reads `user: text` lines from stdin, runs each through the chat service
//! and prints assistant replies to stdout. Logs go to stderr.

mod config;
mod input;
mod tools;

use aibot_ai::{AiError, ConversationLoop, FnInstructions, OpenAiBackend, ToolRegistry};
use aibot_conversation::{ChatService, InMemoryStore, ProcessOptions, SerializingStore};
use aibot_core::UserId;
use crate::config::CliConfig;
use rootcause::prelude::Report;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Service = ChatService<SerializingStore<InMemoryStore>, ConversationLoop<OpenAiBackend>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::from_env().expect("failed to load configuration");
    tracing::info!(model = %config.openai.model, "Loaded configuration");

    let backend = OpenAiBackend::new(config.openai).expect("invalid backend configuration");
    let additional = config.additional_instructions;
    let instructions = FnInstructions::new(move |args: JsonValue| {
        let additional = additional.clone();
        async move { Ok::<_, Report<AiError>>(additional_instructions(&additional, &args)) }
    });
    let runner = ConversationLoop::new(backend, config.chat)
        .with_tools(ToolRegistry::new().with_tool(tools::current_time()))
        .with_instructions(instructions);
    let service: Arc<Service> = Arc::new(ChatService::new(
        SerializingStore::new(InMemoryStore::new()),
        runner,
    ));

    let default_user = UserId::new(config.default_user);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                let Some((user_id, text)) = input::parse_line(&line, &default_user) else {
                    continue;
                };
                in_flight.spawn(handle(service.clone(), user_id, text));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, abandoning in-flight exchanges");
                in_flight.abort_all();
                break;
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
}

async fn handle(service: Arc<Service>, user_id: UserId, text: String) {
    let speaker = user_id.clone();
    let options = ProcessOptions::new()
        .with_reply(move |reply| println!("[{speaker}] {reply}"))
        .with_instruction_args(json!({ "user": user_id.as_str() }));

    match service.process(&user_id, text, &options).await {
        Ok(produced) if produced.is_empty() => {
            tracing::debug!(user_id = %user_id, "Queued behind running exchange");
        }
        Ok(produced) => {
            tracing::debug!(user_id = %user_id, produced = produced.len(), "Exchange finished");
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Exchange failed");
        }
    }
}

fn additional_instructions(configured: &str, args: &JsonValue) -> String {
    match args["user"].as_str() {
        Some(user) if configured.is_empty() => format!("You are talking to {user}."),
        Some(user) => format!("{configured}\nYou are talking to {user}."),
        None => configured.to_string(),
    }
}
