use std::sync::Arc;

use anyhow::Context;
use coverwise_agent::{
    AgentRuntime, CollectionAgent, ConversationTurn, FieldExtractor, IntentClassifier, LlmClient,
    LlmFieldExtractor, OpenAiCompatibleClient,
};
use coverwise_core::config::{AppConfig, LoadOptions};
use coverwise_core::domain::product::ProductCatalog;
use coverwise_core::domain::session::SessionId;
use coverwise_db::{InMemorySessionRepository, SessionRepository};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use uuid::Uuid;

use super::CommandResult;

const PROMPT: &str = "you> ";
const EXIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

pub fn run(session: Option<String>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("chat", "config", error.to_string(), 2),
    };
    crate::init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    let session_id = SessionId::new(session.unwrap_or_else(|| Uuid::new_v4().to_string()));
    match runtime.block_on(start(&config, &session_id)) {
        Ok(turns) => {
            tracing::info!(
                event_name = "cli.chat_finished",
                session_id = %session_id,
                turns,
                "chat session ended"
            );
            CommandResult::text(0, "")
        }
        Err(error) => CommandResult::failure("chat", "chat", format!("{error:#}"), 1),
    }
}

async fn start(config: &AppConfig, session_id: &SessionId) -> anyhow::Result<usize> {
    let client = Arc::new(
        OpenAiCompatibleClient::from_config(config).context("failed to build LLM client")?,
    );
    let sessions = Arc::new(InMemorySessionRepository::default());
    let collection =
        CollectionAgent::new(LlmFieldExtractor::new(client.clone()), client.clone(), sessions)
            .with_agent_config(&config.agent);
    let classifier = IntentClassifier::new(client, config.agent.history_limit);
    let runtime = AgentRuntime::new(ProductCatalog::default(), collection, classifier);

    tracing::info!(
        event_name = "cli.chat_started",
        session_id = %session_id,
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "chat session started"
    );

    let mut output = tokio::io::stdout();
    output
        .write_all(
            format!("coverwise chat (session {session_id}); type /quit to leave\n").as_bytes(),
        )
        .await?;

    converse(
        &runtime,
        session_id,
        config.agent.history_limit,
        BufReader::new(tokio::io::stdin()),
        output,
    )
    .await
}

/// Runs the read-reply loop until end of input or an exit command and
/// returns the number of answered turns.
pub async fn converse<E, L, R, C, I, O>(
    runtime: &AgentRuntime<E, L, R, C>,
    session_id: &SessionId,
    history_limit: usize,
    input: I,
    mut output: O,
) -> anyhow::Result<usize>
where
    E: FieldExtractor,
    L: LlmClient,
    R: SessionRepository,
    C: LlmClient,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut turns = 0;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };
        let message = line.trim();
        if EXIT_COMMANDS.contains(&message) {
            break;
        }

        let reply = runtime.handle_turn(session_id, message, &history).await;
        output.write_all(format!("agent> {}\n", reply.text).as_bytes()).await?;

        history.push(ConversationTurn::user(message));
        history.push(ConversationTurn::assistant(reply.text));
        if history.len() > history_limit {
            let overflow = history.len() - history_limit;
            history.drain(..overflow);
        }
        turns += 1;
    }

    output.flush().await?;
    Ok(turns)
}
