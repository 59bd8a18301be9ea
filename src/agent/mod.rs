// Conversational agent modules
mod completion;
mod config;
mod dispatch;
mod error;
mod history;
mod makeshift;
mod outbound;
mod platform;
mod registry;
mod tools;
mod turn;

pub use config::{
    default_models, Config, DEFAULT_FORMAT_PROMPT, DEFAULT_PERSONA_PROMPT,
    DEFAULT_TOOLS_USAGE_PROMPT,
};

use anyhow::Result;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info};

use platform::ChannelContext;

const BOT_AUTHOR: &str = "banter";

/// Wire everything up and serve triggers from the console channel until the
/// input stream closes.
pub async fn run(config: Config) -> Result<()> {
    info!("Starting banter agent...");
    info!("Completion endpoint: {}", config.completion_url);

    let registry = Arc::new(tools::default_registry()?);
    info!("Registered {} tools", registry.len());

    let system_prompt = turn::build_system_prompt(
        &config.persona_prompt,
        &config.format_prompt,
        &registry.describe(),
        &config.tools_usage_prompt,
    );

    let completion = Arc::new(completion::CompletionClient::new(
        &config.completion_url,
        config.api_key.clone(),
        config.models.clone(),
        config.request_timeout,
        config.switch_on_timeout,
    )?);

    let responder = turn::Responder::new(completion, registry, system_prompt, config.max_turns);
    let channel = platform::ConsoleChannel::new(BOT_AUTHOR);

    let gated_out = config
        .channel
        .as_deref()
        .map(|gate| gate != channel.channel_id())
        .unwrap_or(false);
    if gated_out {
        info!(
            "Channel restriction '{}' does not cover '{}'; inbound messages will be ignored",
            config.channel.as_deref().unwrap_or(""),
            channel.channel_id()
        );
    }

    println!("banter agent ready; type a message and press enter (ctrl-d to exit)");

    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let inbound = channel.record("user", &line).await;
        if gated_out {
            continue;
        }
        if inbound.author == channel.bot_author() {
            continue;
        }

        let recent = channel.recent(config.history_limit).await;
        let conversation =
            history::reduce_history(&recent, channel.bot_author(), config.history_limit);

        match responder.respond(&conversation, &channel).await {
            Ok(reply) => {
                if let Err(e) = outbound::deliver(&channel, &reply).await {
                    error!("Failed to send reply: {}", e);
                }
            }
            Err(e) => {
                // Upstream failure: log and drop the reply for this trigger.
                error!("Error getting AI response: {}", e);
            }
        }
    }

    info!("Input stream closed, shutting down");
    Ok(())
}
