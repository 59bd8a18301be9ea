use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[path = "../agent/mod.rs"]
mod agent;
#[path = "../shared/logging.rs"]
mod logging;

#[derive(Parser)]
#[command(name = "banter-agent")]
#[command(about = "Chat agent that drives an LLM and executes makeshift tool calls")]
struct Args {
    /// Completion endpoint base URL (OpenAI-compatible)
    #[arg(
        long,
        env = "BANTER_COMPLETION_URL",
        default_value = "https://integrate.api.nvidia.com/v1"
    )]
    completion_url: String,

    /// API key for the completion endpoint
    #[arg(long, env = "BANTER_API_KEY")]
    api_key: Option<String>,

    /// Directory holding prompt.txt, format.txt and tools.txt overrides
    #[arg(long, env = "BANTER_PROMPTS_DIR")]
    prompts_dir: Option<PathBuf>,

    /// Only process triggers from this channel id
    #[arg(long, env = "BANTER_CHANNEL")]
    channel: Option<String>,

    /// Per-request completion deadline in seconds
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Rotate to the next model configuration when a request times out
    #[arg(long)]
    switch_on_timeout: bool,

    /// Maximum chained completions per trigger
    #[arg(long, default_value_t = 8)]
    max_turns: u32,

    /// Number of recent messages folded into the model context
    #[arg(long, default_value_t = 16)]
    history_limit: usize,
}

fn load_prompt(dir: &Option<PathBuf>, file: &str, fallback: &str) -> String {
    match dir {
        Some(dir) => std::fs::read_to_string(dir.join(file)).unwrap_or_else(|e| {
            tracing::warn!("Could not read {} from {:?} ({}); using built-in text", file, dir, e);
            fallback.to_string()
        }),
        None => fallback.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _ = logging::init_service_logging("logs", "banter_agent");

    let config = agent::Config {
        completion_url: args.completion_url.clone(),
        api_key: args.api_key.clone(),
        request_timeout: Duration::from_secs(args.timeout_secs),
        switch_on_timeout: args.switch_on_timeout,
        max_turns: args.max_turns,
        history_limit: args.history_limit,
        channel: args.channel.clone(),
        persona_prompt: load_prompt(&args.prompts_dir, "prompt.txt", agent::DEFAULT_PERSONA_PROMPT),
        format_prompt: load_prompt(&args.prompts_dir, "format.txt", agent::DEFAULT_FORMAT_PROMPT),
        tools_usage_prompt: load_prompt(
            &args.prompts_dir,
            "tools.txt",
            agent::DEFAULT_TOOLS_USAGE_PROMPT,
        ),
        models: agent::default_models(),
    };

    agent::run(config).await
}
