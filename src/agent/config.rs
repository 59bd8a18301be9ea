use std::time::Duration;

/// One entry in the ordered model list. The completion client overlays the
/// active entry onto every outbound request.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub completion_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub switch_on_timeout: bool,
    pub max_turns: u32,
    pub history_limit: usize,
    /// When set, inbound triggers from any other channel are ignored.
    pub channel: Option<String>,
    pub persona_prompt: String,
    pub format_prompt: String,
    pub tools_usage_prompt: String,
    pub models: Vec<ModelConfig>,
}

/// Ordered fallback list; index 0 is the startup model.
pub fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            model: "nvidia/llama-3.1-nemotron-ultra-253b-v1".to_string(),
            temperature: 0.6,
            top_p: 0.7,
            max_tokens: 4096,
            stream: false,
        },
        ModelConfig {
            model: "nvidia/llama-3.3-nemotron-super-49b-v1.5".to_string(),
            temperature: 0.6,
            top_p: 0.95,
            max_tokens: 65536,
            stream: false,
        },
    ]
}

pub const DEFAULT_PERSONA_PROMPT: &str = "You are a casual, helpful chat participant. Keep replies short and \
conversational; match the tone of the room. If you have nothing worth saying, reply with exactly <NULL>.";

pub const DEFAULT_FORMAT_PROMPT: &str = "Reply in plain text. Never show your internal reasoning; anything \
between <think> tags is discarded before sending.";

pub const DEFAULT_TOOLS_USAGE_PROMPT: &str = "To call a tool, emit a self-closing tag anywhere in your reply, \
for example <get_weather latitude=\"51.5\" longitude=\"-0.1\"/>, or the generic form \
<tool name=\"get_weather\" latitude=\"51.5\" longitude=\"-0.1\"/>. Attribute values must be quoted. You may \
emit several tags in one reply. Text outside the tags is shown to the chat as-is. After the tool results \
arrive you will be asked to continue; only then give your final answer.";
