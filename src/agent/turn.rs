use std::sync::Arc;
use tracing::{debug, warn};

use super::completion::{ChatMessage, CompletionBackend, CompletionOptions, CompletionResult};
use super::dispatch::dispatch;
use super::error::{AgentError, Result};
use super::makeshift::parse_makeshift_calls;
use super::outbound::strip_think;
use super::platform::ChannelContext;
use super::registry::ToolRegistry;

/// Fixed user-facing reply when the completion endpoint times out.
pub const TIMEOUT_REPLY: &str = "The AI has timed out.";

/// System prompt assembly: persona, format rules, tools manifest, usage
/// guide, in that order.
pub fn build_system_prompt(persona: &str, format: &str, manifest: &str, usage: &str) -> String {
    format!(
        "{}\n\n{}\n\nYou have access to the following tools:\n{}\n\n{}",
        persona.trim(),
        format.trim(),
        manifest,
        usage.trim()
    )
}

/// Drives the multi-turn exchange: complete, parse, dispatch, repeat until a
/// reply carries no tool calls or the turn budget runs out.
pub struct Responder {
    completion: Arc<dyn CompletionBackend>,
    registry: Arc<ToolRegistry>,
    system_prompt: String,
    max_turns: u32,
}

impl Responder {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        registry: Arc<ToolRegistry>,
        system_prompt: String,
        max_turns: u32,
    ) -> Self {
        Self {
            completion,
            registry,
            system_prompt,
            max_turns,
        }
    }

    /// Produce the final reply for one trigger. Intermediate tool turns only
    /// touch a local copy of the message list; the caller's conversation is
    /// never mutated.
    pub async fn respond(
        &self,
        conversation: &[ChatMessage],
        ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::new("system", self.system_prompt.clone()));
        messages.extend_from_slice(conversation);

        // Commentary from the most recent tool-dispatching turn; used when
        // the terminating reply is empty.
        let mut pending_leftover = String::new();

        for turn in 0..self.max_turns {
            let result = match self
                .completion
                .complete(CompletionOptions {
                    messages: messages.clone(),
                })
                .await
            {
                Ok(result) => result,
                Err(AgentError::Timeout) => {
                    warn!("Completion timed out on turn {}; giving up", turn + 1);
                    return Ok(TIMEOUT_REPLY.to_string());
                }
                Err(e) => return Err(e),
            };

            let visible = visible_text(&result);
            let outcome = parse_makeshift_calls(&visible);

            let Some(calls) = outcome.tool_calls else {
                let final_text = outcome.leftover_text;
                return Ok(if final_text.is_empty() {
                    pending_leftover
                } else {
                    final_text
                });
            };

            debug!("Turn {} requested {} tool call(s)", turn + 1, calls.len());
            let results = dispatch(&calls, &messages, ctx, &self.registry).await;

            if !outcome.leftover_text.is_empty() {
                pending_leftover = outcome.leftover_text;
            }

            messages.push(ChatMessage::new("assistant", visible));
            for result in results {
                messages.push(ChatMessage {
                    role: result.role,
                    content: result.content,
                    name: Some(result.name),
                    tool_call_id: Some(result.tool_call_id),
                });
            }
        }

        warn!(
            "Turn budget of {} exhausted; replying with last tool-turn commentary",
            self.max_turns
        );
        Ok(pending_leftover)
    }
}

/// Pick the text a recipient could see: primary content, or the reasoning
/// channel when content is empty, with inline thought spans stripped either
/// way.
fn visible_text(result: &CompletionResult) -> String {
    let primary = result.content.as_deref().unwrap_or("").trim();
    let chosen = if primary.is_empty() {
        result.reasoning.as_deref().unwrap_or("").trim()
    } else {
        primary
    };
    strip_think(chosen).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::platform::ChannelMessage;
    use crate::agent::registry::Tool;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct NullContext;

    #[async_trait]
    impl ChannelContext for NullContext {
        fn channel_id(&self) -> &str {
            "test"
        }

        async fn send_text(&self, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn fetch_message(&self, id: &str) -> anyhow::Result<ChannelMessage> {
            Err(anyhow!("no message {}", id))
        }

        async fn react(&self, _id: &str, _emoji: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }

        async fn execute(
            &self,
            args: &Value,
            _last_user_content: &str,
            _ctx: &dyn ChannelContext,
        ) -> anyhow::Result<String> {
            Ok(format!("echo:{}", args["x"]))
        }
    }

    struct StubBackend {
        replies: Mutex<VecDeque<Result<CompletionResult>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl StubBackend {
        fn new(replies: Vec<Result<CompletionResult>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn text(content: &str) -> Result<CompletionResult> {
            Ok(CompletionResult {
                content: Some(content.to_string()),
                reasoning: None,
            })
        }

        async fn request_log(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn complete(&self, options: CompletionOptions) -> Result<CompletionResult> {
            self.requests.lock().await.push(options.messages);
            self.replies
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResult::default()))
        }
    }

    fn responder(backend: Arc<StubBackend>, max_turns: u32) -> Responder {
        let mut registry = ToolRegistry::new();
        registry.register(std::sync::Arc::new(EchoTool));
        Responder::new(backend, Arc::new(registry), "system text".to_string(), max_turns)
    }

    #[tokio::test]
    async fn timeout_resolves_to_the_apology_without_throwing() {
        let backend = StubBackend::new(vec![Err(AgentError::Timeout)]);
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "The AI has timed out.");
    }

    #[tokio::test]
    async fn non_timeout_failures_propagate() {
        let backend = StubBackend::new(vec![Err(AgentError::Model("upstream 500".to_string()))]);
        let err = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Model(_)));
    }

    #[tokio::test]
    async fn tagless_reply_is_returned_trimmed_verbatim() {
        let backend = StubBackend::new(vec![StubBackend::text("  plain answer  ")]);
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "plain answer");
    }

    #[tokio::test]
    async fn tool_turn_feeds_results_into_the_next_completion() {
        let backend = StubBackend::new(vec![
            StubBackend::text("checking <echo x=\"1\"/>"),
            StubBackend::text("final answer"),
        ]);
        let stub = backend.clone();
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "final answer");

        let requests = stub.request_log().await;
        assert_eq!(requests.len(), 2);
        // First request: system prompt then the conversation.
        assert_eq!(requests[0][0].role, "system");
        assert_eq!(requests[0][1].content, "hi");
        // Follow-up sees the assistant's raw reply and one tool result.
        let follow_up = &requests[1];
        assert_eq!(follow_up[2].role, "assistant");
        assert_eq!(follow_up[2].content, "checking <echo x=\"1\"/>");
        assert_eq!(follow_up[3].role, "tool");
        assert_eq!(follow_up[3].name.as_deref(), Some("echo"));
        assert_eq!(follow_up[3].content, "echo:1");
        assert!(follow_up[3].tool_call_id.is_some());
    }

    #[tokio::test]
    async fn empty_terminating_reply_falls_back_to_tool_turn_commentary() {
        let backend = StubBackend::new(vec![
            StubBackend::text("<echo x=\"1\"/> done checking"),
            StubBackend::text("<echo x=\"2\"/>"),
            StubBackend::text(""),
        ]);
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "done checking");
    }

    #[tokio::test]
    async fn empty_reply_with_no_tool_turns_yields_no_reply() {
        let backend = StubBackend::new(vec![StubBackend::text("")]);
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn turn_budget_bounds_the_cascade() {
        let backend = StubBackend::new(vec![
            StubBackend::text("<echo x=\"1\"/> still going"),
            StubBackend::text("<echo x=\"2\"/>"),
            StubBackend::text("<echo x=\"3\"/>"),
        ]);
        let stub = backend.clone();
        let reply = responder(backend, 2)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "still going");
        assert_eq!(stub.request_log().await.len(), 2);
    }

    #[tokio::test]
    async fn reasoning_channel_is_used_when_content_is_empty() {
        let backend = StubBackend::new(vec![Ok(CompletionResult {
            content: Some("".to_string()),
            reasoning: Some("answer from the side channel".to_string()),
        })]);
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "answer from the side channel");
    }

    #[tokio::test]
    async fn inline_thought_spans_never_reach_the_reply() {
        let backend =
            StubBackend::new(vec![StubBackend::text("<think>scheming</think>visible part")]);
        let reply = responder(backend, 8)
            .respond(&[ChatMessage::new("user", "hi")], &NullContext)
            .await
            .unwrap();
        assert_eq!(reply, "visible part");
    }
}
