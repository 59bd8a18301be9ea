use futures::future::join_all;
use serde_json::Value;
use tracing::warn;

use super::completion::ChatMessage;
use super::makeshift::ParsedToolCall;
use super::platform::ChannelContext;
use super::registry::ToolRegistry;

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub role: String,
    pub name: String,
    pub content: String,
}

/// Run a batch of parsed calls. Sibling calls execute concurrently; results
/// come back in call order, one per call, no matter how individual handlers
/// fare.
pub async fn dispatch(
    calls: &[ParsedToolCall],
    conversation: &[ChatMessage],
    ctx: &dyn ChannelContext,
    registry: &ToolRegistry,
) -> Vec<ToolResult> {
    let last_user_content = conversation
        .iter()
        .rev()
        .find(|m| m.role != "tool")
        .map(|m| m.content.as_str())
        .unwrap_or("");

    let pending = calls.iter().map(|call| async move {
        let content = run_call(call, last_user_content, ctx, registry).await;
        ToolResult {
            tool_call_id: call.id.clone(),
            role: "tool".to_string(),
            name: call.name.clone(),
            content,
        }
    });

    join_all(pending).await
}

async fn run_call(
    call: &ParsedToolCall,
    last_user_content: &str,
    ctx: &dyn ChannelContext,
    registry: &ToolRegistry,
) -> String {
    let args: Value = match serde_json::from_str(&call.arguments) {
        Ok(v) => v,
        Err(e) => {
            warn!("Arguments for call {} failed to decode: {}", call.id, e);
            return format!("Error executing tool {}: invalid arguments ({})", call.name, e);
        }
    };

    let Some(tool) = registry.get(&call.name) else {
        return format!("No handler implemented for tool: {}", call.name);
    };

    match tool.execute(&args, last_user_content, ctx).await {
        Ok(content) => content,
        Err(e) => {
            warn!("Tool {} failed: {}", call.name, e);
            format!("Error executing tool {}: {}", call.name, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::platform::ChannelMessage;
    use crate::agent::registry::Tool;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct NullContext;

    #[async_trait]
    impl ChannelContext for NullContext {
        fn channel_id(&self) -> &str {
            "test"
        }

        async fn send_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn fetch_message(&self, id: &str) -> Result<ChannelMessage> {
            Err(anyhow!("no message {}", id))
        }

        async fn react(&self, _id: &str, _emoji: &str) -> Result<()> {
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
            "echoes its arguments and the originating request"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }

        async fn execute(
            &self,
            args: &Value,
            last_user_content: &str,
            _ctx: &dyn ChannelContext,
        ) -> Result<String> {
            Ok(format!("{} / {}", args["text"].as_str().unwrap_or(""), last_user_content))
        }
    }

    struct ExplodingTool;

    #[async_trait]
    impl Tool for ExplodingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }

        async fn execute(
            &self,
            _args: &Value,
            _last_user_content: &str,
            _ctx: &dyn ChannelContext,
        ) -> Result<String> {
            Err(anyhow!("boom"))
        }
    }

    fn call(id: &str, name: &str, arguments: &str) -> ParsedToolCall {
        ParsedToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn test_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(ExplodingTool));
        registry
    }

    #[tokio::test]
    async fn one_result_per_call_in_call_order() {
        let registry = test_registry();
        let conversation = vec![ChatMessage::new("user", "original request")];
        let calls = vec![
            call("c-0", "echo", r#"{"text":"hi"}"#),
            call("c-1", "explode", "{}"),
            call("c-2", "nonexistent", "{}"),
        ];

        let results = dispatch(&calls, &conversation, &NullContext, &registry).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].tool_call_id, "c-0");
        assert_eq!(results[0].role, "tool");
        assert_eq!(results[0].content, "hi / original request");
        assert_eq!(results[1].tool_call_id, "c-1");
        assert_eq!(results[1].content, "Error executing tool explode: boom");
        assert_eq!(results[2].tool_call_id, "c-2");
        assert_eq!(
            results[2].content,
            "No handler implemented for tool: nonexistent"
        );
    }

    #[tokio::test]
    async fn handler_sees_most_recent_non_tool_message() {
        let registry = test_registry();
        let conversation = vec![
            ChatMessage::new("user", "first"),
            ChatMessage::new("assistant", "calling a tool"),
            ChatMessage::new("tool", "a prior result"),
        ];
        let calls = vec![call("c-0", "echo", r#"{"text":"x"}"#)];

        let results = dispatch(&calls, &conversation, &NullContext, &registry).await;
        assert_eq!(results[0].content, "x / calling a tool");
    }

    #[tokio::test]
    async fn undecodable_arguments_become_an_error_result() {
        let registry = test_registry();
        let calls = vec![call("c-0", "echo", "not json")];

        let results = dispatch(&calls, &[], &NullContext, &registry).await;
        assert_eq!(results.len(), 1);
        assert!(results[0]
            .content
            .starts_with("Error executing tool echo: invalid arguments"));
    }
}
