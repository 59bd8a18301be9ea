use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::platform::ChannelContext;

/// Core trait all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema: `properties` map, `required` list, optional per-property
    /// `default` values.
    fn parameters(&self) -> Value;

    /// Execute with decoded arguments, the content of the most recent
    /// non-tool message, and the ambient channel.
    async fn execute(
        &self,
        args: &Value,
        last_user_content: &str,
        ctx: &dyn ChannelContext,
    ) -> Result<String>;
}

/// Immutable-after-startup tool set, keyed by name. Registration order is
/// kept for the manifest; registering a duplicate name replaces the earlier
/// entry.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        info!("Registering tool: {}", name);
        if let Some(&slot) = self.index.get(&name) {
            self.tools[slot] = tool;
        } else {
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| self.tools[slot].clone())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Natural-language manifest for prompt injection, one line per tool:
    /// `name(param?: type = default, ...): description`.
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .map(|tool| {
                let schema = tool.parameters();
                format!(
                    "{}({}): {}",
                    tool.name(),
                    render_params(&schema),
                    tool.description()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_params(schema: &Value) -> String {
    let empty = Map::new();
    let props = schema
        .get("properties")
        .and_then(|v| v.as_object())
        .unwrap_or(&empty);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    props
        .iter()
        .map(|(key, prop)| {
            let ty = prop.get("type").and_then(|v| v.as_str()).unwrap_or("any");
            let optional = if required.contains(&key.as_str()) { "" } else { "?" };
            let mut rendered = format!("{}{}: {}", key, optional, ty);
            if let Some(default) = prop.get("default") {
                if let Some(shown) = render_default(default) {
                    rendered.push_str(" = ");
                    rendered.push_str(&shown);
                }
            }
            rendered
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Blank-ish defaults (null, false, 0, "") would render as noise; leave them
/// off the manifest line.
fn render_default(default: &Value) -> Option<String> {
    match default {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::Bool(true) => Some("true".to_string()),
        Value::Number(n) => {
            if n.as_f64() == Some(0.0) {
                None
            } else {
                Some(n.to_string())
            }
        }
        Value::String(s) => {
            if s.is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        other => Some(other.to_string()),
    }
}
