use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use url::Url;

use super::platform::ChannelContext;
use super::registry::{Tool, ToolRegistry};

const TENOR_API_KEY: &str = "LIVDSRZULELA"; // public Tenor v1 key
const TENOR_LIMIT: usize = 8;
const DEFAULT_SEARCH_RELAY: &str = "https://brave.amorb.dev";

/// Build the process-wide registry with every built-in tool behind one shared
/// HTTP client.
pub fn default_registry() -> Result<ToolRegistry> {
    let client = Client::builder().build()?;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WeatherTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(CurrentTimeTool));
    registry.register(Arc::new(MessageTimestampTool));
    registry.register(Arc::new(WebSearchTool {
        client: client.clone(),
        base_url: DEFAULT_SEARCH_RELAY.to_string(),
    }));
    registry.register(Arc::new(GifSearchTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(CallApiTool { client }));
    registry.register(Arc::new(ReplyTool));
    registry.register(Arc::new(ReactTool));
    Ok(registry)
}

/// Open-meteo current conditions.
pub struct WeatherTool {
    client: Client,
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather information for a location"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": {"type": "number", "description": "The latitude coordinate"},
                "longitude": {"type": "number", "description": "The longitude coordinate"},
            },
            "required": ["latitude", "longitude"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        _ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let latitude = args.get("latitude").and_then(Value::as_f64);
        let longitude = args.get("longitude").and_then(Value::as_f64);
        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            return Ok(
                "Failed to get weather information: latitude and longitude are required."
                    .to_string(),
            );
        };

        let result: Result<Value> = async {
            let url = Url::parse_with_params(
                "https://api.open-meteo.com/v1/forecast",
                &[
                    ("latitude", latitude.to_string()),
                    ("longitude", longitude.to_string()),
                    (
                        "current",
                        "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m"
                            .to_string(),
                    ),
                ],
            )?;
            let resp = self.client.get(url).send().await?;
            if !resp.status().is_success() {
                anyhow::bail!("API responded with status: {}", resp.status());
            }
            Ok(resp.json::<Value>().await?)
        }
        .await;

        match result {
            Ok(data) => Ok(format_weather(&data).unwrap_or_else(|| {
                "Failed to get weather information: unexpected response shape.".to_string()
            })),
            Err(e) => Ok(format!("Failed to get weather information: {}", e)),
        }
    }
}

fn format_weather(data: &Value) -> Option<String> {
    let current = data.get("current")?;
    let units = data.get("current_units")?;
    let code = current.get("weather_code").and_then(Value::as_u64)?;
    Some(format!(
        "Current weather: {}, {}{}, humidity {}{}, wind speed {}{}.",
        weather_description(code),
        current.get("temperature_2m")?,
        units.get("temperature_2m").and_then(Value::as_str)?,
        current.get("relative_humidity_2m")?,
        units.get("relative_humidity_2m").and_then(Value::as_str)?,
        current.get("wind_speed_10m")?,
        units.get("wind_speed_10m").and_then(Value::as_str)?,
    ))
}

fn weather_description(code: u64) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        95 => "Thunderstorm",
        _ => "Unknown weather condition",
    }
}

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time."
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
        Ok(format!(
            "Current time: {}",
            Utc::now().format("%A %-d %B %Y, %H:%M:%S UTC")
        ))
    }
}

pub struct MessageTimestampTool;

#[async_trait]
impl Tool for MessageTimestampTool {
    fn name(&self) -> &str {
        "get_message_timestamp"
    }

    fn description(&self) -> &str {
        "Get the timestamp of a specific message."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": {"type": "string", "description": "The ID of the message."},
            },
            "required": ["message_id"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let message_id = args.get("message_id").and_then(Value::as_str).unwrap_or("");
        match ctx.fetch_message(message_id).await {
            Ok(message) => Ok(format!(
                "Message {} was sent on: {}",
                message_id,
                message.timestamp.format("%A %-d %B %Y, %H:%M:%S UTC")
            )),
            Err(e) => {
                warn!("Failed to fetch message timestamp for {}: {}", message_id, e);
                Ok(format!(
                    "Failed to fetch timestamp for message {}.",
                    message_id
                ))
            }
        }
    }
}

/// Web search through a relay that answers `{ "result": "..." }`.
pub struct WebSearchTool {
    client: Client,
    base_url: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for a query"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"},
            },
            "required": ["query"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        _ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");

        let result: Result<Value> = async {
            let url = Url::parse_with_params(
                &format!("{}/search", self.base_url.trim_end_matches('/')),
                &[("q", query)],
            )?;
            let resp = self.client.get(url).send().await?;
            if !resp.status().is_success() {
                anyhow::bail!("API responded with status: {}", resp.status());
            }
            Ok(resp.json::<Value>().await?)
        }
        .await;

        match result {
            Ok(data) => Ok(data
                .get("result")
                .and_then(Value::as_str)
                .unwrap_or("No results found.")
                .to_string()),
            Err(e) => Ok(format!("Failed to get web search results: {}", e)),
        }
    }
}

/// Tenor v1 GIF search.
pub struct GifSearchTool {
    client: Client,
}

#[async_trait]
impl Tool for GifSearchTool {
    fn name(&self) -> &str {
        "search_gifs"
    }

    fn description(&self) -> &str {
        "Search for GIFs on Tenor. Returns list of GIFs and their URLs to send to chat."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search term for the GIF (e.g., 'anime sob', 'dancing cat').",
                },
            },
            "required": ["query"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        _ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let query = args.get("query").and_then(Value::as_str).unwrap_or("");
        if query.is_empty() {
            return Ok("Error: A search query must be provided to find GIFs.".to_string());
        }

        let limit = TENOR_LIMIT.to_string();
        let result: Result<Value> = async {
            let url = Url::parse_with_params(
                "https://g.tenor.com/v1/search",
                &[("q", query), ("key", TENOR_API_KEY), ("limit", limit.as_str())],
            )?;
            let resp = self.client.get(url).send().await?;
            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Tenor API responded with status {}: {}", status, body);
            }
            Ok(resp.json::<Value>().await?)
        }
        .await;

        match result {
            Ok(data) => Ok(simplify_gif_results(&data, query)),
            Err(e) => Ok(format!("Failed to search for GIFs: {}", e)),
        }
    }
}

fn simplify_gif_results(data: &Value, query: &str) -> String {
    let results = data.get("results").and_then(Value::as_array);
    let results = match results {
        Some(r) if !r.is_empty() => r,
        _ => return format!("No GIFs were found for the query: \"{}\"", query),
    };

    let simplified: Vec<Value> = results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            let media = result.get("media").and_then(|m| m.get(0));
            let gif_url = media
                .and_then(|m| m.pointer("/gif/url"))
                .or_else(|| media.and_then(|m| m.pointer("/tinygif/url")))
                .or_else(|| result.get("url"))
                .and_then(Value::as_str)
                .unwrap_or("");
            json!({
                "choice_id": index + 1,
                "description": result
                    .get("content_description")
                    .and_then(Value::as_str)
                    .unwrap_or("A relevant GIF."),
                "url": gif_url,
            })
        })
        .collect();

    format!(
        "[GIF Search Results for \"{}\"]:\n{}",
        query,
        serde_json::to_string_pretty(&simplified).unwrap_or_else(|_| "[]".to_string())
    )
}

/// Generic HTTP fetch for free, unauthenticated JSON APIs.
pub struct CallApiTool {
    client: Client,
}

#[async_trait]
impl Tool for CallApiTool {
    fn name(&self) -> &str {
        "call_api"
    }

    fn description(&self) -> &str {
        "Makes an HTTP request to a specified API endpoint for real-time data and returns the response. \
Supports different methods, headers, and request bodies. Useful for fetching data from free APIs without authentication."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "The URL of the API endpoint to call."},
                "method": {
                    "type": "string",
                    "description": "The HTTP method to use. Defaults to GET.",
                    "default": "GET",
                },
                "headers": {"type": "object", "description": "A JSON object containing the request headers."},
                "body": {"type": "object", "description": "A JSON object containing the request body."},
            },
            "required": ["url"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        _ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let url = args.get("url").and_then(Value::as_str).unwrap_or("");
        if url.is_empty() {
            return Ok("Error: No URL was provided to call.".to_string());
        }
        let method_name = args.get("method").and_then(Value::as_str).unwrap_or("GET");
        let Some(method) = parse_http_method(method_name) else {
            return Ok(format!(
                "Error making API call: unsupported method '{}'",
                method_name
            ));
        };

        let result: Result<(reqwest::StatusCode, String)> = async {
            let mut request = self
                .client
                .request(method, url)
                .header("Content-Type", "application/json");
            if let Some(headers) = args.get("headers").and_then(Value::as_object) {
                for (key, value) in headers {
                    if let Some(value) = value.as_str() {
                        request = request.header(key, value);
                    }
                }
            }
            if let Some(body) = args.get("body") {
                if !body.is_null() {
                    request = request.json(body);
                }
            }
            let resp = request.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            Ok((status, body))
        }
        .await;

        match result {
            Ok((status, body)) if status.is_success() => {
                Ok(format!("Status: {}\n\nResponse Body:\n{}", status, body))
            }
            Ok((status, body)) => Ok(format!(
                "Error: API call failed with status {}\n\nResponse Body:\n{}",
                status, body
            )),
            Err(e) => Ok(format!("Error making API call: {}", e)),
        }
    }
}

fn parse_http_method(name: &str) -> Option<reqwest::Method> {
    match name.trim().to_ascii_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "DELETE" => Some(reqwest::Method::DELETE),
        "PATCH" => Some(reqwest::Method::PATCH),
        "HEAD" => Some(reqwest::Method::HEAD),
        "OPTIONS" => Some(reqwest::Method::OPTIONS),
        _ => None,
    }
}

/// Reply to a specific message through the ambient channel.
pub struct ReplyTool;

#[async_trait]
impl Tool for ReplyTool {
    fn name(&self) -> &str {
        "specifically_reply_to_message"
    }

    fn description(&self) -> &str {
        "Reply to a specific message in the current channel. Only use when relevant."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "ID of message to reply to."},
                "message": {"type": "string", "description": "Text content to send as the reply."},
            },
            "required": ["id", "message"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let id = args.get("id").and_then(Value::as_str).unwrap_or("");
        let reply = args.get("message").and_then(Value::as_str).unwrap_or("");
        if id.is_empty() || reply.is_empty() {
            return Ok("Error: Both 'id' and 'message' parameters are required.".to_string());
        }

        if let Err(e) = ctx.fetch_message(id).await {
            warn!("Reply target lookup failed: {}", e);
            return Ok(format!("Error: Message with ID {} could not be found.", id));
        }
        match ctx
            .send_text(&format!("> replying to #{}\n{}", id, reply))
            .await
        {
            Ok(()) => Ok(format!("Successfully replied to message ID {}", id)),
            Err(e) => Ok(format!("Failed to reply to message ID {}: {}", id, e)),
        }
    }
}

/// React to a message with unicode emojis.
pub struct ReactTool;

#[async_trait]
impl Tool for ReactTool {
    fn name(&self) -> &str {
        "react_to_message"
    }

    fn description(&self) -> &str {
        "React to a specific message with one or more standard unicode emojis. Does not work with ascii emoticons."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "ID of message to react to."},
                "reactions": {
                    "type": "array",
                    "description": "Array of unicode emojis as reactions.",
                    "items": {"type": "string"},
                },
            },
            "required": ["id", "reactions"],
        })
    }

    async fn execute(
        &self,
        args: &Value,
        _last_user_content: &str,
        ctx: &dyn ChannelContext,
    ) -> Result<String> {
        let id = args.get("id").and_then(Value::as_str).unwrap_or("");
        let reactions: Vec<&str> = args
            .get("reactions")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if id.is_empty() {
            return Ok("Error: Both 'id' and 'reactions' parameters are required.".to_string());
        }
        if reactions.is_empty() {
            return Ok(
                "Error: The 'reactions' parameter must be a non-empty array of emojis."
                    .to_string(),
            );
        }

        for emoji in &reactions {
            if let Err(e) = ctx.react(id, emoji).await {
                return Ok(format!("Failed to react to message ID {}: {}", id, e));
            }
        }
        Ok(format!(
            "Successfully reacted to message ID {} with emojis: {}",
            id,
            reactions.join(", ")
        ))
    }
}
