use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// One message as the chat platform hands it to us.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<String>,
    pub reply_to: Option<String>,
}

/// Narrow capability surface handed to tool handlers and the outbound path.
/// Deliberately not the platform client itself, so handlers stay testable.
#[async_trait]
pub trait ChannelContext: Send + Sync {
    fn channel_id(&self) -> &str;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn fetch_message(&self, id: &str) -> Result<ChannelMessage>;

    async fn react(&self, id: &str, emoji: &str) -> Result<()>;
}

/// Terminal-backed channel used by the bundled binary: stdin lines are the
/// inbound stream, sends go to stdout. Keeps its own transcript so
/// fetch_message and history reduction behave like a real channel.
pub struct ConsoleChannel {
    transcript: Mutex<Vec<ChannelMessage>>,
    next_id: AtomicU64,
    bot_author: String,
}

impl ConsoleChannel {
    pub const CHANNEL_ID: &'static str = "console";

    pub fn new(bot_author: &str) -> Self {
        Self {
            transcript: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bot_author: bot_author.to_string(),
        }
    }

    pub fn bot_author(&self) -> &str {
        &self.bot_author
    }

    pub async fn record(&self, author: &str, content: &str) -> ChannelMessage {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = ChannelMessage {
            id: id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
            reply_to: None,
        };
        self.transcript.lock().await.push(message.clone());
        message
    }

    pub async fn recent(&self, limit: usize) -> Vec<ChannelMessage> {
        let transcript = self.transcript.lock().await;
        let start = transcript.len().saturating_sub(limit);
        transcript[start..].to_vec()
    }
}

#[async_trait]
impl ChannelContext for ConsoleChannel {
    fn channel_id(&self) -> &str {
        Self::CHANNEL_ID
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        println!("{}", text);
        self.record(&self.bot_author, text).await;
        Ok(())
    }

    async fn fetch_message(&self, id: &str) -> Result<ChannelMessage> {
        self.transcript
            .lock()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("message {} not found in this channel", id))
    }

    async fn react(&self, id: &str, emoji: &str) -> Result<()> {
        println!("[reacted to message {} with {}]", id, emoji);
        Ok(())
    }
}
