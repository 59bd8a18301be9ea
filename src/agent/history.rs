use super::completion::ChatMessage;
use super::platform::ChannelMessage;

/// Reduce a chronological slice of channel messages into model conversation
/// order. The newest `limit` messages are kept; messages with neither content
/// nor attachments are dropped; consecutive non-assistant messages from the
/// same author collapse into one grouped user turn.
pub fn reduce_history(
    messages: &[ChannelMessage],
    bot_author: &str,
    limit: usize,
) -> Vec<ChatMessage> {
    let start = messages.len().saturating_sub(limit);
    let window = messages[start..]
        .iter()
        .filter(|m| !m.content.trim().is_empty() || !m.attachments.is_empty());

    let mut reduced: Vec<ChatMessage> = Vec::new();
    let mut group_author: Option<String> = None;
    let mut group: Vec<&ChannelMessage> = Vec::new();

    for message in window {
        if message.author == bot_author {
            flush_group(&mut reduced, &mut group_author, &mut group);
            reduced.push(ChatMessage::new("assistant", message.content.clone()));
            continue;
        }
        if group_author.as_deref() != Some(message.author.as_str()) {
            flush_group(&mut reduced, &mut group_author, &mut group);
            group_author = Some(message.author.clone());
        }
        group.push(message);
    }
    flush_group(&mut reduced, &mut group_author, &mut group);

    reduced
}

fn flush_group(
    reduced: &mut Vec<ChatMessage>,
    group_author: &mut Option<String>,
    group: &mut Vec<&ChannelMessage>,
) {
    let Some(author) = group_author.take() else {
        group.clear();
        return;
    };
    if group.is_empty() {
        return;
    }

    let mut blocks = Vec::with_capacity(group.len());
    for message in group.iter() {
        blocks.push(render_block(message));
    }
    reduced.push(ChatMessage::new(
        "user",
        format!("<user: {}>\n{}", author, blocks.join("\n")),
    ));
    group.clear();
}

fn render_block(message: &ChannelMessage) -> String {
    let mut block = format!("[#{} at {}]", message.id, message.timestamp.to_rfc3339());
    if let Some(reply_to) = &message.reply_to {
        block.push_str(&format!(" (reply to #{})", reply_to));
    }
    let content = message.content.trim();
    if !content.is_empty() {
        block.push(' ');
        block.push_str(content);
    }
    for attachment in &message.attachments {
        block.push_str("\n[attachment] ");
        block.push_str(attachment);
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: u32, author: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            id: id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, id).unwrap(),
            attachments: Vec::new(),
            reply_to: None,
        }
    }

    #[test]
    fn consecutive_same_author_messages_merge() {
        let history = vec![
            msg(1, "alice", "hey"),
            msg(2, "alice", "you there?"),
            msg(3, "bot", "yes"),
            msg(4, "alice", "cool"),
        ];
        let reduced = reduce_history(&history, "bot", 16);

        assert_eq!(reduced.len(), 3);
        assert_eq!(reduced[0].role, "user");
        assert!(reduced[0].content.starts_with("<user: alice>\n"));
        assert!(reduced[0].content.contains("[#1 at "));
        assert!(reduced[0].content.contains("hey"));
        assert!(reduced[0].content.contains("you there?"));
        assert_eq!(reduced[1].role, "assistant");
        assert_eq!(reduced[1].content, "yes");
        assert_eq!(reduced[2].role, "user");
        assert!(reduced[2].content.contains("cool"));
    }

    #[test]
    fn different_authors_do_not_merge() {
        let history = vec![msg(1, "alice", "one"), msg(2, "bob", "two")];
        let reduced = reduce_history(&history, "bot", 16);

        assert_eq!(reduced.len(), 2);
        assert!(reduced[0].content.starts_with("<user: alice>"));
        assert!(reduced[1].content.starts_with("<user: bob>"));
    }

    #[test]
    fn empty_messages_are_dropped_and_limit_keeps_newest() {
        let mut history: Vec<ChannelMessage> = (1..=20).map(|i| msg(i, "alice", "x")).collect();
        history.push(msg(21, "alice", "   "));
        let reduced = reduce_history(&history, "bot", 16);

        // One merged turn containing only the newest 16 non-empty messages.
        assert_eq!(reduced.len(), 1);
        assert!(!reduced[0].content.contains("[#5 at "));
        assert!(reduced[0].content.contains("[#6 at "));
        assert!(reduced[0].content.contains("[#20 at "));
    }

    #[test]
    fn reply_context_and_attachments_render_as_sub_blocks() {
        let mut with_reply = msg(2, "alice", "look");
        with_reply.reply_to = Some("1".to_string());
        with_reply.attachments.push("https://img.example/a.png".to_string());
        let reduced = reduce_history(&[with_reply], "bot", 16);

        assert!(reduced[0].content.contains("(reply to #1)"));
        assert!(reduced[0].content.contains("[attachment] https://img.example/a.png"));
    }
}
