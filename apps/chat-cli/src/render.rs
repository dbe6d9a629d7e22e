//! Terminal rendering of session updates.

use chrono::Local;

use relaychat_client::{ConnectionState, SessionUpdate};
use relaychat_protocol::{ChatMessage, Disposition, MessageBody, User};

/// Formats one update for display; `None` when there is nothing to show.
pub fn update(update: &SessionUpdate) -> Option<String> {
    let text = match update {
        SessionUpdate::Connection(state) => format!("* {}", connection(state)),
        SessionUpdate::Identity(Some(user)) => format!("* logged in as {}", user_line(user)),
        SessionUpdate::Identity(None) => "* logged out".to_string(),
        SessionUpdate::Roster(users) if users.is_empty() => return None,
        SessionUpdate::Roster(users) => {
            let mut out = format!("* {} user(s):", users.len());
            for user in users {
                out.push_str("\n    ");
                out.push_str(&user_line(user));
            }
            out
        }
        SessionUpdate::Message(msg) => message(msg),
        SessionUpdate::LogReplaced(log) if log.is_empty() => return None,
        SessionUpdate::LogReplaced(log) => log.iter().map(message).collect::<Vec<_>>().join("\n"),
        SessionUpdate::Typing(peers) if peers.is_empty() => return None,
        SessionUpdate::Typing(peers) => format!("* {} typing...", peers.join(", ")),
        SessionUpdate::Error(e) => format!("! {e}"),
        SessionUpdate::Notice(n) => format!("* {n}"),
    };
    Some(text)
}

fn connection(state: &ConnectionState) -> String {
    match state {
        ConnectionState::Disconnected => "disconnected".into(),
        ConnectionState::Connecting => "connecting...".into(),
        ConnectionState::Connected => "connected".into(),
        ConnectionState::Reconnecting { attempt } => format!("connection lost, retry {attempt}"),
        ConnectionState::Failed => "could not reach the server, use /connect to retry".into(),
    }
}

fn user_line(user: &User) -> String {
    let name = if user.display_name.is_empty() {
        user.email.as_str()
    } else {
        user.display_name.as_str()
    };
    format!("{name} <{}> [{:?}, {:?}]", user.email, user.role, user.presence).to_lowercase()
}

/// One log line.
pub fn message(msg: &ChatMessage) -> String {
    let time = msg
        .timestamp
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".into());
    let from = msg
        .sender_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or(msg.sender.as_deref())
        .unwrap_or("?");
    let to = msg
        .receiver
        .as_deref()
        .map(|r| format!(" -> {r}"))
        .unwrap_or_default();

    match &msg.body {
        MessageBody::Text(text) => format!("[{time}] {from}{to}: {text}"),
        MessageBody::File(file) => {
            let kind = match file.disposition() {
                Disposition::InlinePreview => "image",
                Disposition::Download => "file",
            };
            format!(
                "[{time}] {from}{to} shared {kind} {} ({}, {} bytes)",
                file.filename(),
                file.mime_type(),
                file.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaychat_protocol::{FileContent, MessageType, Role};

    fn text(from: &str, to: Option<&str>, body: &str) -> ChatMessage {
        ChatMessage {
            kind: MessageType::PrivateMessage,
            sender: Some(from.into()),
            sender_name: None,
            receiver: to.map(str::to_string),
            body: MessageBody::Text(body.into()),
            timestamp: None,
        }
    }

    #[test]
    fn text_message_line() {
        let line = message(&text("a@x.io", Some("b@x.io"), "hi"));
        assert_eq!(line, "[--:--] a@x.io -> b@x.io: hi");
    }

    #[test]
    fn file_message_line() {
        let mut msg = text("a@x.io", None, "");
        msg.body = MessageBody::File(FileContent::new("cat.png", "image/png", vec![1, 2, 3]));
        let line = message(&msg);
        assert!(line.contains("shared image cat.png"));
        assert!(line.contains("3 bytes"));
    }

    #[test]
    fn empty_updates_are_silent() {
        assert!(update(&SessionUpdate::Typing(vec![])).is_none());
        assert!(update(&SessionUpdate::Roster(vec![])).is_none());
        assert!(update(&SessionUpdate::LogReplaced(vec![])).is_none());
    }

    #[test]
    fn roster_lists_users() {
        let out = update(&SessionUpdate::Roster(vec![User::new(
            "b@x.io",
            "Bob",
            Role::Admin,
        )]))
        .unwrap();
        assert!(out.contains("bob <b@x.io> [admin, online]"));
    }

    #[test]
    fn failed_state_suggests_reconnect() {
        let out = update(&SessionUpdate::Connection(ConnectionState::Failed)).unwrap();
        assert!(out.contains("/connect"));
    }
}
