//! Session synchronizer: the client's view of identity, roster and log.
//!
//! [`SessionState`] is a reducer. Inbound events are folded in with
//! [`SessionState::apply`], which returns the side effects the caller must
//! carry out (sends, persistence, notices). Nothing here touches the
//! network or the disk.

use std::collections::BTreeMap;

use chrono::Utc;

use relaychat_protocol::{
    ChatMessage, Event, FileContent, MessageBody, MessageType, PresenceNotice, StoredFile, User,
};

/// Side effect requested by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send this event to the bridge.
    Send(Event),
    PersistIdentity(User),
    ClearIdentity,
    /// Show an error to the user.
    Error(String),
    /// Show an informational notice to the user.
    Notice(String),
}

/// Why a local message could not be composed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("no conversation selected")]
    NoPeerSelected,

    #[error("message is empty")]
    EmptyContent,

    #[error("attachment too large ({size} > {max} bytes)")]
    AttachmentTooLarge { size: usize, max: usize },
}

/// Client-side session state.
#[derive(Debug, Default)]
pub struct SessionState {
    current_user: Option<User>,
    /// Keyed by email, so iteration order is stable.
    roster: BTreeMap<String, User>,
    log: Vec<ChatMessage>,
    selected_peer: Option<String>,
    stored_files: Vec<StoredFile>,
    last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State restored from a persisted identity.
    pub fn with_identity(user: User) -> Self {
        Self {
            current_user: Some(user),
            ..Self::default()
        }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    pub fn current_email(&self) -> Option<&str> {
        self.current_user.as_ref().map(|u| u.email.as_str())
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn roster(&self) -> impl Iterator<Item = &User> {
        self.roster.values()
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    pub fn user(&self, email: &str) -> Option<&User> {
        self.roster.get(email)
    }

    /// Roster without the current user.
    pub fn peers(&self) -> Vec<&User> {
        let me = self.current_email();
        self.roster
            .values()
            .filter(|u| Some(u.email.as_str()) != me)
            .collect()
    }

    /// Every log entry, in arrival order.
    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn selected_peer(&self) -> Option<&str> {
        self.selected_peer.as_deref()
    }

    pub fn stored_files(&self) -> &[StoredFile] {
        &self.stored_files
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Log entries exchanged between the current user and the selected
    /// peer, in either direction.
    pub fn conversation(&self) -> Vec<&ChatMessage> {
        match (self.current_email(), self.selected_peer.as_deref()) {
            (Some(me), Some(peer)) => self.log.iter().filter(|m| m.is_between(me, peer)).collect(),
            _ => Vec::new(),
        }
    }

    /// Folds one inbound event into the state.
    pub fn apply(&mut self, event: &Event) -> Vec<Effect> {
        match event {
            Event::LoginSuccess(user) => {
                self.current_user = Some(user.clone());
                self.last_error = None;
                vec![
                    Effect::PersistIdentity(user.clone()),
                    Effect::Send(self.roster_request()),
                ]
            }
            Event::RegisterSuccess { message } => vec![Effect::Notice(
                message
                    .clone()
                    .unwrap_or_else(|| "registration successful".to_string()),
            )],
            Event::UserList(users) => {
                self.roster = users
                    .iter()
                    .map(|u| (u.email.clone(), u.clone()))
                    .collect();
                Vec::new()
            }
            Event::UserJoined(notice) => self.presence_changed(notice, "joined"),
            Event::UserLeft(notice) => self.presence_changed(notice, "left"),
            Event::Chat(msg) | Event::File(msg) => {
                self.log.push(msg.clone());
                Vec::new()
            }
            Event::History { messages, .. } => {
                self.log = messages.clone();
                Vec::new()
            }
            Event::FilesList(files) => {
                self.log.extend(files.iter().map(StoredFile::to_log_entry));
                self.stored_files = files.clone();
                Vec::new()
            }
            Event::Error { message } => {
                self.last_error = Some(message.clone());
                vec![Effect::Error(message.clone())]
            }
            _ => Vec::new(),
        }
    }

    /// Roster changes are never patched locally; the full list is
    /// requested again instead.
    fn presence_changed(&self, notice: &PresenceNotice, verb: &str) -> Vec<Effect> {
        let mut effects = vec![Effect::Send(self.roster_request())];
        let who = notice
            .username
            .as_deref()
            .or(notice.email.as_deref())
            .unwrap_or("someone");
        let text = notice
            .text
            .clone()
            .unwrap_or_else(|| format!("{who} {verb} the chat"));
        effects.push(Effect::Notice(text));
        effects
    }

    pub fn roster_request(&self) -> Event {
        Event::GetUsers {
            sender: self.current_email().map(str::to_string),
        }
    }

    pub fn history_request(&self) -> Event {
        Event::GetHistory {
            sender: self.current_email().map(str::to_string),
        }
    }

    pub fn files_request(&self) -> Event {
        Event::GetFiles {
            sender: self.current_email().map(str::to_string),
        }
    }

    /// Selects the conversation peer.
    ///
    /// The log is cleared and the conversation history requested; the
    /// reply replaces the log when it arrives.
    pub fn select_peer(&mut self, peer: &str) -> Vec<Effect> {
        self.selected_peer = Some(peer.to_string());
        self.log.clear();
        vec![Effect::Send(Event::GetConversation {
            sender: self.current_email().map(str::to_string),
            peer: peer.to_string(),
        })]
    }

    /// Builds a private message to the selected peer.
    pub fn compose_message(&self, content: &str) -> Result<Event, ComposeError> {
        let user = self.current_user.as_ref().ok_or(ComposeError::NotLoggedIn)?;
        let peer = self
            .selected_peer
            .as_ref()
            .ok_or(ComposeError::NoPeerSelected)?;
        let text = content.trim();
        if text.is_empty() {
            return Err(ComposeError::EmptyContent);
        }

        Ok(Event::Chat(ChatMessage {
            kind: MessageType::PrivateMessage,
            sender: Some(user.email.clone()),
            sender_name: Some(user.display_name.clone()),
            receiver: Some(peer.clone()),
            body: MessageBody::Text(text.to_string()),
            timestamp: Some(Utc::now()),
        }))
    }

    /// Builds a public message for every connected user.
    pub fn compose_broadcast(&self, content: &str) -> Result<Event, ComposeError> {
        let user = self.current_user.as_ref().ok_or(ComposeError::NotLoggedIn)?;
        let text = content.trim();
        if text.is_empty() {
            return Err(ComposeError::EmptyContent);
        }

        Ok(Event::Chat(ChatMessage {
            kind: MessageType::Message,
            sender: Some(user.email.clone()),
            sender_name: Some(user.display_name.clone()),
            receiver: None,
            body: MessageBody::Text(text.to_string()),
            timestamp: Some(Utc::now()),
        }))
    }

    /// Builds a file share, rejecting payloads above `max_bytes`.
    pub fn compose_file(&self, file: FileContent, max_bytes: usize) -> Result<Event, ComposeError> {
        let user = self.current_user.as_ref().ok_or(ComposeError::NotLoggedIn)?;
        if file.is_empty() {
            return Err(ComposeError::EmptyContent);
        }
        if file.len() > max_bytes {
            return Err(ComposeError::AttachmentTooLarge {
                size: file.len(),
                max: max_bytes,
            });
        }

        Ok(Event::File(ChatMessage {
            kind: MessageType::File,
            sender: Some(user.email.clone()),
            sender_name: Some(user.display_name.clone()),
            receiver: self.selected_peer.clone(),
            body: MessageBody::File(file),
            timestamp: Some(Utc::now()),
        }))
    }

    /// Ends the session: notifies the backend, forgets the identity and
    /// clears everything derived from it.
    pub fn logout(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(user) = self.current_user.take() {
            effects.push(Effect::Send(Event::Logout {
                sender: Some(user.email),
            }));
        }
        effects.push(Effect::ClearIdentity);
        self.roster.clear();
        self.log.clear();
        self.selected_peer = None;
        self.stored_files.clear();
        self.last_error = None;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaychat_protocol::Role;

    fn alice() -> User {
        User::new("alice@x.io", "Alice", Role::Member)
    }

    fn chat(kind: MessageType, from: &str, to: Option<&str>, text: &str) -> ChatMessage {
        ChatMessage {
            kind,
            sender: Some(from.into()),
            sender_name: None,
            receiver: to.map(str::to_string),
            body: MessageBody::Text(text.into()),
            timestamp: None,
        }
    }

    fn decode(raw: &str) -> Event {
        Event::from_json(raw).unwrap()
    }

    #[test]
    fn login_success_sets_identity_and_requests_roster() {
        let mut s = SessionState::new();
        let effects = s.apply(&decode(
            r#"{"type":"login_success","email":"alice@x.io","username":"Alice","userType":"member"}"#,
        ));

        assert_eq!(s.current_user(), Some(&alice()));
        assert_eq!(
            effects,
            vec![
                Effect::PersistIdentity(alice()),
                Effect::Send(Event::GetUsers {
                    sender: Some("alice@x.io".into())
                }),
            ]
        );
    }

    #[test]
    fn user_list_replaces_roster() {
        let mut s = SessionState::new();
        s.apply(&decode(
            r#"{"type":"user_list","users":[{"email":"b@x.io","username":"B"},{"email":"a@x.io","username":"A"}]}"#,
        ));
        assert_eq!(s.roster_len(), 2);

        s.apply(&decode(r#"{"type":"user_list","users":[{"email":"c@x.io"}]}"#));
        let emails: Vec<_> = s.roster().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["c@x.io"]);
    }

    #[test]
    fn roster_iterates_in_email_order() {
        let mut s = SessionState::new();
        s.apply(&Event::UserList(vec![
            User::new("zed@x.io", "Z", Role::Member),
            User::new("amy@x.io", "A", Role::Admin),
        ]));
        let emails: Vec<_> = s.roster().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["amy@x.io", "zed@x.io"]);
    }

    #[test]
    fn presence_changes_request_fresh_roster() {
        let mut s = SessionState::with_identity(alice());
        s.apply(&Event::UserList(vec![alice()]));

        let effects = s.apply(&decode(
            r#"{"type":"user_joined","sender":"bob@x.io","username":"Bob","content":"Bob joined the chat"}"#,
        ));
        assert_eq!(
            effects,
            vec![
                Effect::Send(Event::GetUsers {
                    sender: Some("alice@x.io".into())
                }),
                Effect::Notice("Bob joined the chat".into()),
            ]
        );
        // Not patched locally.
        assert_eq!(s.roster_len(), 1);

        let effects = s.apply(&decode(r#"{"type":"user_left","sender":"bob@x.io"}"#));
        assert!(matches!(effects[0], Effect::Send(Event::GetUsers { .. })));
        assert_eq!(effects[1], Effect::Notice("bob@x.io left the chat".into()));
    }

    #[test]
    fn chat_messages_append_in_order() {
        let mut s = SessionState::new();
        for i in 0..3 {
            s.apply(&Event::Chat(chat(
                MessageType::Message,
                "a@x.io",
                None,
                &format!("m{i}"),
            )));
        }
        let texts: Vec<_> = s.log().iter().filter_map(|m| m.body.as_text()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn history_replaces_log() {
        let mut s = SessionState::new();
        s.apply(&Event::Chat(chat(MessageType::Message, "a@x.io", None, "old")));
        s.apply(&decode(
            r#"{"type":"conversation_history","messages":[
                {"sender":"a@x.io","receiver":"b@x.io","content":"h1"},
                {"sender":"b@x.io","receiver":"a@x.io","content":"h2"}]}"#,
        ));
        let texts: Vec<_> = s.log().iter().filter_map(|m| m.body.as_text()).collect();
        assert_eq!(texts, vec!["h1", "h2"]);
    }

    #[test]
    fn conversation_filters_by_unordered_pair() {
        let mut s = SessionState::with_identity(alice());
        s.select_peer("bob@x.io");
        for m in [
            chat(MessageType::PrivateMessage, "alice@x.io", Some("bob@x.io"), "1"),
            chat(MessageType::PrivateMessage, "bob@x.io", Some("alice@x.io"), "2"),
            chat(MessageType::PrivateMessage, "carol@x.io", Some("alice@x.io"), "3"),
            chat(MessageType::Message, "bob@x.io", None, "4"),
        ] {
            s.apply(&Event::Chat(m));
        }

        let texts: Vec<_> = s
            .conversation()
            .iter()
            .filter_map(|m| m.body.as_text())
            .collect();
        assert_eq!(texts, vec!["1", "2"]);
    }

    #[test]
    fn select_peer_clears_log_and_requests_history() {
        let mut s = SessionState::with_identity(alice());
        s.apply(&Event::Chat(chat(MessageType::Message, "a@x.io", None, "x")));

        let effects = s.select_peer("bob@x.io");
        assert!(s.log().is_empty());
        assert_eq!(s.selected_peer(), Some("bob@x.io"));
        assert_eq!(
            effects,
            vec![Effect::Send(Event::GetConversation {
                sender: Some("alice@x.io".into()),
                peer: "bob@x.io".into(),
            })]
        );
    }

    #[test]
    fn error_is_recorded_and_surfaced() {
        let mut s = SessionState::new();
        let effects = s.apply(&decode(r#"{"type":"error","content":"Invalid credentials"}"#));
        assert_eq!(s.last_error(), Some("Invalid credentials"));
        assert_eq!(effects, vec![Effect::Error("Invalid credentials".into())]);
    }

    #[test]
    fn unknown_and_request_events_are_ignored() {
        let mut s = SessionState::with_identity(alice());
        assert!(s.apply(&decode(r#"{"type":"presence_ping"}"#)).is_empty());
        assert!(s.apply(&Event::GetUsers { sender: None }).is_empty());
        assert!(s.log().is_empty());
    }

    #[test]
    fn files_list_appends_file_entries() {
        let mut s = SessionState::new();
        s.apply(&decode(
            r#"{"type":"files_list","files":[
                {"id":1,"filename":"a.txt","fileType":"text/plain","sender":"a@x.io","data":"data:text/plain;base64,aGk="}]}"#,
        ));
        assert_eq!(s.stored_files().len(), 1);
        assert_eq!(s.log().len(), 1);
        assert_eq!(s.log()[0].kind, MessageType::File);
        assert_eq!(s.log()[0].body.as_file().unwrap().filename(), "a.txt");
    }

    #[test]
    fn compose_requires_login_peer_and_content() {
        let mut s = SessionState::new();
        assert_eq!(s.compose_message("hi"), Err(ComposeError::NotLoggedIn));

        s.apply(&Event::LoginSuccess(alice()));
        assert_eq!(s.compose_message("hi"), Err(ComposeError::NoPeerSelected));

        s.select_peer("bob@x.io");
        assert_eq!(s.compose_message("   "), Err(ComposeError::EmptyContent));

        let Ok(Event::Chat(msg)) = s.compose_message("  hello ") else {
            panic!("expected chat event");
        };
        assert_eq!(msg.kind, MessageType::PrivateMessage);
        assert_eq!(msg.sender.as_deref(), Some("alice@x.io"));
        assert_eq!(msg.receiver.as_deref(), Some("bob@x.io"));
        assert_eq!(msg.body.as_text(), Some("hello"));
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn broadcast_needs_no_peer() {
        let s = SessionState::with_identity(alice());
        let Ok(Event::Chat(msg)) = s.compose_broadcast("hello all") else {
            panic!("expected chat event");
        };
        assert_eq!(msg.kind, MessageType::Message);
        assert!(msg.receiver.is_none());
    }

    #[test]
    fn compose_file_enforces_size_limit() {
        let s = SessionState::with_identity(alice());
        let file = FileContent::new("a.bin", "application/octet-stream", vec![0u8; 10]);

        assert_eq!(
            s.compose_file(file.clone(), 4),
            Err(ComposeError::AttachmentTooLarge { size: 10, max: 4 })
        );
        let Ok(Event::File(msg)) = s.compose_file(file, 10) else {
            panic!("expected file event");
        };
        assert_eq!(msg.body.as_file().unwrap().len(), 10);
    }

    #[test]
    fn logout_notifies_and_clears() {
        let mut s = SessionState::with_identity(alice());
        s.apply(&Event::UserList(vec![alice()]));
        s.select_peer("bob@x.io");

        let effects = s.logout();
        assert_eq!(
            effects,
            vec![
                Effect::Send(Event::Logout {
                    sender: Some("alice@x.io".into())
                }),
                Effect::ClearIdentity,
            ]
        );
        assert!(!s.is_logged_in());
        assert_eq!(s.roster_len(), 0);
        assert!(s.selected_peer().is_none());
    }

    #[test]
    fn peers_excludes_self() {
        let mut s = SessionState::with_identity(alice());
        s.apply(&Event::UserList(vec![
            alice(),
            User::new("bob@x.io", "Bob", Role::Member),
        ]));
        let peers: Vec<_> = s.peers().iter().map(|u| u.email.as_str()).collect();
        assert_eq!(peers, vec!["bob@x.io"]);
    }
}
