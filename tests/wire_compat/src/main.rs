fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use relaychat_protocol::{Event, MessageBody, MessageType, Presence, Role};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture as raw JSON text, the way it arrives on the wire.
    fn load_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Decodes a fixture and checks that re-encoding it is a fixed point.
    fn decode_fixture(name: &str) -> Event {
        let raw = load_fixture(name);
        let event =
            Event::from_json(&raw).unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));

        let encoded = event
            .to_json()
            .unwrap_or_else(|e| panic!("failed to encode {name}: {e}"));
        let again = Event::from_json(&encoded)
            .unwrap_or_else(|e| panic!("re-encoded {name} does not decode: {e}\n  {encoded}"));
        assert_eq!(event, again, "re-encode mismatch for {name}:\n  {encoded}");
        event
    }

    // --- Backend fixtures ---

    #[test]
    fn fixture_login_success() {
        let Event::LoginSuccess(user) = decode_fixture("login_success.json") else {
            panic!("expected login_success");
        };
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.display_name, "Ana");
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn fixture_user_list_tolerates_unknown_values() {
        let Event::UserList(users) = decode_fixture("user_list.json") else {
            panic!("expected user_list");
        };
        assert_eq!(users.len(), 3);
        assert_eq!(users[0].presence, Presence::Online);
        assert_eq!(users[1].presence, Presence::Offline);
        assert_eq!(users[2].role, Role::Member);
        assert_eq!(users[2].presence, Presence::Offline);
    }

    #[test]
    fn fixture_user_list_stringified_content() {
        let Event::UserList(users) = decode_fixture("user_list_stringified.json") else {
            panic!("expected user_list");
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "bo@example.com");
    }

    #[test]
    fn fixture_private_message_keeps_json_looking_text() {
        let Event::Chat(msg) = decode_fixture("private_message.json") else {
            panic!("expected chat");
        };
        assert_eq!(msg.kind, MessageType::PrivateMessage);
        assert_eq!(msg.body, MessageBody::Text("{not json, just text}".into()));
        assert_eq!(msg.sender_name.as_deref(), Some("Ana"));
        assert_eq!(msg.timestamp.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
    }

    #[test]
    fn fixture_broadcast_with_iso_timestamp() {
        let Event::Chat(msg) = decode_fixture("broadcast_iso_timestamp.json") else {
            panic!("expected chat");
        };
        assert_eq!(msg.kind, MessageType::Message);
        assert_eq!(msg.sender.as_deref(), Some("bo@example.com"));
        assert!(msg.receiver.is_none());
        assert_eq!(msg.timestamp.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
    }

    #[test]
    fn fixture_file_message() {
        let Event::File(msg) = decode_fixture("file_message.json") else {
            panic!("expected file");
        };
        let MessageBody::File(file) = &msg.body else {
            panic!("expected file body");
        };
        assert_eq!(file.filename(), "dot.png");
        assert_eq!(file.mime_type(), "image/png");
        assert_eq!(file.data(), &[0x89, 0x50, 0x4E, 0x47]);
        assert!(file.is_image());
    }

    #[test]
    fn fixture_conversation_history_skips_unusable_entries() {
        let Event::History { tag, messages } = decode_fixture("conversation_history.json") else {
            panic!("expected history");
        };
        assert_eq!(tag, MessageType::ConversationHistory);
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[0].kind, MessageType::PrivateMessage);
        assert_eq!(messages[1].sender.as_deref(), Some("bo@example.com"));
        assert!(messages[1].timestamp.is_some());

        assert_eq!(messages[2].kind, MessageType::File);
        let MessageBody::File(file) = &messages[2].body else {
            panic!("expected file entry");
        };
        assert_eq!(file.filename(), "notes.txt");
        assert_eq!(file.data(), b"hello");
    }

    #[test]
    fn fixture_files_list_drops_undecodable_files() {
        let Event::FilesList(files) = decode_fixture("files_list.json") else {
            panic!("expected files_list");
        };
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, Some(7));
        assert_eq!(files[0].file.mime_type(), "text/plain");
        assert_eq!(files[0].to_log_entry().kind, MessageType::File);
    }

    #[test]
    fn fixture_typing_stop() {
        let Event::Typing(signal) = decode_fixture("typing.json") else {
            panic!("expected typing");
        };
        assert_eq!(signal.sender, "bo@example.com");
        assert_eq!(signal.receiver.as_deref(), Some("ana@example.com"));
        assert!(!signal.is_typing);
    }

    #[test]
    fn fixture_user_joined() {
        let Event::UserJoined(notice) = decode_fixture("user_joined.json") else {
            panic!("expected user_joined");
        };
        assert_eq!(notice.email.as_deref(), Some("cy@example.com"));
        assert_eq!(notice.username.as_deref(), Some("Cy"));
    }

    #[test]
    fn fixture_error() {
        let Event::Error { message } = decode_fixture("error.json") else {
            panic!("expected error");
        };
        assert_eq!(message, "invalid credentials");
    }

    #[test]
    fn fixture_unknown_tag_survives_untouched() {
        let raw: serde_json::Value = serde_json::from_str(&load_fixture("unknown_tag.json")).unwrap();
        let event = decode_fixture("unknown_tag.json");
        assert_eq!(event.msg_type(), MessageType::Unknown("server_motd".into()));

        let encoded: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(encoded, raw);
    }

    #[test]
    fn every_fixture_is_single_envelope() {
        let mut count = 0;
        for entry in fs::read_dir(fixtures_dir()).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).unwrap();
            let event = Event::from_json(&raw)
                .unwrap_or_else(|e| panic!("{} does not decode: {e}", path.display()));
            // One envelope per line on the backend stream.
            assert!(!event.to_json().unwrap().contains('\n'));
            count += 1;
        }
        assert!(count >= 10, "fixtures missing: found {count}");
    }

    // --- End to end: client -> bridge -> backend ---

    mod end_to_end {
        use std::sync::Arc;
        use std::time::Duration;

        use relaychat_bridge::{BridgeConfig, BridgeServer};
        use relaychat_client::{
            ChatSession, ClientConfig, ConnectionEvent, ConnectionManager, ConnectionState,
            Dispatcher, MemoryStore, ReconnectConfig, SessionHandle, SessionState, SessionStore,
            SessionUpdate, UpdateReceiver, WsConnector,
        };
        use relaychat_protocol::{Event, MessageType, Role, User};
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
        use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
        use tokio::net::TcpListener;

        const WAIT: Duration = Duration::from_secs(5);

        struct Backend {
            lines: Lines<BufReader<OwnedReadHalf>>,
            writer: OwnedWriteHalf,
        }

        impl Backend {
            async fn recv(&mut self) -> Event {
                let line = tokio::time::timeout(WAIT, self.lines.next_line())
                    .await
                    .expect("backend timed out")
                    .unwrap()
                    .expect("bridge closed the backend stream");
                Event::from_json(&line).unwrap()
            }

            async fn reply(&mut self, event: &Event) {
                let mut line = event.to_json().unwrap();
                line.push('\n');
                self.writer.write_all(line.as_bytes()).await.unwrap();
            }
        }

        async fn start_bridge(backend_port: u16) -> (Arc<BridgeServer>, u16) {
            let server = BridgeServer::new(BridgeConfig {
                listen_host: "127.0.0.1".into(),
                listen_port: 0,
                backend_host: "127.0.0.1".into(),
                backend_port,
                max_message_size: 1024 * 1024,
            });
            let runner = Arc::clone(&server);
            tokio::spawn(async move { runner.run().await });

            let port = loop {
                let p = server.port().await;
                if p > 0 {
                    break p;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            };
            (server, port)
        }

        async fn start_client(
            port: u16,
            config: ClientConfig,
            store: Arc<dyn SessionStore>,
        ) -> (SessionHandle, UpdateReceiver) {
            let connector = Arc::new(WsConnector::new(format!("ws://127.0.0.1:{port}")));
            let config = ClientConfig {
                bridge_url: connector.url().to_string(),
                ..config
            };
            let (session, handle, updates) =
                ChatSession::new(config, connector, store).await.unwrap();
            tokio::spawn(session.run());
            (handle, updates)
        }

        async fn wait_for<F>(updates: &mut UpdateReceiver, mut pred: F) -> SessionUpdate
        where
            F: FnMut(&SessionUpdate) -> bool,
        {
            loop {
                let update = tokio::time::timeout(WAIT, updates.recv())
                    .await
                    .expect("no matching update")
                    .expect("session stopped");
                if pred(&update) {
                    return update;
                }
            }
        }

        #[tokio::test]
        async fn login_roster_and_private_message() {
            let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let backend_port = backend_listener.local_addr().unwrap().port();
            let (server, port) = start_bridge(backend_port).await;

            let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::default());
            let (handle, mut updates) =
                start_client(port, ClientConfig::default(), Arc::clone(&store)).await;

            wait_for(&mut updates, |u| {
                *u == SessionUpdate::Connection(ConnectionState::Connected)
            })
            .await;
            let (sock, _) = tokio::time::timeout(WAIT, backend_listener.accept())
                .await
                .unwrap()
                .unwrap();
            let (read, writer) = sock.into_split();
            let mut backend = Backend {
                lines: BufReader::new(read).lines(),
                writer,
            };

            handle
                .login(Role::Member, "ana@example.com", "secret")
                .await
                .unwrap();
            let Event::Login(req) = backend.recv().await else {
                panic!("expected login");
            };
            assert_eq!(req.email, "ana@example.com");
            assert_eq!(req.role, Role::Member);

            let ana = User::new("ana@example.com", "Ana", Role::Member);
            backend.reply(&Event::LoginSuccess(ana.clone())).await;
            wait_for(&mut updates, |u| matches!(u, SessionUpdate::Identity(Some(_)))).await;
            assert_eq!(store.load_identity().unwrap().unwrap().email, "ana@example.com");

            // Login success triggers a roster request.
            let request = backend.recv().await;
            assert_eq!(request.msg_type(), MessageType::GetUsers);

            let bo = User::new("bo@example.com", "Bo", Role::Member);
            backend.reply(&Event::UserList(vec![ana, bo])).await;
            let SessionUpdate::Roster(roster) =
                wait_for(&mut updates, |u| matches!(u, SessionUpdate::Roster(r) if !r.is_empty()))
                    .await
            else {
                unreachable!()
            };
            assert_eq!(roster.len(), 2);

            handle.select_peer("bo@example.com").await.unwrap();
            let Event::GetConversation { peer, .. } = backend.recv().await else {
                panic!("expected get_conversation");
            };
            assert_eq!(peer, "bo@example.com");

            handle.send_text("  hi Bo ").await.unwrap();
            let Event::Chat(msg) = backend.recv().await else {
                panic!("expected private message");
            };
            assert_eq!(msg.kind, MessageType::PrivateMessage);
            assert_eq!(msg.sender.as_deref(), Some("ana@example.com"));
            assert_eq!(msg.receiver.as_deref(), Some("bo@example.com"));
            assert_eq!(msg.body.as_text(), Some("hi Bo"));

            // The backend echoes the line; it lands in the log.
            backend.reply(&Event::Chat(msg.clone())).await;
            let SessionUpdate::Message(logged) =
                wait_for(&mut updates, |u| matches!(u, SessionUpdate::Message(_))).await
            else {
                unreachable!()
            };
            assert_eq!(logged.body.as_text(), Some("hi Bo"));

            handle.shutdown().await.unwrap();
            server.shutdown();
        }

        #[tokio::test]
        async fn broadcast_echo_lands_in_log_once() {
            let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let backend_port = backend_listener.local_addr().unwrap().port();
            let (server, port) = start_bridge(backend_port).await;

            let connector = Arc::new(WsConnector::new(format!("ws://127.0.0.1:{port}")));
            let manager = ConnectionManager::new(connector, ReconnectConfig::default());
            let mut events = manager.take_events().await.unwrap();
            manager.connect().await;

            loop {
                let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
                if event == ConnectionEvent::StateChanged(ConnectionState::Connected) {
                    break;
                }
            }
            let (sock, _) = tokio::time::timeout(WAIT, backend_listener.accept())
                .await
                .unwrap()
                .unwrap();
            let (read, mut writer) = sock.into_split();
            let mut lines = BufReader::new(read).lines();

            let frame = r#"{"type":"message","content":"hi"}"#;
            manager.send(frame.to_string()).unwrap();
            let line = tokio::time::timeout(WAIT, lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(line, frame);

            writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
            let raw = loop {
                match tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap() {
                    ConnectionEvent::Message(raw) => break raw,
                    ConnectionEvent::StateChanged(_) => continue,
                }
            };
            assert_eq!(raw, frame);

            let mut dispatcher: Dispatcher<(SessionState, usize)> = Dispatcher::new();
            dispatcher.on_any(|(state, seen): &mut (SessionState, usize), event: &Event| {
                *seen += 1;
                state.apply(event);
            });
            let mut ctx = (SessionState::new(), 0);
            dispatcher.dispatch(&mut ctx, &raw).unwrap();

            let (state, seen) = ctx;
            assert_eq!(seen, 1);
            assert_eq!(state.log().len(), 1);
            assert_eq!(state.log()[0].body.as_text(), Some("hi"));

            manager.shutdown().await;
            server.shutdown();
        }

        #[tokio::test]
        async fn backend_loss_surfaces_as_reconnect() {
            // Nothing listens on the backend port, so the bridge drops every client.
            let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let backend_port = unused.local_addr().unwrap().port();
            drop(unused);
            let (server, port) = start_bridge(backend_port).await;

            let config = ClientConfig {
                reconnect_delay_ms: 20,
                ..ClientConfig::default()
            };
            let (handle, mut updates) =
                start_client(port, config, Arc::new(MemoryStore::default())).await;

            wait_for(&mut updates, |u| {
                *u == SessionUpdate::Connection(ConnectionState::Connected)
            })
            .await;
            wait_for(&mut updates, |u| {
                *u == SessionUpdate::Connection(ConnectionState::Reconnecting { attempt: 1 })
            })
            .await;

            handle.shutdown().await.unwrap();
            server.shutdown();
        }

        #[tokio::test]
        async fn unreachable_bridge_exhausts_reconnects() {
            let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = unused.local_addr().unwrap().port();
            drop(unused);

            let config = ClientConfig {
                max_reconnect_attempts: 2,
                reconnect_delay_ms: 20,
                ..ClientConfig::default()
            };
            let (handle, mut updates) =
                start_client(port, config, Arc::new(MemoryStore::default())).await;

            wait_for(&mut updates, |u| {
                *u == SessionUpdate::Connection(ConnectionState::Reconnecting { attempt: 1 })
            })
            .await;
            wait_for(&mut updates, |u| {
                *u == SessionUpdate::Connection(ConnectionState::Failed)
            })
            .await;

            handle.shutdown().await.unwrap();
        }
    }
}
