//! Terminal chat client.

mod commands;
mod render;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use relaychat_client::{
    ChatSession, ClientConfig, Command, JsonFileStore, MemoryStore, SessionHandle, SessionStore,
    SessionUpdate, WsConnector,
};
use relaychat_protocol::{FileContent, MessageBody};

use crate::commands::Input;

fn main() -> anyhow::Result<()> {
    // stdout belongs to the conversation.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig::load()?;
    tracing::info!(url = %config.bridge_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let store = open_store(&config);
    let connector = Arc::new(WsConnector::new(config.bridge_url.clone()));

    let (session, handle, mut updates) = ChatSession::new(config, connector, store).await?;
    let session_task = tokio::spawn(session.run());

    println!("{}", commands::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut attachments: Vec<FileContent> = Vec::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&handle, &line, &attachments).await {
                    break;
                }
            }

            Some(update) = updates.recv() => {
                track_attachments(&update, &mut attachments);
                if let Some(text) = render::update(&update) {
                    println!("{text}");
                }
            }

            else => break,
        }
    }

    let _ = handle.shutdown().await;
    if let Err(e) = session_task.await {
        tracing::error!("session task failed: {e}");
    }
    Ok(())
}

fn open_store(config: &ClientConfig) -> Arc<dyn SessionStore> {
    let Some(path) = config.session_path() else {
        return Arc::new(MemoryStore::default());
    };
    match JsonFileStore::new(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("session file unusable, identity will not persist: {e}");
            Arc::new(MemoryStore::default())
        }
    }
}

/// Acts on one input line. Returns `false` when the user quits.
async fn handle_line(handle: &SessionHandle, line: &str, attachments: &[FileContent]) -> bool {
    let command = match commands::parse(line) {
        Ok(Input::Session(command)) => command,
        Ok(Input::File(path)) => match FileContent::from_path(&path) {
            Ok(file) => Command::SendFile(file),
            Err(e) => {
                println!("! cannot read {}: {e}", path.display());
                return true;
            }
        },
        Ok(Input::Save { index, dir }) => {
            match attachments.get(index.wrapping_sub(1)) {
                Some(file) => match file.save_into(&dir) {
                    Ok(saved) => println!("* saved {}", saved.display()),
                    Err(e) => println!("! cannot save {}: {e}", file.filename()),
                },
                None => println!("! no attachment #{index}"),
            }
            return true;
        }
        Ok(Input::Help) => {
            println!("{}", commands::HELP);
            return true;
        }
        Ok(Input::Empty) => return true,
        Ok(Input::Quit) => return false,
        Err(usage) => {
            println!("! {usage}");
            return true;
        }
    };

    if handle.send(command).await.is_err() {
        println!("! session stopped");
        return false;
    }
    true
}

/// Numbers attachments as they reach the log so `/save` can refer to them.
fn track_attachments(update: &SessionUpdate, attachments: &mut Vec<FileContent>) {
    let bodies: Vec<&MessageBody> = match update {
        SessionUpdate::Message(msg) => vec![&msg.body],
        SessionUpdate::LogReplaced(log) => {
            attachments.clear();
            log.iter().map(|msg| &msg.body).collect()
        }
        _ => return,
    };
    for body in bodies {
        if let MessageBody::File(file) = body {
            attachments.push(file.clone());
            println!("  #{} {}", attachments.len(), file.filename());
        }
    }
}
