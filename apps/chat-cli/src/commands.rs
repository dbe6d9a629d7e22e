//! Input line parsing.

use std::path::PathBuf;

use relaychat_client::Command;
use relaychat_protocol::Role;

/// What one input line asks for.
#[derive(Debug, Clone)]
pub enum Input {
    Session(Command),
    /// Attach a file from disk; read by the caller.
    File(PathBuf),
    /// Save an attachment from the log into a directory.
    Save { index: usize, dir: PathBuf },
    Help,
    Quit,
    Empty,
}

pub const HELP: &str = "\
commands:
  /login <email> <password> [admin]   log in (member by default)
  /register <email> <password> <name> create a member account
  /to <email>                         select the conversation peer
  /all <text>                         message everyone
  /file <path>                        share a file
  /save <n> <dir>                     save the n-th attachment of the log
  /users  /history  /files            refresh roster, history, shared files
  /typing                             signal that you are typing
  /logout  /connect  /disconnect
  /quit
anything else is sent to the selected peer";

/// Parses one line of user input.
pub fn parse(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Input::Session(Command::SendText(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let words: Vec<&str> = args.split_whitespace().collect();

    let input = match name {
        "login" => match words.as_slice() {
            [email, password] => login(Role::Member, email, password),
            [email, password, "admin"] => login(Role::Admin, email, password),
            [email, password, "member"] => login(Role::Member, email, password),
            _ => return Err("usage: /login <email> <password> [admin]".into()),
        },
        "register" => match words.as_slice() {
            [email, password, name @ ..] if !name.is_empty() => {
                Input::Session(Command::Register {
                    email: email.to_string(),
                    password: password.to_string(),
                    username: name.join(" "),
                })
            }
            _ => return Err("usage: /register <email> <password> <name>".into()),
        },
        "to" => match words.as_slice() {
            [peer] => Input::Session(Command::SelectPeer(peer.to_string())),
            _ => return Err("usage: /to <email>".into()),
        },
        "all" if !args.is_empty() => Input::Session(Command::Broadcast(args.to_string())),
        "all" => return Err("usage: /all <text>".into()),
        "file" if !args.is_empty() => Input::File(PathBuf::from(args)),
        "file" => return Err("usage: /file <path>".into()),
        "save" => match words.as_slice() {
            [n, dir] => Input::Save {
                index: n.parse().map_err(|_| format!("not a number: {n}"))?,
                dir: PathBuf::from(dir),
            },
            _ => return Err("usage: /save <n> <dir>".into()),
        },
        "users" => Input::Session(Command::RefreshRoster),
        "history" => Input::Session(Command::FetchHistory),
        "files" => Input::Session(Command::FetchFiles),
        "typing" => Input::Session(Command::Keystroke),
        "logout" => Input::Session(Command::Logout),
        "connect" => Input::Session(Command::Connect),
        "disconnect" => Input::Session(Command::Disconnect),
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(input)
}

fn login(role: Role, email: &str, password: &str) -> Input {
    Input::Session(Command::Login {
        role,
        email: email.to_string(),
        password: password.to_string(),
    })
}
