use duet_types::models::MediaKind;

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddUser { username: String, password: String, admin: bool },
    SignIn { username: String, password: String },
    Restore { username: String },
    SignOut,
    Users,
    Open { username: String },
    Close,
    Send { text: String },
    Media { kind: MediaKind, url: String, caption: Option<String> },
    Save { index: usize },
    Hide { index: usize },
    Delete { index: usize },
    /// `wallpaper_url` is `None` to keep the current wallpaper and an empty
    /// string to clear it.
    Settings { retention_hours: String, wallpaper_url: Option<String> },
    Json,
    Background,
    Back,
    Unlock { secret: String },
    Help,
    Quit,
}

impl Command {
    /// Commands still allowed while the screen is locked.
    pub fn allowed_while_locked(&self) -> bool {
        matches!(
            self,
            Command::Unlock { .. } | Command::SignIn { .. } | Command::SignOut | Command::Help | Command::Quit
        )
    }
}

pub const HELP: &str = "\
/adduser <name> <password> [admin]   create an account
/signin <name> <password>            sign in
/restore <name>                      resume a saved session (starts locked)
/signout                             sign out
/users                               list people to talk to
/open <name>                         open the conversation with <name>
/close                               close the open conversation
/send <text>                         send a text message (or just type it)
/media <image|video> <url> [caption] send a media message
/save <n>                            toggle saved on message n
/hide <n>                            delete message n for me
/delete <n>                          delete message n for everyone
/settings <hours> [url|none]         change global settings (admin)
/json                                print the open thread as JSON
/background                          simulate the app losing focus
/back                                simulate back navigation
/unlock <password>                   unlock the screen
/quit                                exit";

/// Parse a line. Lines without a leading slash are sent as text.
pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send { text: line.to_string() });
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let words: Vec<&str> = args.split_whitespace().collect();

    let cmd = match name {
        "adduser" => match words.as_slice() {
            [username, password] => Command::AddUser {
                username: username.to_string(),
                password: password.to_string(),
                admin: false,
            },
            [username, password, "admin"] => Command::AddUser {
                username: username.to_string(),
                password: password.to_string(),
                admin: true,
            },
            _ => return Err("usage: /adduser <name> <password> [admin]".into()),
        },
        "signin" => match words.as_slice() {
            [username, password] => Command::SignIn {
                username: username.to_string(),
                password: password.to_string(),
            },
            _ => return Err("usage: /signin <name> <password>".into()),
        },
        "restore" => Command::Restore { username: single(&words, "/restore <name>")? },
        "signout" => Command::SignOut,
        "users" => Command::Users,
        "open" => Command::Open { username: single(&words, "/open <name>")? },
        "close" => Command::Close,
        "send" => {
            if args.is_empty() {
                return Err("usage: /send <text>".into());
            }
            Command::Send { text: args.to_string() }
        }
        "media" => {
            let mut parts = args.splitn(3, char::is_whitespace);
            let kind = parts.next().and_then(MediaKind::parse);
            let url = parts.next().filter(|u| !u.is_empty());
            let (Some(kind), Some(url)) = (kind, url) else {
                return Err("usage: /media <image|video> <url> [caption]".into());
            };
            Command::Media {
                kind,
                url: url.to_string(),
                caption: parts.next().map(str::trim).filter(|c| !c.is_empty()).map(String::from),
            }
        }
        "save" => Command::Save { index: position(&words, "/save <n>")? },
        "hide" => Command::Hide { index: position(&words, "/hide <n>")? },
        "delete" => Command::Delete { index: position(&words, "/delete <n>")? },
        "settings" => match words.as_slice() {
            [hours] => Command::Settings {
                retention_hours: hours.to_string(),
                wallpaper_url: None,
            },
            [hours, "none"] => Command::Settings {
                retention_hours: hours.to_string(),
                wallpaper_url: Some(String::new()),
            },
            [hours, url] => Command::Settings {
                retention_hours: hours.to_string(),
                wallpaper_url: Some(url.to_string()),
            },
            _ => return Err("usage: /settings <hours> [url|none]".into()),
        },
        "json" => Command::Json,
        "background" => Command::Background,
        "back" => Command::Back,
        "unlock" => Command::Unlock { secret: single(&words, "/unlock <password>")? },
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command /{} (try /help)", other)),
    };
    Ok(cmd)
}

fn single(words: &[&str], usage: &str) -> Result<String, String> {
    match words {
        [word] => Ok(word.to_string()),
        _ => Err(format!("usage: {}", usage)),
    }
}

/// 1-based message position.
fn position(words: &[&str], usage: &str) -> Result<usize, String> {
    match words {
        [n] => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| format!("usage: {}", usage)),
        _ => Err(format!("usage: {}", usage)),
    }
}
