use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use duet_core::directory;
use duet_core::lock::{LockEvent, LockGate, PasswordUnlock, UnlockVerifier};
use duet_core::settings::SettingsAdapter;
use duet_core::view::ConversationView;
use duet_core::{CoreError, Hub};
use duet_types::api::{RenderedThread, SaveSettingsRequest, SendMessageRequest};
use duet_types::models::{Identity, Media, Message, Role, User};

use crate::commands::{Command, HELP};

/// Signed-in state of the terminal client.
pub struct App {
    hub: Hub,
    gate: Arc<LockGate>,
    user: Option<User>,
    peer: Option<User>,
    view: Option<ConversationView>,
}

pub enum Flow {
    Continue,
    Quit,
}

impl App {
    pub fn new(hub: Hub, gate: LockGate) -> Self {
        Self {
            hub,
            gate: Arc::new(gate),
            user: None,
            peer: None,
            view: None,
        }
    }

    /// Live rendered thread of the open conversation, if any.
    pub fn render_feed(&self) -> Option<watch::Receiver<RenderedThread>> {
        self.view.as_ref().map(|v| v.rendered())
    }

    pub fn view_id(&self) -> Option<Uuid> {
        self.view.as_ref().map(ConversationView::id)
    }

    pub fn is_locked(&self) -> bool {
        self.gate.is_locked()
    }

    pub async fn handle(&mut self, cmd: Command) -> anyhow::Result<Flow> {
        if self.gate.is_locked() && !cmd.allowed_while_locked() {
            println!("Screen is locked. Use /unlock <password>.");
            return Ok(Flow::Continue);
        }

        match cmd {
            Command::Help => println!("{}", HELP),
            Command::Quit => {
                self.close_view().await;
                return Ok(Flow::Quit);
            }
            Command::AddUser { username, password, admin } => {
                let role = if admin { Role::Admin } else { Role::Member };
                let user = directory::register_user(&self.hub, &username, &password, role).await?;
                println!("Added {} ({})", user.username, user.role.as_str());
            }
            Command::SignIn { username, password } => {
                let user = self.lookup(&username).await?;
                let verifier = PasswordUnlock::new(self.hub.store());
                let id = user.id;
                let ok = tokio::task::spawn_blocking(move || verifier.verify(id, &password)).await??;
                if !ok {
                    return Err(anyhow!("wrong password for {}", username));
                }
                self.switch_user(user.clone()).await;
                self.gate.handle(LockEvent::SignedIn(user.id));
                println!("Signed in as {}", user.label());
            }
            Command::Restore { username } => {
                let user = self.lookup(&username).await?;
                self.switch_user(user.clone()).await;
                self.gate.handle(LockEvent::SessionRestored(user.id));
                println!("Session restored for {}. Screen is locked.", user.label());
            }
            Command::SignOut => {
                self.close_view().await;
                self.user = None;
                self.gate.handle(LockEvent::SignedOut);
                println!("Signed out");
            }
            Command::Users => {
                let me = self.identity()?;
                for user in directory::list_peers(&self.hub, &me).await? {
                    println!("  {} ({})", user.label(), user.role.as_str());
                }
            }
            Command::Open { username } => {
                let me = self.identity()?;
                let peer = self.lookup(&username).await?;
                if peer.id == me.user_id {
                    return Err(anyhow!("pick someone other than yourself"));
                }
                self.close_view().await;
                let view = ConversationView::open(self.hub.clone(), me, peer.id).await?;
                println!("Opened conversation with {}", peer.label());
                self.view = Some(view);
                self.peer = Some(peer);
            }
            Command::Close => {
                self.close_view().await;
                println!("Closed");
            }
            Command::Send { text } => {
                if text.is_empty() {
                    return Ok(Flow::Continue);
                }
                self.view()?.lifecycle().send(SendMessageRequest::text(text)).await?;
            }
            Command::Media { kind, url, caption } => {
                let req = SendMessageRequest::media(Media { url, kind }, caption);
                self.view()?.lifecycle().send(req).await?;
            }
            Command::Save { index } => {
                let message = self.message_at(index)?;
                let saved = self.view()?.lifecycle().toggle_saved(message.id, message.saved).await?;
                println!("Message {} {}", index, if saved { "saved" } else { "unsaved" });
            }
            Command::Hide { index } => {
                let message = self.message_at(index)?;
                self.view()?.lifecycle().delete_for_me(message.id).await?;
            }
            Command::Delete { index } => {
                let message = self.message_at(index)?;
                let lifecycle = self.view()?.lifecycle();
                if !lifecycle.can_delete_for_everyone(&message) {
                    return Err(anyhow!("only the author or an admin can delete for everyone"));
                }
                lifecycle.delete_for_everyone(message.id).await?;
            }
            Command::Settings { retention_hours, wallpaper_url } => {
                let me = self.identity()?;
                let adapter = SettingsAdapter::new(self.hub.clone());
                // Without a URL argument the current wallpaper carries over
                let wallpaper_url = match wallpaper_url {
                    Some(url) => url,
                    None => adapter.load().await?.wallpaper_url.unwrap_or_default(),
                };
                let saved = adapter
                    .save(&me, &SaveSettingsRequest { wallpaper_url, retention_hours })
                    .await?;
                println!(
                    "Settings saved: retention {}h, wallpaper {}",
                    saved.retention_hours,
                    saved.wallpaper_url.as_deref().unwrap_or("(none)")
                );
            }
            Command::Json => {
                let thread = self.view()?.snapshot();
                println!("{}", serde_json::to_string_pretty(&thread)?);
            }
            Command::Background => {
                self.gate.handle(LockEvent::VisibilityLost);
                println!("Screen locked");
            }
            Command::Back => {
                self.gate.handle(LockEvent::BackNavigation);
                if self.gate.is_locked() {
                    println!("Screen locked");
                }
            }
            Command::Unlock { secret } => {
                let gate = self.gate.clone();
                match tokio::task::spawn_blocking(move || gate.unlock(&secret)).await? {
                    Ok(_) => {
                        println!("Unlocked");
                        if let Some(view) = &self.view {
                            self.print_thread(&view.snapshot());
                        }
                    }
                    Err(CoreError::Forbidden(_)) => println!("Wrong password"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(Flow::Continue)
    }

    pub fn print_thread(&self, thread: &RenderedThread) {
        let Some(me) = self.user.as_ref() else {
            return;
        };
        let peer = self.peer.as_ref().map(User::label).unwrap_or("them");

        println!("----");
        if let Some(url) = &thread.wallpaper_url {
            println!("[wallpaper {}]", url);
        }
        for (i, m) in thread.messages.iter().enumerate() {
            let who = if m.author_id == me.id { "me" } else { peer };
            let mut line = format!("{:>3}. {} {}:", i + 1, m.created_at.format("%H:%M"), who);
            if let Some(media) = &m.media {
                line.push_str(&format!(" <{} {}>", media.kind.as_str(), media.url));
            }
            if let Some(text) = &m.text {
                line.push(' ');
                line.push_str(text);
            }
            if m.saved {
                line.push_str(" [saved]");
            }
            if m.author_id == me.id && m.seen {
                line.push_str(" [seen]");
            }
            println!("{}", line);
        }
    }

    async fn switch_user(&mut self, user: User) {
        self.close_view().await;
        info!("Session user is now {} ({})", user.username, user.id);
        self.user = Some(user);
    }

    async fn close_view(&mut self) {
        self.peer = None;
        if let Some(view) = self.view.take() {
            view.close().await;
        }
    }

    async fn lookup(&self, username: &str) -> anyhow::Result<User> {
        directory::find_user(&self.hub, username)
            .await?
            .with_context(|| format!("no user named '{}'", username))
    }

    fn identity(&self) -> anyhow::Result<Identity> {
        self.user
            .as_ref()
            .map(|u| Identity::new(u.id, u.role))
            .ok_or_else(|| anyhow!("sign in first"))
    }

    fn view(&self) -> anyhow::Result<&ConversationView> {
        self.view.as_ref().ok_or_else(|| anyhow!("open a conversation first"))
    }

    fn message_at(&self, index: usize) -> anyhow::Result<Message> {
        let thread = self.view()?.snapshot();
        thread
            .messages
            .get(index - 1)
            .cloned()
            .ok_or_else(|| {
                warn!("No message at position {}", index);
                anyhow!("no message {} in this thread", index)
            })
    }
}
