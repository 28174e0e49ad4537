use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use duet_types::api::RenderedThread;
use duet_types::models::{ConversationKey, GlobalSettings, Identity, Message};

use crate::error::CoreResult;
use crate::hub::{Hub, Subscription};
use crate::lifecycle::{MessageLifecycle, visible_to};
use crate::normalize::to_direct_link;
use crate::retention;

/// One open conversation: its two live subscriptions and the thread
/// rendered from them for the current viewer.
///
/// Closing (or dropping) the view detaches both subscriptions.
pub struct ConversationView {
    view_id: Uuid,
    hub: Hub,
    lifecycle: MessageLifecycle,
    rendered: watch::Receiver<RenderedThread>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConversationView {
    pub async fn open(hub: Hub, identity: Identity, peer_id: Uuid) -> CoreResult<Self> {
        let lifecycle = MessageLifecycle::new(hub.clone(), identity, peer_id);
        let conversation = lifecycle.conversation().clone();

        let settings = hub.watch_settings().await?;
        let messages = hub.watch_messages(conversation.clone()).await?;

        let (tx, rendered) = watch::channel(RenderedThread::default());
        let tx = Arc::new(tx);

        let tasks = vec![
            tokio::spawn(run_settings(settings, hub.clone(), conversation.clone(), tx.clone())),
            tokio::spawn(run_messages(messages, lifecycle.clone(), tx)),
        ];

        let view_id = Uuid::new_v4();
        hub.register_view(
            identity.user_id,
            conversation.clone(),
            view_id,
            tasks.iter().map(|t| t.abort_handle()).collect(),
        );
        info!("View {} opened on {} for {}", view_id, conversation, identity.user_id);

        Ok(Self {
            view_id,
            hub,
            lifecycle,
            rendered,
            tasks,
        })
    }

    pub fn id(&self) -> Uuid {
        self.view_id
    }

    pub fn conversation(&self) -> &ConversationKey {
        self.lifecycle.conversation()
    }

    pub fn lifecycle(&self) -> &MessageLifecycle {
        &self.lifecycle
    }

    pub fn rendered(&self) -> watch::Receiver<RenderedThread> {
        self.rendered.clone()
    }

    pub fn snapshot(&self) -> RenderedThread {
        self.rendered.borrow().clone()
    }

    /// False once the view was closed or displaced by a newer duplicate.
    pub fn is_active(&self) -> bool {
        self.tasks.iter().all(|t| !t.is_finished())
    }

    /// Abort both tasks and wait for them to finish, which ends the rendered
    /// feed. Store writes already handed to the blocking pool (a seen mark or
    /// a retention delete) are not cancelled and may still land afterwards.
    pub async fn close(mut self) {
        self.detach();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("View {} closed", self.view_id);
    }

    fn detach(&self) {
        for task in &self.tasks {
            task.abort();
        }
        self.hub.unregister_view(
            self.lifecycle.identity().user_id,
            self.lifecycle.conversation(),
            self.view_id,
        );
    }
}

impl Drop for ConversationView {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            self.detach();
        }
    }
}

/// Each settings value updates the wallpaper and triggers a retention pass.
async fn run_settings(
    mut settings: Subscription<GlobalSettings>,
    hub: Hub,
    conversation: ConversationKey,
    rendered: Arc<watch::Sender<RenderedThread>>,
) {
    while let Some(value) = settings.next().await {
        let wallpaper = value
            .wallpaper_url
            .as_deref()
            .map(to_direct_link)
            .filter(|url| !url.is_empty());
        rendered.send_modify(|thread| thread.wallpaper_url = wallpaper);

        if let Err(e) = retention::sweep(&hub, &conversation, &value, Utc::now()).await {
            warn!("Cleanup error in {}: {}", conversation, e);
        }
    }
    debug!("Settings feed for {} ended", conversation);
}

/// Each log snapshot is filtered for the viewer, then incoming unseen
/// messages are marked seen.
async fn run_messages(
    mut messages: Subscription<Vec<Message>>,
    lifecycle: MessageLifecycle,
    rendered: Arc<watch::Sender<RenderedThread>>,
) {
    let viewer = lifecycle.identity().user_id;
    while let Some(snapshot) = messages.next().await {
        let visible = visible_to(viewer, &snapshot);
        rendered.send_modify(|thread| thread.messages = visible);

        lifecycle.mark_incoming_seen(&snapshot).await;
    }
    debug!("Message feed for {} ended", lifecycle.conversation());
}
