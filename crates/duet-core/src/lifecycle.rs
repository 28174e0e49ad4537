use std::collections::BTreeSet;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use duet_types::api::SendMessageRequest;
use duet_types::events::StoreEvent;
use duet_types::models::{ConversationKey, Identity, Message};

use crate::error::{CoreError, CoreResult};
use crate::hub::Hub;

/// Send, seen-marking, saving and deletion for one viewer in one conversation.
#[derive(Clone)]
pub struct MessageLifecycle {
    hub: Hub,
    identity: Identity,
    conversation: ConversationKey,
}

impl MessageLifecycle {
    pub fn new(hub: Hub, identity: Identity, peer_id: Uuid) -> Self {
        Self {
            conversation: ConversationKey::between(identity.user_id, peer_id),
            hub,
            identity,
        }
    }

    pub fn conversation(&self) -> &ConversationKey {
        &self.conversation
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Append a new message authored by the current identity. A store
    /// failure is returned as-is; nothing is queued for retry.
    pub async fn send(&self, req: SendMessageRequest) -> CoreResult<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            conversation: self.conversation.clone(),
            author_id: self.identity.user_id,
            created_at: Utc::now(),
            text: req.text.filter(|t| !t.trim().is_empty()),
            media: req.media,
            seen: false,
            saved: false,
            deleted_for: BTreeSet::new(),
        };
        if !message.has_content() {
            return Err(CoreError::Validation("message needs text or media".into()));
        }

        let event = StoreEvent::MessageCreated {
            conversation: self.conversation.clone(),
            message_id: message.id,
        };
        let to_store = message.clone();
        self.hub
            .write(event, move |store| store.append_message(&to_store))
            .await
            .inspect_err(|e| warn!("Error sending message in {}: {}", self.conversation, e))?;

        debug!("Message {} sent in {}", message.id, self.conversation);
        Ok(message)
    }

    /// Mark an incoming message seen. Own and already-seen messages are
    /// skipped. Returns whether the flag changed.
    pub async fn mark_seen(&self, message: &Message) -> CoreResult<bool> {
        if !message.is_incoming_for(self.identity.user_id) || message.seen {
            return Ok(false);
        }

        let (conversation, id, viewer) = (self.conversation.clone(), message.id, self.identity.user_id);
        let changed = self
            .hub
            .run(move |store| store.mark_seen(&conversation, id, viewer))
            .await?;
        if changed {
            self.hub.publish(StoreEvent::MessageUpdated {
                conversation: self.conversation.clone(),
                message_id: id,
            });
        }
        Ok(changed)
    }

    /// Mark every unseen incoming message of a snapshot, concurrently.
    /// Failures are logged one by one and never stop the others.
    pub async fn mark_incoming_seen(&self, snapshot: &[Message]) -> usize {
        let pending: Vec<&Message> = snapshot
            .iter()
            .filter(|m| m.is_incoming_for(self.identity.user_id) && !m.seen)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        let results = join_all(pending.iter().map(|m| self.mark_seen(m))).await;

        let mut marked = 0;
        for (message, result) in pending.iter().zip(results) {
            match result {
                Ok(true) => marked += 1,
                Ok(false) => {}
                Err(e) => warn!("Error marking {} seen: {}", message.id, e),
            }
        }
        marked
    }

    /// Flip the saved flag. Concurrent toggles resolve last-write-wins.
    /// Returns the new value.
    pub async fn toggle_saved(&self, message_id: Uuid, current_saved: bool) -> CoreResult<bool> {
        let saved = !current_saved;
        let conversation = self.conversation.clone();
        let event = StoreEvent::MessageUpdated {
            conversation: self.conversation.clone(),
            message_id,
        };
        self.hub
            .write(event, move |store| store.set_saved(&conversation, message_id, saved))
            .await?;
        Ok(saved)
    }

    /// Hide a message from the current viewer only. The record stays.
    pub async fn delete_for_me(&self, message_id: Uuid) -> CoreResult<()> {
        let (conversation, viewer) = (self.conversation.clone(), self.identity.user_id);
        let event = StoreEvent::MessageUpdated {
            conversation: self.conversation.clone(),
            message_id,
        };
        self.hub
            .write(event, move |store| store.hide_for(&conversation, message_id, viewer))
            .await
            .inspect_err(|e| warn!("Error deleting {} for me: {}", message_id, e))?;
        Ok(())
    }

    /// Permanently delete a message for both participants.
    ///
    /// Checked here against the current identity, and again by the store
    /// against its own user directory.
    pub async fn delete_for_everyone(&self, message_id: Uuid) -> CoreResult<()> {
        let conversation = self.conversation.clone();
        let message = self
            .hub
            .run(move |store| store.get_message(&conversation, message_id))
            .await?
            .ok_or_else(|| CoreError::not_found(message_id))?;

        if !self.can_delete_for_everyone(&message) {
            return Err(CoreError::Forbidden(format!(
                "only the author or an administrator can delete {} for everyone",
                message_id
            )));
        }

        let (conversation, actor) = (self.conversation.clone(), self.identity.user_id);
        let event = StoreEvent::MessageDeleted {
            conversation: self.conversation.clone(),
            message_id,
        };
        self.hub
            .write(event, move |store| store.delete_for_everyone(&conversation, message_id, actor))
            .await
            .inspect_err(|e| warn!("Error deleting {} for everyone: {}", message_id, e))?;

        info!("Message {} deleted for everyone by {}", message_id, actor);
        Ok(())
    }

    /// Whether to offer "delete for everyone" on this message.
    pub fn can_delete_for_everyone(&self, message: &Message) -> bool {
        message.author_id == self.identity.user_id || self.identity.is_admin()
    }
}

/// Messages the viewer has not hidden, in their original order.
pub fn visible_to(viewer: Uuid, messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| !m.is_hidden_for(viewer))
        .cloned()
        .collect()
}
