#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use duet_core::error::{CoreError, CoreResult};
use duet_core::{DocumentStore, Hub};
use duet_db::Database;
use duet_types::api::RenderedThread;
use duet_types::models::{ConversationKey, GlobalSettings, Identity, Message, Role, User};

pub struct Fixture {
    pub db: Arc<Database>,
    pub hub: Hub,
    pub alice: Identity,
    pub bob: Identity,
    pub admin: Identity,
}

impl Fixture {
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::between(self.alice.user_id, self.bob.user_id)
    }
}

pub fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let hub = Hub::new(db.clone());
    Fixture {
        alice: add_user(db.as_ref(), "alice", Role::Member),
        bob: add_user(db.as_ref(), "bob", Role::Member),
        admin: add_user(db.as_ref(), "admin", Role::Admin),
        db,
        hub,
    }
}

/// Seed a user without paying for a real password hash.
pub fn add_user(store: &dyn DocumentStore, username: &str, role: Role) -> Identity {
    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        display_name: None,
        role,
        created_at: Utc::now(),
    };
    store.register_user(&user, "unused").unwrap();
    Identity::new(user.id, role)
}

pub fn text_message(conversation: &ConversationKey, author: Uuid, created_at: DateTime<Utc>, saved: bool) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation: conversation.clone(),
        author_id: author,
        created_at,
        text: Some("hello".into()),
        media: None,
        seen: false,
        saved,
        deleted_for: BTreeSet::new(),
    }
}

pub fn aged_message(conversation: &ConversationKey, author: Uuid, age: TimeDelta, saved: bool) -> Message {
    text_message(conversation, author, Utc::now() - age, saved)
}

/// Wait until the rendered thread satisfies `pred`, or panic after 5s.
pub async fn wait_for<F>(rx: &mut watch::Receiver<RenderedThread>, mut pred: F) -> RenderedThread
where
    F: FnMut(&RenderedThread) -> bool,
{
    let wait = async {
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("view closed while waiting");
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for rendered thread")
}

/// Poll the store until `pred` holds, or panic after 5s.
pub async fn eventually<F>(mut pred: F)
where
    F: FnMut() -> bool,
{
    let wait = async {
        while !pred() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("condition never became true");
}

/// Wraps a real store and fails retention deletes for chosen messages.
pub struct FlakyStore {
    inner: Database,
    fail_deletes: Mutex<HashSet<Uuid>>,
}

impl FlakyStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_deletes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_delete_of(&self, id: Uuid) {
        self.fail_deletes.lock().unwrap().insert(id);
    }
}

impl DocumentStore for FlakyStore {
    fn load_settings(&self) -> CoreResult<Option<GlobalSettings>> {
        self.inner.load_settings()
    }

    fn save_settings(&self, actor: Uuid, settings: &GlobalSettings) -> CoreResult<()> {
        self.inner.save_settings(actor, settings)
    }

    fn append_message(&self, message: &Message) -> CoreResult<()> {
        self.inner.append_message(message)
    }

    fn list_messages(&self, conversation: &ConversationKey) -> CoreResult<Vec<Message>> {
        self.inner.list_messages(conversation)
    }

    fn get_message(&self, conversation: &ConversationKey, id: Uuid) -> CoreResult<Option<Message>> {
        DocumentStore::get_message(&self.inner, conversation, id)
    }

    fn messages_before(&self, conversation: &ConversationKey, cutoff: DateTime<Utc>) -> CoreResult<Vec<Message>> {
        self.inner.messages_before(conversation, cutoff)
    }

    fn mark_seen(&self, conversation: &ConversationKey, id: Uuid, viewer: Uuid) -> CoreResult<bool> {
        DocumentStore::mark_seen(&self.inner, conversation, id, viewer)
    }

    fn set_saved(&self, conversation: &ConversationKey, id: Uuid, saved: bool) -> CoreResult<()> {
        DocumentStore::set_saved(&self.inner, conversation, id, saved)
    }

    fn hide_for(&self, conversation: &ConversationKey, id: Uuid, viewer: Uuid) -> CoreResult<bool> {
        self.inner.hide_for(conversation, id, viewer)
    }

    fn delete_for_everyone(&self, conversation: &ConversationKey, id: Uuid, actor: Uuid) -> CoreResult<()> {
        self.inner.delete_for_everyone(conversation, id, actor)
    }

    fn delete_expired(&self, conversation: &ConversationKey, id: Uuid, cutoff: DateTime<Utc>) -> CoreResult<bool> {
        if self.fail_deletes.lock().unwrap().contains(&id) {
            return Err(CoreError::Store(anyhow::anyhow!("simulated write failure for {}", id)));
        }
        self.inner.delete_expired(conversation, id, cutoff)
    }

    fn register_user(&self, user: &User, password_hash: &str) -> CoreResult<()> {
        self.inner.register_user(user, password_hash)
    }

    fn find_user(&self, username: &str) -> CoreResult<Option<User>> {
        self.inner.find_user(username)
    }

    fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        self.inner.get_user(id)
    }

    fn list_users_except(&self, user_id: Uuid) -> CoreResult<Vec<User>> {
        DocumentStore::list_users_except(&self.inner, user_id)
    }

    fn password_hash(&self, user_id: Uuid) -> CoreResult<Option<String>> {
        self.inner.password_hash(user_id)
    }
}
