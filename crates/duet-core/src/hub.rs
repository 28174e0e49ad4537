use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, warn};
use uuid::Uuid;

use duet_types::events::StoreEvent;
use duet_types::models::{ConversationKey, GlobalSettings, Message};

use crate::error::{CoreError, CoreResult};
use crate::store::DocumentStore;

const EVENT_BUFFER: usize = 1024;

type Loader<T> = Arc<dyn Fn(&dyn DocumentStore) -> CoreResult<T> + Send + Sync>;

/// Fans store writes out to live subscriptions and tracks open views.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    store: Arc<dyn DocumentStore>,

    /// Every subscription receives every event and filters for itself
    events: broadcast::Sender<StoreEvent>,

    /// Open views: (viewer, conversation) -> registration
    views: Mutex<HashMap<(Uuid, ConversationKey), ViewRegistration>>,
}

struct ViewRegistration {
    view_id: Uuid,
    tasks: Vec<AbortHandle>,
}

impl Hub {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(HubInner {
                store,
                events,
                views: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.inner.store.clone()
    }

    /// Run a blocking store call off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&dyn DocumentStore) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                CoreError::from(e)
            })?
    }

    /// Run a store write and announce `event` once it has landed.
    pub async fn write<T, F>(&self, event: StoreEvent, f: F) -> CoreResult<T>
    where
        F: FnOnce(&dyn DocumentStore) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let out = self.run(f).await?;
        self.publish(event);
        Ok(out)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        debug!(?event, "store event");
        let _ = self.inner.events.send(event);
    }

    /// Live settings value. Yields the current record (or the defaults when
    /// none exists) and then every rewrite.
    pub async fn watch_settings(&self) -> CoreResult<Subscription<GlobalSettings>> {
        let load: Loader<GlobalSettings> =
            Arc::new(|store: &dyn DocumentStore| -> CoreResult<GlobalSettings> {
                Ok(store.load_settings()?.unwrap_or_default())
            });
        self.watch("settings", |event: &StoreEvent| event.touches_settings(), load)
            .await
    }

    /// Live conversation log, oldest first.
    pub async fn watch_messages(&self, conversation: ConversationKey) -> CoreResult<Subscription<Vec<Message>>> {
        let key = conversation.clone();
        let load: Loader<Vec<Message>> =
            Arc::new(move |store: &dyn DocumentStore| -> CoreResult<Vec<Message>> {
                store.list_messages(&key)
            });
        self.watch(
            "messages",
            move |event: &StoreEvent| event.conversation() == Some(&conversation),
            load,
        )
        .await
    }

    async fn watch<T, P>(&self, label: &'static str, relevant: P, load: Loader<T>) -> CoreResult<Subscription<T>>
    where
        T: Clone + Send + Sync + 'static,
        P: Fn(&StoreEvent) -> bool + Send + 'static,
    {
        // Subscribe before the first read so no write can slip between them
        let mut events = self.subscribe();

        let initial = {
            let load = load.clone();
            self.run(move |store| load(store)).await?
        };
        let (tx, rx) = watch::channel(initial);

        let hub = self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    recv = events.recv() => match recv {
                        Ok(event) if relevant(&event) => {}
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("{} feed lagged by {} events, reloading", label, skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }

                let load = load.clone();
                match hub.run(move |store| load(store)).await {
                    Ok(value) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    // Keep the stale value; the next event retries
                    Err(e) => warn!("{} feed reload failed: {}", label, e),
                }
            }
            debug!("{} feed detached", label);
        });

        Ok(Subscription {
            rx,
            primed: false,
            task,
        })
    }

    /// Record an open view. A previous view for the same viewer and
    /// conversation is detached and its id returned.
    pub fn register_view(
        &self,
        viewer: Uuid,
        conversation: ConversationKey,
        view_id: Uuid,
        tasks: Vec<AbortHandle>,
    ) -> Option<Uuid> {
        let Ok(mut views) = self.inner.views.lock() else {
            error!("view registry lock poisoned");
            return None;
        };
        let previous = views.insert((viewer, conversation.clone()), ViewRegistration { view_id, tasks });
        previous.map(|old| {
            warn!(
                "Duplicate view for {} on {}: detaching {} in favour of {}",
                viewer, conversation, old.view_id, view_id
            );
            for task in &old.tasks {
                task.abort();
            }
            old.view_id
        })
    }

    /// Remove a view registration, but only if `view_id` still owns it.
    pub fn unregister_view(&self, viewer: Uuid, conversation: &ConversationKey, view_id: Uuid) {
        let Ok(mut views) = self.inner.views.lock() else {
            error!("view registry lock poisoned");
            return;
        };
        let key = (viewer, conversation.clone());
        if views.get(&key).is_some_and(|reg| reg.view_id == view_id) {
            views.remove(&key);
        }
    }

    pub fn open_views(&self) -> usize {
        self.inner.views.lock().map(|v| v.len()).unwrap_or(0)
    }
}

/// Handle on a live value. Dropping it detaches the feed immediately.
pub struct Subscription<T> {
    rx: watch::Receiver<T>,
    primed: bool,
    task: JoinHandle<()>,
}

impl<T: Clone> Subscription<T> {
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// The current value on the first call, then each newer value.
    /// Returns `None` once the feed has stopped.
    pub async fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    pub fn is_detached(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
