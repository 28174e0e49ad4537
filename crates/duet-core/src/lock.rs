//! Screen lock gate.
//!
//! The gate locks when the app loses foreground visibility or the user
//! navigates back while signed in, and on a restored session. A fresh
//! sign-in clears it. An explicit unlock is checked by a pluggable
//! [`UnlockVerifier`].

use std::sync::{Arc, Mutex, MutexGuard};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    /// App went to the background or the tab was switched away
    VisibilityLost,
    /// Back gesture or browser back button
    BackNavigation,
    /// Credentials were just entered
    SignedIn(Uuid),
    /// App loaded with a persisted session
    SessionRestored(Uuid),
    SignedOut,
}

/// Decides whether a secret unlocks the gate for a user.
pub trait UnlockVerifier: Send + Sync {
    fn verify(&self, user_id: Uuid, secret: &str) -> CoreResult<bool>;
}

/// Placeholder verifier that accepts any secret. Only for setups that have
/// explicitly chosen not to re-check credentials.
pub struct AlwaysUnlock;

impl UnlockVerifier for AlwaysUnlock {
    fn verify(&self, _user_id: Uuid, _secret: &str) -> CoreResult<bool> {
        Ok(true)
    }
}

/// Re-checks the account password against the stored argon2 hash.
/// Blocking: hashing is CPU-bound and the lookup hits the store.
pub struct PasswordUnlock {
    store: Arc<dyn DocumentStore>,
}

impl PasswordUnlock {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl UnlockVerifier for PasswordUnlock {
    fn verify(&self, user_id: Uuid, secret: &str) -> CoreResult<bool> {
        let Some(hash) = self.store.password_hash(user_id)? else {
            return Ok(false);
        };
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| CoreError::Store(anyhow::anyhow!("unreadable password hash for {}: {}", user_id, e)))?;
        Ok(Argon2::default().verify_password(secret.as_bytes(), &parsed).is_ok())
    }
}

/// Hash a password with Argon2id for storage.
pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::Store(anyhow::anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

struct GateInner {
    state: LockState,
    session: Option<Uuid>,
}

/// Process-wide lock state with a single writer.
pub struct LockGate {
    inner: Mutex<GateInner>,
    state_tx: watch::Sender<LockState>,
    verifier: Box<dyn UnlockVerifier>,
}

impl LockGate {
    /// Starts signed out and unlocked.
    pub fn new(verifier: impl UnlockVerifier + 'static) -> Self {
        let (state_tx, _) = watch::channel(LockState::Unlocked);
        Self {
            inner: Mutex::new(GateInner {
                state: LockState::Unlocked,
                session: None,
            }),
            state_tx,
            verifier: Box::new(verifier),
        }
    }

    pub fn state(&self) -> LockState {
        self.lock_inner().state
    }

    pub fn is_locked(&self) -> bool {
        self.state() == LockState::Locked
    }

    pub fn session(&self) -> Option<Uuid> {
        self.lock_inner().session
    }

    pub fn watch(&self) -> watch::Receiver<LockState> {
        self.state_tx.subscribe()
    }

    /// Apply an event and return the resulting state.
    pub fn handle(&self, event: LockEvent) -> LockState {
        let mut inner = self.lock_inner();
        let next = match event {
            LockEvent::VisibilityLost => LockState::Locked,
            LockEvent::BackNavigation if inner.session.is_some() => LockState::Locked,
            LockEvent::BackNavigation => inner.state,
            LockEvent::SignedIn(user_id) => {
                inner.session = Some(user_id);
                LockState::Unlocked
            }
            LockEvent::SessionRestored(user_id) => {
                inner.session = Some(user_id);
                LockState::Locked
            }
            LockEvent::SignedOut => {
                inner.session = None;
                LockState::Unlocked
            }
        };
        debug!(?event, ?next, "lock gate event");
        self.set(&mut inner, next);
        next
    }

    /// Try to clear the lock with `secret` for the session user.
    pub fn unlock(&self, secret: &str) -> CoreResult<LockState> {
        let mut inner = self.lock_inner();
        if inner.state == LockState::Unlocked {
            return Ok(LockState::Unlocked);
        }
        let Some(user_id) = inner.session else {
            return Err(CoreError::Validation("no signed-in user to unlock for".into()));
        };

        if !self.verifier.verify(user_id, secret)? {
            warn!("Unlock rejected for {}", user_id);
            return Err(CoreError::Forbidden("unlock credentials rejected".into()));
        }

        self.set(&mut inner, LockState::Unlocked);
        Ok(LockState::Unlocked)
    }

    fn set(&self, inner: &mut GateInner, next: LockState) {
        if inner.state != next {
            info!("Screen {:?} -> {:?}", inner.state, next);
            inner.state = next;
            self.state_tx.send_replace(next);
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
