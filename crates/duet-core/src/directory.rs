use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use duet_types::models::{Identity, Role, User};

use crate::error::{CoreError, CoreResult};
use crate::hub::Hub;
use crate::lock::hash_password;

/// Everyone the current identity can open a conversation with.
pub async fn list_peers(hub: &Hub, identity: &Identity) -> CoreResult<Vec<User>> {
    let me = identity.user_id;
    hub.run(move |store| store.list_users_except(me))
        .await
        .inspect_err(|e| warn!("Error fetching users: {}", e))
}

pub async fn find_user(hub: &Hub, username: &str) -> CoreResult<Option<User>> {
    let username = username.to_string();
    hub.run(move |store| store.find_user(&username)).await
}

/// Add a local account. Account management normally belongs to the
/// identity provider; this exists to seed a standalone store.
pub async fn register_user(
    hub: &Hub,
    username: &str,
    password: &str,
    role: Role,
) -> CoreResult<User> {
    if username.len() < 3 || username.len() > 32 {
        return Err(CoreError::Validation("username must be 3 to 32 characters".into()));
    }
    if password.len() < 8 {
        return Err(CoreError::Validation("password must be at least 8 characters".into()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        display_name: None,
        role,
        created_at: Utc::now(),
    };

    let password = password.to_string();
    let to_store = user.clone();
    hub.run(move |store| {
        if store.find_user(&to_store.username)?.is_some() {
            return Err(CoreError::Validation(format!("username '{}' is taken", to_store.username)));
        }
        let hash = hash_password(&password)?;
        store.register_user(&to_store, &hash)
    })
    .await?;

    info!("Registered {} ({}) as {}", user.username, user.id, user.role.as_str());
    Ok(user)
}
