use tracing::{info, warn};

use duet_types::api::SaveSettingsRequest;
use duet_types::events::StoreEvent;
use duet_types::models::{GlobalSettings, Identity, MAX_RETENTION_HOURS};

use crate::error::{CoreError, CoreResult};
use crate::hub::{Hub, Subscription};
use crate::normalize::to_direct_link;

/// Reads and writes the singleton global settings record.
#[derive(Clone)]
pub struct SettingsAdapter {
    hub: Hub,
}

impl SettingsAdapter {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Current settings, or the defaults when none were ever saved.
    pub async fn load(&self) -> CoreResult<GlobalSettings> {
        self.hub
            .run(|store| Ok(store.load_settings()?.unwrap_or_default()))
            .await
    }

    pub async fn watch(&self) -> CoreResult<Subscription<GlobalSettings>> {
        self.hub.watch_settings().await
    }

    /// Validate and persist the admin form. The wallpaper link is stored in
    /// its direct form. Returns what was saved.
    pub async fn save(&self, actor: &Identity, req: &SaveSettingsRequest) -> CoreResult<GlobalSettings> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden("only administrators can change settings".into()));
        }

        let settings = GlobalSettings {
            wallpaper_url: Some(to_direct_link(req.wallpaper_url.trim())).filter(|u| !u.is_empty()),
            retention_hours: parse_retention_hours(&req.retention_hours)?,
        };

        let actor_id = actor.user_id;
        let to_store = settings.clone();
        let result = self
            .hub
            .write(StoreEvent::SettingsUpdated, move |store| store.save_settings(actor_id, &to_store))
            .await;

        match result {
            Ok(()) => {
                info!(
                    "Settings saved by {}: retention {}h, wallpaper {}",
                    actor_id,
                    settings.retention_hours,
                    settings.wallpaper_url.as_deref().unwrap_or("(none)")
                );
                Ok(settings)
            }
            Err(e) => {
                warn!("Error saving settings: {}", e);
                Err(e)
            }
        }
    }
}

/// Whole hours, from one up to [`MAX_RETENTION_HOURS`]. Anything else is
/// rejected rather than stored.
pub fn parse_retention_hours(raw: &str) -> CoreResult<u32> {
    let hours: u32 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("retention must be a whole number of hours, got '{}'", raw)))?;
    if hours < 1 {
        return Err(CoreError::Validation("retention must be at least 1 hour".into()));
    }
    if hours > MAX_RETENTION_HOURS {
        return Err(CoreError::Validation(format!(
            "retention must be at most {} hours",
            MAX_RETENTION_HOURS
        )));
    }
    Ok(hours)
}
