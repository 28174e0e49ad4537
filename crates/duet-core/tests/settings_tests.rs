mod common;

use std::time::Duration;

use duet_core::settings::SettingsAdapter;
use duet_core::{CoreError, DocumentStore};
use duet_types::api::SaveSettingsRequest;
use duet_types::models::{GlobalSettings, Identity, Role};

use common::fixture;

fn form(wallpaper: &str, hours: &str) -> SaveSettingsRequest {
    SaveSettingsRequest {
        wallpaper_url: wallpaper.to_string(),
        retention_hours: hours.to_string(),
    }
}

#[tokio::test]
async fn defaults_apply_before_first_save() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());

    assert_eq!(settings.load().await.unwrap(), GlobalSettings::default());
    assert!(fx.db.load_settings().unwrap().is_none());
}

#[tokio::test]
async fn admin_save_normalizes_the_wallpaper_link() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());

    let saved = settings
        .save(&fx.admin, &form(" https://drive.google.com/file/d/ABC123/view?usp=sharing ", "6"))
        .await
        .unwrap();
    assert_eq!(
        saved.wallpaper_url.as_deref(),
        Some("https://drive.google.com/uc?export=view&id=ABC123")
    );
    assert_eq!(saved.retention_hours, 6);
    assert_eq!(settings.load().await.unwrap(), saved);
}

#[tokio::test]
async fn blank_wallpaper_clears_it() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());

    settings.save(&fx.admin, &form("https://example.com/a.png", "24")).await.unwrap();
    let saved = settings.save(&fx.admin, &form("   ", "24")).await.unwrap();
    assert!(saved.wallpaper_url.is_none());
    assert!(settings.load().await.unwrap().wallpaper_url.is_none());
}

#[tokio::test]
async fn members_cannot_change_settings() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());

    let err = settings.save(&fx.alice, &form("", "2")).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(fx.db.load_settings().unwrap().is_none());
}

#[tokio::test]
async fn forged_admin_is_refused_by_the_store() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());
    let forged = Identity::new(fx.bob.user_id, Role::Admin);

    let err = settings.save(&forged, &form("", "2")).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(fx.db.load_settings().unwrap().is_none());
}

#[tokio::test]
async fn invalid_retention_is_rejected_and_nothing_is_written() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());

    for bad in ["0", "-1", "abc", "2.5", ""] {
        let err = settings.save(&fx.admin, &form("", bad)).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)), "accepted {:?}", bad);
    }
    assert!(fx.db.load_settings().unwrap().is_none());
}

#[tokio::test]
async fn watchers_receive_the_new_value() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());
    let mut sub = settings.watch().await.unwrap();

    assert_eq!(sub.next().await.unwrap(), GlobalSettings::default());

    settings.save(&fx.admin, &form("", "3")).await.unwrap();
    let next = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.retention_hours, 3);
}

#[tokio::test]
async fn oversized_retention_is_rejected_everywhere() {
    let fx = fixture();
    let settings = SettingsAdapter::new(fx.hub.clone());

    let err = settings.save(&fx.admin, &form("", "4000000000")).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let direct = GlobalSettings {
        wallpaper_url: None,
        retention_hours: u32::MAX,
    };
    let err = fx.db.save_settings(fx.admin.user_id, &direct).unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(fx.db.load_settings().unwrap().is_none());
}
