mod common;

use chrono::TimeDelta;

use duet_core::DocumentStore;
use duet_core::lifecycle::MessageLifecycle;
use duet_core::settings::SettingsAdapter;
use duet_core::view::ConversationView;
use duet_types::api::{SaveSettingsRequest, SendMessageRequest};
use duet_types::models::GlobalSettings;

use common::{aged_message, eventually, fixture, wait_for};

#[tokio::test]
async fn opening_a_view_marks_only_peer_messages_seen() {
    let fx = fixture();
    let alice = MessageLifecycle::new(fx.hub.clone(), fx.alice, fx.bob.user_id);
    let bob = MessageLifecycle::new(fx.hub.clone(), fx.bob, fx.alice.user_id);
    let from_alice = alice.send(SendMessageRequest::text("hello")).await.unwrap();
    let from_bob = bob.send(SendMessageRequest::text("hey")).await.unwrap();

    let view = ConversationView::open(fx.hub.clone(), fx.bob, fx.alice.user_id)
        .await
        .unwrap();
    let mut rx = view.rendered();
    let thread = wait_for(&mut rx, |t| {
        t.messages.len() == 2 && t.messages.iter().any(|m| m.id == from_alice.id && m.seen)
    })
    .await;

    let own = thread.messages.iter().find(|m| m.id == from_bob.id).unwrap();
    assert!(!own.seen);
    view.close().await;
}

#[tokio::test]
async fn new_messages_reach_an_open_view() {
    let fx = fixture();
    let view = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let mut rx = view.rendered();

    let bob = MessageLifecycle::new(fx.hub.clone(), fx.bob, fx.alice.user_id);
    bob.send(SendMessageRequest::text("you there?")).await.unwrap();

    let thread = wait_for(&mut rx, |t| t.messages.len() == 1).await;
    assert_eq!(thread.messages[0].text.as_deref(), Some("you there?"));
    view.close().await;
}

#[tokio::test]
async fn delete_for_me_only_changes_that_viewers_thread() {
    let fx = fixture();
    let alice_view = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let bob_view = ConversationView::open(fx.hub.clone(), fx.bob, fx.alice.user_id)
        .await
        .unwrap();
    let mut alice_rx = alice_view.rendered();
    let mut bob_rx = bob_view.rendered();

    let msg = alice_view
        .lifecycle()
        .send(SendMessageRequest::text("regret"))
        .await
        .unwrap();
    wait_for(&mut bob_rx, |t| t.messages.len() == 1).await;

    bob_view.lifecycle().delete_for_me(msg.id).await.unwrap();
    wait_for(&mut bob_rx, |t| t.messages.is_empty()).await;

    let thread = wait_for(&mut alice_rx, |t| t.messages.len() == 1).await;
    assert_eq!(thread.messages[0].id, msg.id);

    alice_view.close().await;
    bob_view.close().await;
}

#[tokio::test]
async fn shortening_retention_sweeps_the_open_conversation() {
    let fx = fixture();
    let conv = fx.conversation();
    let old = aged_message(&conv, fx.bob.user_id, TimeDelta::hours(2), false);
    let kept = aged_message(&conv, fx.bob.user_id, TimeDelta::hours(2), true);
    fx.db.append_message(&old).unwrap();
    fx.db.append_message(&kept).unwrap();

    let view = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let mut rx = view.rendered();
    // The default 24h window keeps both
    wait_for(&mut rx, |t| t.messages.len() == 2).await;

    SettingsAdapter::new(fx.hub.clone())
        .save(
            &fx.admin,
            &SaveSettingsRequest {
                wallpaper_url: String::new(),
                retention_hours: "1".into(),
            },
        )
        .await
        .unwrap();

    let thread = wait_for(&mut rx, |t| t.messages.len() == 1).await;
    assert_eq!(thread.messages[0].id, kept.id);
    assert_eq!(fx.db.list_messages(&conv).unwrap().len(), 1);
    view.close().await;
}

#[tokio::test]
async fn stored_wallpaper_is_rendered_as_a_direct_link() {
    let fx = fixture();
    fx.db
        .save_settings(
            fx.admin.user_id,
            &GlobalSettings {
                wallpaper_url: Some("https://www.dropbox.com/s/xyz/pic.jpg?dl=0".into()),
                retention_hours: 24,
            },
        )
        .unwrap();

    let view = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let mut rx = view.rendered();
    let thread = wait_for(&mut rx, |t| t.wallpaper_url.is_some()).await;
    assert_eq!(
        thread.wallpaper_url.as_deref(),
        Some("https://www.dropbox.com/s/xyz/pic.jpg?dl=1")
    );
    view.close().await;
}

#[tokio::test]
async fn reopening_the_same_conversation_detaches_the_old_view() {
    let fx = fixture();
    let first = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let second = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();

    eventually(|| !first.is_active()).await;
    assert!(second.is_active());
    assert_eq!(fx.hub.open_views(), 1);

    // Closing the displaced view must not drop the newer registration
    first.close().await;
    assert_eq!(fx.hub.open_views(), 1);

    second.close().await;
    assert_eq!(fx.hub.open_views(), 0);
}

#[tokio::test]
async fn each_viewer_gets_their_own_registration() {
    let fx = fixture();
    let alice_view = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let bob_view = ConversationView::open(fx.hub.clone(), fx.bob, fx.alice.user_id)
        .await
        .unwrap();
    assert_eq!(fx.hub.open_views(), 2);

    drop(alice_view);
    assert_eq!(fx.hub.open_views(), 1);
    bob_view.close().await;
    assert_eq!(fx.hub.open_views(), 0);
}

#[tokio::test]
async fn closing_a_view_ends_its_rendered_feed() {
    let fx = fixture();
    let view = ConversationView::open(fx.hub.clone(), fx.alice, fx.bob.user_id)
        .await
        .unwrap();
    let mut rx = view.rendered();

    view.close().await;

    // Both senders are gone once close returns, so the feed drains and stops
    let drained = async {
        while rx.changed().await.is_ok() {
            rx.borrow_and_update();
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(5), drained)
        .await
        .expect("rendered feed still open after close");
    assert_eq!(fx.hub.open_views(), 0);
}
