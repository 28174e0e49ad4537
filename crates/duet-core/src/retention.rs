use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use tracing::{info, warn};

use duet_types::events::StoreEvent;
use duet_types::models::{ConversationKey, GlobalSettings};

use crate::error::CoreResult;
use crate::hub::Hub;

/// Outcome of one retention pass over a conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Messages older than the cutoff
    pub matched: usize,
    pub deleted: usize,
    /// Saved messages left alone
    pub exempt: usize,
    /// Saved or otherwise changed between the read and the delete
    pub skipped: usize,
    pub failed: usize,
}

/// `now - retention_hours`, in milliseconds. A window reaching past the
/// earliest representable instant yields that instant, so nothing matches.
pub fn cutoff(now: DateTime<Utc>, retention_hours: u32) -> DateTime<Utc> {
    TimeDelta::try_milliseconds(i64::from(retention_hours) * 3600 * 1000)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Delete every unsaved message created strictly before the cutoff.
///
/// Deletes run concurrently and each one may fail on its own; the pass
/// finishes once all of them have settled. Only the initial range read can
/// fail the whole sweep.
pub async fn sweep(
    hub: &Hub,
    conversation: &ConversationKey,
    settings: &GlobalSettings,
    now: DateTime<Utc>,
) -> CoreResult<SweepReport> {
    let cutoff = cutoff(now, settings.retention_hours);

    let key = conversation.clone();
    let expired = hub
        .run(move |store| store.messages_before(&key, cutoff))
        .await?;

    let mut report = SweepReport {
        matched: expired.len(),
        ..SweepReport::default()
    };

    let (exempt, doomed): (Vec<_>, Vec<_>) = expired.into_iter().partition(|m| m.saved);
    report.exempt = exempt.len();

    let deletes = doomed.iter().map(|message| {
        let key = conversation.clone();
        let id = message.id;
        async move {
            let removed = hub
                .run(move |store| store.delete_expired(&key, id, cutoff))
                .await?;
            if removed {
                hub.publish(StoreEvent::MessageDeleted {
                    conversation: conversation.clone(),
                    message_id: id,
                });
            }
            CoreResult::<bool>::Ok(removed)
        }
    });

    for (message, result) in doomed.iter().zip(join_all(deletes).await) {
        match result {
            Ok(true) => report.deleted += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                warn!("Cleanup error on message {}: {}", message.id, e);
            }
        }
    }

    if report.matched > 0 {
        info!(
            "Cleanup in {}: {} expired, {} deleted, {} saved, {} skipped, {} failed",
            conversation, report.matched, report.deleted, report.exempt, report.skipped, report.failed
        );
    }

    Ok(report)
}
