//! Attendance writer — applies transition intents to the store.

use crate::records::{Applied, TransitionIntent};
use crate::store::{Store, StoreError};

/// Apply one transition intent: upsert-by-latest on (student, class), then
/// append an audit line. Audit append is best-effort — its failure is
/// logged and never rolls back the attendance write.
pub async fn apply(store: &Store, intent: &TransitionIntent) -> Result<Applied, StoreError> {
    let applied = store.apply_transition(intent).await?;

    let line = format!(
        "student {} marked {} for class {} at {}",
        intent.student_id,
        intent.status.as_str(),
        intent.class_id,
        intent.marked_at.to_rfc3339()
    );
    if let Err(err) = store.append_activity_log(&line).await {
        tracing::warn!(error = %err, "activity log append failed; attendance write kept");
    }

    Ok(applied)
}
