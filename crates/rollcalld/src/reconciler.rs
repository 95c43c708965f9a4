//! Detection reconciler — at most one attendance transition per student
//! per class, with a per-identity cool-down.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rollcall_core::Detection;
use rollcall_store::{AttendanceStatus, ClassWindow, TransitionIntent};

/// Converts a frame's detections into transition intents.
///
/// Owns the debounce set exclusively; entries expire lazily on each call.
pub struct Reconciler {
    cooldown: Duration,
    debounce: HashMap<String, Instant>,
    class_id: Option<i64>,
}

impl Reconciler {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            debounce: HashMap::new(),
            class_id: None,
        }
    }

    /// Reconcile one tick for the active window.
    ///
    /// `now` drives debounce expiry; `marked_at` is the wall-clock stamp
    /// carried by emitted intents. Unmatched detections never emit.
    pub fn reconcile(
        &mut self,
        window: &ClassWindow,
        detections: &[Detection],
        now: Instant,
        marked_at: DateTime<Utc>,
    ) -> Vec<TransitionIntent> {
        // A new class is a new attendance context; cool-downs from the
        // previous one must not suppress re-entries.
        if self.class_id != Some(window.id) {
            self.debounce.clear();
            self.class_id = Some(window.id);
        }

        self.debounce.retain(|_, expiry| *expiry > now);

        let mut intents = Vec::new();
        for detection in detections {
            let Some(identity) = &detection.identity else {
                continue;
            };
            if self.debounce.contains_key(&identity.student_id) {
                continue;
            }
            self.debounce
                .insert(identity.student_id.clone(), now + self.cooldown);
            intents.push(TransitionIntent {
                student_id: identity.student_id.clone(),
                class_id: window.id,
                status: AttendanceStatus::Present,
                marked_at,
            });
        }
        intents
    }

    /// Drop all debounce state when capture for a class ends.
    pub fn clear(&mut self) {
        self.debounce.clear();
        self.class_id = None;
    }
}
