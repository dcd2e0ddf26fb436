// Queue Settings - operator-tunable limits shared by both queues

use super::queue::QueueKind;
use serde::{Deserialize, Serialize};

/// Lowest concurrency a writer may apply
pub const MIN_CONCURRENCY: usize = 1;

/// Lowest global queue depth a writer may apply
pub const MIN_MAX_QUEUE: usize = 10;

/// Default local concurrency of the answer queue
pub const DEFAULT_ANSWER_CONCURRENCY: usize = 8;

/// Default local concurrency of the submit queue
pub const DEFAULT_SUBMIT_CONCURRENCY: usize = 2;

/// Default global max queue depth
pub const DEFAULT_MAX_QUEUE: usize = 200;

/// Run-time queue limits
///
/// Always holds clamped values: every constructor and update goes through
/// [`QueueSettings::clamped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub answer_concurrency: usize,
    pub submit_concurrency: usize,
    pub max_queue: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            answer_concurrency: DEFAULT_ANSWER_CONCURRENCY,
            submit_concurrency: DEFAULT_SUBMIT_CONCURRENCY,
            max_queue: DEFAULT_MAX_QUEUE,
        }
    }
}

impl QueueSettings {
    pub fn new(answer_concurrency: usize, submit_concurrency: usize, max_queue: usize) -> Self {
        Self {
            answer_concurrency,
            submit_concurrency,
            max_queue,
        }
        .clamped()
    }

    /// Raise every field to its minimum
    pub fn clamped(self) -> Self {
        Self {
            answer_concurrency: self.answer_concurrency.max(MIN_CONCURRENCY),
            submit_concurrency: self.submit_concurrency.max(MIN_CONCURRENCY),
            max_queue: self.max_queue.max(MIN_MAX_QUEUE),
        }
    }

    pub fn concurrency_for(&self, kind: QueueKind) -> usize {
        match kind {
            QueueKind::Answer => self.answer_concurrency,
            QueueKind::Submit => self.submit_concurrency,
        }
    }

    /// Apply a partial update, clamping the result
    pub fn apply(&self, patch: &QueueSettingsPatch) -> Self {
        Self {
            answer_concurrency: patch.answer_concurrency.unwrap_or(self.answer_concurrency),
            submit_concurrency: patch.submit_concurrency.unwrap_or(self.submit_concurrency),
            max_queue: patch.max_queue.unwrap_or(self.max_queue),
        }
        .clamped()
    }
}

/// Partial settings update from the admin surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettingsPatch {
    #[serde(default)]
    pub answer_concurrency: Option<usize>,
    #[serde(default)]
    pub submit_concurrency: Option<usize>,
    #[serde(default)]
    pub max_queue: Option<usize>,
}

impl QueueSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.answer_concurrency.is_none()
            && self.submit_concurrency.is_none()
            && self.max_queue.is_none()
    }

    /// Whether the patch changes the local concurrency of `kind`
    pub fn touches(&self, kind: QueueKind) -> bool {
        match kind {
            QueueKind::Answer => self.answer_concurrency.is_some(),
            QueueKind::Submit => self.submit_concurrency.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_to_minimums() {
        let settings = QueueSettings::new(0, 0, 3);
        assert_eq!(settings.answer_concurrency, MIN_CONCURRENCY);
        assert_eq!(settings.submit_concurrency, MIN_CONCURRENCY);
        assert_eq!(settings.max_queue, MIN_MAX_QUEUE);
    }

    #[test]
    fn test_apply_only_changes_patched_fields() {
        let base = QueueSettings::default();
        let patch = QueueSettingsPatch {
            submit_concurrency: Some(5),
            ..Default::default()
        };

        let next = base.apply(&patch);
        assert_eq!(next.answer_concurrency, DEFAULT_ANSWER_CONCURRENCY);
        assert_eq!(next.submit_concurrency, 5);
        assert_eq!(next.max_queue, DEFAULT_MAX_QUEUE);
        assert!(patch.touches(QueueKind::Submit));
        assert!(!patch.touches(QueueKind::Answer));
    }

    #[test]
    fn test_apply_clamps_patched_values() {
        let patch = QueueSettingsPatch {
            answer_concurrency: Some(0),
            submit_concurrency: None,
            max_queue: Some(1),
        };
        let next = QueueSettings::default().apply(&patch);
        assert_eq!(next.answer_concurrency, 1);
        assert_eq!(next.max_queue, 10);
    }

    #[test]
    fn test_patch_deserializes_partial_json() {
        let patch: QueueSettingsPatch = serde_json::from_str(r#"{"max_queue": 50}"#).unwrap();
        assert_eq!(patch.max_queue, Some(50));
        assert!(patch.answer_concurrency.is_none());
        assert!(!patch.is_empty());
        assert!(QueueSettingsPatch::default().is_empty());
    }
}
