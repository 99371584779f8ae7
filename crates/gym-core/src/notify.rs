//! Trainer notification seam
//!
//! Notifications are sent after the change they describe has committed.
//! A failed delivery never undoes the change; the engine reports it as a
//! warning on the operation's outcome instead.

use gym_util::{ClassId, TrainerId};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::info;

/// Message for a trainer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Trainer now teaches this class
    TrainerAssigned {
        trainer_id: TrainerId,
        class_id: ClassId,
        class_name: String,
        schedule: String,
    },

    /// Class moved to another trainer
    TrainerUnassigned {
        trainer_id: TrainerId,
        class_id: ClassId,
        class_name: String,
    },

    ScheduleChanged {
        trainer_id: TrainerId,
        class_id: ClassId,
        class_name: String,
        schedule: String,
    },

    ClassRemoved {
        trainer_id: TrainerId,
        class_id: ClassId,
        class_name: String,
    },
}

impl Notification {
    pub fn trainer_id(&self) -> &TrainerId {
        match self {
            Notification::TrainerAssigned { trainer_id, .. }
            | Notification::TrainerUnassigned { trainer_id, .. }
            | Notification::ScheduleChanged { trainer_id, .. }
            | Notification::ClassRemoved { trainer_id, .. } => trainer_id,
        }
    }

    /// One-line human-readable text
    pub fn summary(&self) -> String {
        match self {
            Notification::TrainerAssigned {
                class_id,
                class_name,
                schedule,
                ..
            } => format!("You have been assigned {} ({}): {}", class_name, class_id, schedule),
            Notification::TrainerUnassigned {
                class_id,
                class_name,
                ..
            } => format!("{} ({}) has been reassigned", class_name, class_id),
            Notification::ScheduleChanged {
                class_id,
                class_name,
                schedule,
                ..
            } => format!("{} ({}) is now {}", class_name, class_id, schedule),
            Notification::ClassRemoved {
                class_id,
                class_name,
                ..
            } => format!("{} ({}) has been removed", class_name, class_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Fire-and-forget delivery of trainer notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            trainer_id = %notification.trainer_id(),
            message = %notification.summary(),
            "Trainer notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mail server unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn removed() -> Notification {
        Notification::ClassRemoved {
            trainer_id: TrainerId::new("t-1"),
            class_id: ClassId::from_sequence(3),
            class_name: "Kickboxing".into(),
        }
    }

    #[test]
    fn recording_notifier_keeps_messages() {
        let notifier = RecordingNotifier::new();
        notifier.notify(&removed()).unwrap();
        assert_eq!(notifier.sent(), vec![removed()]);
    }

    #[test]
    fn recording_notifier_can_fail() {
        let notifier = RecordingNotifier::new();
        notifier.set_failing(true);
        assert!(notifier.notify(&removed()).is_err());
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn summary_names_the_class() {
        assert_eq!(removed().summary(), "Kickboxing (CLS-0003) has been removed");
        assert_eq!(removed().trainer_id().as_str(), "t-1");
    }
}
