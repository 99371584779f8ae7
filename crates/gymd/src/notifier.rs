//! Trainer notification delivery

use gym_config::Trainer;
use gym_core::{Notification, Notifier, NotifyError};
use gym_util::TrainerId;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Hands notifications to a background task so engine calls never wait on
/// delivery.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Start the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(trainers: &[Trainer]) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let directory: HashMap<TrainerId, Trainer> = trainers
            .iter()
            .map(|t| (t.id.clone(), t.clone()))
            .collect();

        let handle = tokio::spawn(deliver(rx, directory));
        (Self { tx }, handle)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

async fn deliver(
    mut rx: mpsc::UnboundedReceiver<Notification>,
    directory: HashMap<TrainerId, Trainer>,
) {
    while let Some(notification) = rx.recv().await {
        let trainer = directory.get(notification.trainer_id());
        match trainer.and_then(|t| t.email.as_deref()) {
            Some(email) => info!(
                trainer_id = %notification.trainer_id(),
                email,
                message = %notification.summary(),
                "Trainer notified"
            ),
            None => debug!(
                trainer_id = %notification.trainer_id(),
                message = %notification.summary(),
                "No email on file, notification logged only"
            ),
        }
    }
    debug!("Notification channel closed");
}
