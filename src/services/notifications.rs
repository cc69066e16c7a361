use crate::errors::ServiceError;
use crate::events::Event;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// The depot management distribution list.
    DepotManagement,
    /// A single user (workstation owner, driver's manager).
    User(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
}

/// Transport seam for push/email delivery. The real transports live outside
/// the core; tests and default wiring use the tracing-backed dispatcher.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> Result<(), ServiceError>;
}

/// Default dispatcher: records the notification in the log stream.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<(), ServiceError> {
        info!(
            recipient = ?notification.recipient,
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Fire-and-forget notification surface.
///
/// Dispatch happens strictly after the owning transaction has committed, and
/// a delivery failure never surfaces to the caller that wrote the data.
pub struct NotificationService {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl NotificationService {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn with_log_dispatcher() -> Self {
        Self::new(Arc::new(LogDispatcher))
    }

    /// Dispatches a notification, logging and swallowing any failure.
    pub async fn notify(&self, notification: Notification) {
        if let Err(e) = self.dispatcher.dispatch(&notification).await {
            warn!(
                error = %e,
                subject = %notification.subject,
                "notification dispatch failed, dropping"
            );
        }
    }

    /// Maps a committed domain event to the notification it owes, if any.
    pub fn for_event(event: &Event) -> Option<Notification> {
        match event {
            Event::WorkstationAudited {
                workstation_name,
                auditor_id,
                inventory_changes,
                ..
            } => Some(Notification {
                // The user who ran the audit gets the change summary.
                recipient: Recipient::User(*auditor_id),
                subject: format!("Inventory audit changes at {}", workstation_name),
                body: inventory_changes.to_string(),
            }),
            Event::InventoryMoved {
                source_workstation_name,
                dest_workstation_name,
                batch_id,
                quantity,
                ..
            } => Some(Notification {
                recipient: Recipient::DepotManagement,
                subject: "Inventory movement".to_string(),
                body: format!(
                    "{} pack(s) of batch {} moved from {} to {}",
                    quantity, batch_id, source_workstation_name, dest_workstation_name
                ),
            }),
            Event::WorkstationDeviceChanged {
                workstation_name,
                device_id,
                ..
            } => Some(Notification {
                recipient: Recipient::DepotManagement,
                subject: format!("Device association changed for {}", workstation_name),
                body: format!("Workstation is now associated with device {}", device_id),
            }),
            Event::VehicleUnloaded {
                itinerary_id,
                pack_count,
                ..
            } => Some(Notification {
                recipient: Recipient::DepotManagement,
                subject: "Vehicle unloaded".to_string(),
                body: format!(
                    "Itinerary {} closed with {} pack(s) returned",
                    itinerary_id, pack_count
                ),
            }),
            // Routine itinerary progress does not page anyone.
            Event::ItineraryPrepared { .. }
            | Event::VehicleLoaded { .. }
            | Event::VehicleLoadCorrected { .. }
            | Event::InventoryAdjusted { .. } => None,
        }
    }
}
