use crate::services::notifications::NotificationService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a transaction has committed.
    ///
    /// Failures are logged and swallowed: a committed data write must never
    /// be reported as failed because its notification could not be queued.
    pub async fn send_post_commit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping post-commit event");
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Workstation ledger events
    WorkstationAudited {
        audit_id: i64,
        workstation_id: i64,
        workstation_name: String,
        auditor_id: Uuid,
        inventory_changes: serde_json::Value,
    },
    InventoryMoved {
        source_tx_id: i64,
        dest_tx_id: i64,
        source_workstation_name: String,
        dest_workstation_name: String,
        batch_id: i64,
        drug_id: i64,
        quantity: i64,
        user_id: Uuid,
        comment: Option<String>,
    },
    InventoryAdjusted {
        transaction_id: i64,
        workstation_id: i64,
        batch_id: i64,
        quantity: i64,
        transaction_type: String,
        user_id: Uuid,
    },
    WorkstationDeviceChanged {
        workstation_id: i64,
        workstation_name: String,
        device_id: String,
        user_id: Uuid,
    },

    // Itinerary events
    ItineraryPrepared {
        itinerary_id: i64,
        vehicle_id: i64,
        user_id: Uuid,
    },
    VehicleLoaded {
        itinerary_id: i64,
        action_id: i64,
        vehicle_id: i64,
        station_order_ids: Vec<i64>,
        pack_count: usize,
        user_id: Uuid,
    },
    VehicleLoadCorrected {
        itinerary_id: i64,
        action_id: i64,
        vehicle_id: i64,
        station_order_ids: Vec<i64>,
        pack_count: usize,
        user_id: Uuid,
    },
    VehicleUnloaded {
        itinerary_id: i64,
        action_id: i64,
        vehicle_id: i64,
        pack_count: usize,
        user_id: Uuid,
    },
}

impl Event {
    /// Short tag for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Event::WorkstationAudited { .. } => "workstation_audited",
            Event::InventoryMoved { .. } => "inventory_moved",
            Event::InventoryAdjusted { .. } => "inventory_adjusted",
            Event::WorkstationDeviceChanged { .. } => "workstation_device_changed",
            Event::ItineraryPrepared { .. } => "itinerary_prepared",
            Event::VehicleLoaded { .. } => "vehicle_loaded",
            Event::VehicleLoadCorrected { .. } => "vehicle_load_corrected",
            Event::VehicleUnloaded { .. } => "vehicle_unloaded",
        }
    }
}

/// Drains the event channel, turning events into notification dispatches.
///
/// Runs until every sender is dropped. Dispatch errors are logged and
/// swallowed; they never propagate back to the writer of the data.
pub fn spawn_event_processor(
    mut receiver: mpsc::Receiver<Event>,
    notifications: Arc<NotificationService>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            info!(event = event.name(), "processing event");
            if let Some(notification) = NotificationService::for_event(&event) {
                notifications.notify(notification).await;
            }
        }
        info!("event channel closed, processor exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        let event = Event::VehicleUnloaded {
            itinerary_id: 1,
            action_id: 2,
            vehicle_id: 3,
            pack_count: 0,
            user_id: Uuid::nil(),
        };
        assert_eq!(event.name(), "vehicle_unloaded");
    }

    #[tokio::test]
    async fn post_commit_send_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // Must not panic or error out.
        EventSender::new(tx)
            .send_post_commit(Event::ItineraryPrepared {
                itinerary_id: 1,
                vehicle_id: 1,
                user_id: Uuid::nil(),
            })
            .await;
    }
}
