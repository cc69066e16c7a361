//! Depot Core Library
//!
//! This crate provides the inventory ledger and vehicle itinerary core for
//! the pharmacy depot: audited workstation stock with derived on-hand
//! quantities, atomic inter-workstation transfers, and the load/unload
//! action log for delivery vehicles.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
}

impl AppState {
    /// Wires up the shared state and the event channel. The caller decides
    /// what to do with the receiver, typically handing it to
    /// [`events::spawn_event_processor`].
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> (Self, mpsc::Receiver<events::Event>) {
        let (tx, rx) = mpsc::channel(config.event_buffer_size);
        let state = Self {
            db,
            config,
            event_sender: Arc::new(events::EventSender::new(tx)),
        };
        (state, rx)
    }

    pub fn inventory_service(&self) -> services::InventoryService {
        services::InventoryService::new(self.db.clone(), self.event_sender.clone())
    }

    pub fn transfer_service(&self) -> services::TransferService {
        services::TransferService::new(self.db.clone(), self.event_sender.clone())
    }

    pub fn itinerary_service(&self) -> services::ItineraryService {
        services::ItineraryService::new(self.db.clone(), self.event_sender.clone())
    }
}

pub mod prelude {
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::services::*;
    pub use crate::AppState;
}
