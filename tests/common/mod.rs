#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use depot_core::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        batch, drug, station_order,
        station_order::OrderStatus,
        vehicle,
        vehicle::VehicleStatus,
        workstation,
        workstation::WorkstationKind,
    },
    events,
    services::notifications::NotificationService,
    AppState,
};
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

/// Helper harness for spinning up an application state backed by an
/// in-memory SQLite database.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (state, event_rx) = AppState::new(Arc::new(pool), cfg);
        let notifications = Arc::new(NotificationService::with_log_dispatcher());
        let event_task = events::spawn_event_processor(event_rx, notifications);

        Self {
            state,
            _event_task: event_task,
        }
    }

    pub async fn seed_drug(&self, name: &str) -> drug::Model {
        drug::ActiveModel {
            name: Set(name.to_string()),
            code: Set(Some(format!("code-{}", name.to_lowercase()))),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed drug for tests")
    }

    pub async fn seed_batch(&self, drug_id: i64, batch_no: &str) -> batch::Model {
        batch::ActiveModel {
            drug_id: Set(drug_id),
            batch_no: Set(batch_no.to_string()),
            expiry_date: Set(NaiveDate::from_ymd_opt(2027, 6, 30).expect("valid expiry date")),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed batch for tests")
    }

    pub async fn seed_workstation(&self, name: &str, kind: WorkstationKind) -> workstation::Model {
        let now = Utc::now();
        workstation::ActiveModel {
            name: Set(name.to_string()),
            kind: Set(kind.as_str().to_string()),
            associated_device_id: Set(None),
            audited_by: Set(None),
            audited_at: Set(None),
            deleted_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed workstation for tests")
    }

    pub async fn seed_vehicle(&self, fleet_no: &str) -> vehicle::Model {
        let now = Utc::now();
        vehicle::ActiveModel {
            fleet_no: Set(fleet_no.to_string()),
            status: Set(VehicleStatus::Available.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed vehicle for tests")
    }

    pub async fn seed_station_order(&self, station_id: i64, order_no: &str) -> station_order::Model {
        let now = Utc::now();
        station_order::ActiveModel {
            station_id: Set(station_id),
            order_no: Set(order_no.to_string()),
            status: Set(OrderStatus::Packed.as_str().to_string()),
            loaded_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed station order for tests")
    }
}

pub fn some_user() -> Uuid {
    Uuid::new_v4()
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
