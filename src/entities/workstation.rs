use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of physical workstations in the depot.
///
/// Only `packing` stations may receive inventory transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkstationKind {
    Storage,
    Packing,
    Checking,
}

impl WorkstationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkstationKind::Storage => "storage",
            WorkstationKind::Packing => "packing",
            WorkstationKind::Checking => "checking",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "storage" => Some(WorkstationKind::Storage),
            "packing" => Some(WorkstationKind::Packing),
            "checking" => Some(WorkstationKind::Checking),
            _ => None,
        }
    }

    /// Whether inventory may be moved into this kind of station.
    pub fn is_receiving(&self) -> bool {
        matches!(self, WorkstationKind::Packing)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workstations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub kind: String, // Storing as string in DB, but will convert to/from enum
    pub associated_device_id: Option<String>,
    pub audited_by: Option<Uuid>,
    pub audited_at: Option<DateTimeUtc>,
    pub deleted_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn kind(&self) -> Option<WorkstationKind> {
        WorkstationKind::from_str(&self.kind)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::workstation_audit::Entity")]
    WorkstationAudit,
    #[sea_orm(has_many = "super::workstation_transaction::Entity")]
    WorkstationTransaction,
}

impl Related<super::workstation_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkstationAudit.def()
    }
}

impl Related<super::workstation_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkstationTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
