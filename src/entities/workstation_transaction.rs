use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Types of workstation ledger transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    AuditCorrection,
    MoveIn,
    MoveOut,
    ExternalImport,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::AuditCorrection => "audit_correction",
            TransactionType::MoveIn => "move_in",
            TransactionType::MoveOut => "move_out",
            TransactionType::ExternalImport => "external_import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "audit_correction" => Some(TransactionType::AuditCorrection),
            "move_in" => Some(TransactionType::MoveIn),
            "move_out" => Some(TransactionType::MoveOut),
            "external_import" => Some(TransactionType::ExternalImport),
            _ => None,
        }
    }
}

/// Append-only ledger row for one workstation.
///
/// `audit_id` points at the snapshot the row was measured against (None only
/// for workstations that have never been audited). `running_total` is the
/// on-hand quantity for the batch after this row, materialized at write time
/// so reads never re-sum history. Rows are never updated after insert except
/// to attach `linked_transaction_id` to the first half of a move pair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workstation_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub workstation_id: i64,
    pub audit_id: Option<i64>,
    pub user_id: Uuid,
    pub batch_id: i64,
    pub transaction_type: String, // Storing as string in DB, but will convert to/from enum
    pub quantity: i64,
    pub running_total: i64,
    pub linked_transaction_id: Option<i64>,
    pub linked_workstation_name: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn transaction_type(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.transaction_type)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::workstation::Entity",
        from = "Column::WorkstationId",
        to = "super::workstation::Column::Id"
    )]
    Workstation,
    #[sea_orm(
        belongs_to = "super::workstation_audit::Entity",
        from = "Column::AuditId",
        to = "super::workstation_audit::Column::Id"
    )]
    WorkstationAudit,
    #[sea_orm(
        belongs_to = "super::batch::Entity",
        from = "Column::BatchId",
        to = "super::batch::Column::Id"
    )]
    Batch,
}

impl Related<super::workstation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workstation.def()
    }
}

impl Related<super::workstation_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkstationAudit.def()
    }
}

impl Related<super::batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
