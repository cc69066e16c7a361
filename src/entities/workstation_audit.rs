use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory snapshot for one workstation.
///
/// `batch_quantities` pins the absolute batch -> quantity mapping observed by
/// the auditor; `inventory_changes` records the signed delta against the
/// derived inventory at audit time. Rows are immutable; the latest audit per
/// workstation (greatest id) is the authoritative reconciliation baseline.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "workstation_audits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub workstation_id: i64,
    pub auditor_id: Uuid,
    pub comment: Option<String>,
    pub batch_quantities: Json,
    pub inventory_changes: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::workstation::Entity",
        from = "Column::WorkstationId",
        to = "super::workstation::Column::Id"
    )]
    Workstation,
    #[sea_orm(has_many = "super::workstation_transaction::Entity")]
    WorkstationTransaction,
}

impl Related<super::workstation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Workstation.def()
    }
}

impl Related<super::workstation_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkstationTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
