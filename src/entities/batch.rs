use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A specific lot of a drug. Immutable once created; resolved or created
/// idempotently by `(drug_id, batch_no)`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub drug_id: i64,
    pub batch_no: String,
    pub expiry_date: Date,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::drug::Entity",
        from = "Column::DrugId",
        to = "super::drug::Column::Id"
    )]
    Drug,
    #[sea_orm(has_many = "super::workstation_transaction::Entity")]
    WorkstationTransaction,
}

impl Related<super::drug::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Drug.def()
    }
}

impl Related<super::workstation_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkstationTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
