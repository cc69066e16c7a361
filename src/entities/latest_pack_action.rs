use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized pointer to the most recent non-deleted pack action per pack.
///
/// Materialized view over `pack_actions`: refreshed inside the same
/// transaction as every pack-action write or soft-delete, never maintained
/// out of band. All pointer fields are cleared (None) when no surviving
/// action remains for the pack.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "latest_pack_actions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub pack_id: i64,
    pub pack_action_id: Option<i64>,
    pub kind: Option<String>,
    pub user_id: Option<Uuid>,
    pub itinerary_id: Option<i64>,
    pub itinerary_action_id: Option<i64>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
