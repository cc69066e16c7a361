use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use super::itinerary_action::ActionKind;

/// How the pack identifier entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMethod {
    Scanned,
    Manual,
}

impl InputMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMethod::Scanned => "scanned",
            InputMethod::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scanned" => Some(InputMethod::Scanned),
            "manual" => Some(InputMethod::Manual),
            _ => None,
        }
    }
}

/// Append-only record of one pack being loaded onto or unloaded from a
/// vehicle. Soft-deletable: a corrected load marks its prior rows with
/// `deleted_at` instead of erasing them. `itinerary_action_id` is set for
/// unloads only, matching the action row the pack was delivered under.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pack_actions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub pack_id: i64,
    pub user_id: Uuid,
    pub kind: String, // Storing as string in DB, but will convert to/from enum
    pub input_method: String,
    pub itinerary_id: i64,
    pub itinerary_action_id: Option<i64>,
    pub deleted_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::from_str(&self.kind)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::itinerary::Entity",
        from = "Column::ItineraryId",
        to = "super::itinerary::Column::Id"
    )]
    Itinerary,
    #[sea_orm(
        belongs_to = "super::itinerary_action::Entity",
        from = "Column::ItineraryActionId",
        to = "super::itinerary_action::Column::Id"
    )]
    ItineraryAction,
}

impl Related<super::itinerary::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Itinerary.def()
    }
}

impl Related<super::itinerary_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItineraryAction.def()
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
