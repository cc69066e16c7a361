use async_trait::async_trait;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the action did to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Load,
    Unload,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Load => "load",
            ActionKind::Unload => "unload",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "load" => Some(ActionKind::Load),
            "unload" => Some(ActionKind::Unload),
            _ => None,
        }
    }
}

/// Amendability of a log row.
///
/// Only the single most recent `open` action of a kind may be merged into or
/// corrected; appending a different-kind action closes it. This replaces the
/// legacy habit of rewriting whichever row happened to be newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPhase {
    Open,
    Closed,
}

impl ActionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPhase::Open => "open",
            ActionPhase::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ActionPhase::Open),
            "closed" => Some(ActionPhase::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "itinerary_actions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub itinerary_id: i64,
    pub user_id: Uuid,
    pub kind: String,  // Storing as string in DB, but will convert to/from enum
    pub phase: String, // open | closed
    pub station_order_ids: Json,
    pub collected_blanket_no: i32,
    pub pickup: Option<Json>,
    pub dropoff: Option<Json>,
    pub proof_pickup: Option<Json>,
    pub proof_dropoff: Option<Json>,
    pub comment: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::from_str(&self.kind)
    }

    pub fn phase(&self) -> Option<ActionPhase> {
        ActionPhase::from_str(&self.phase)
    }

    /// The ordered station order id set carried by this action.
    pub fn order_ids(&self) -> Vec<i64> {
        serde_json::from_value(self.station_order_ids.clone()).unwrap_or_default()
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
    #[sea_orm(has_many = "super::pack_action::Entity")]
    PackAction,
}

impl Related<super::itinerary::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Itinerary.def()
    }
}

impl Related<super::pack_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackAction.def()
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
        active_model.updated_at = Set(Utc::now());
        Ok(active_model)
    }
}
