use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Explicit itinerary lifecycle.
///
/// Replaces the legacy "active or touched within the last six hours"
/// inference: every transition is stamped, and a closed itinerary stays
/// closed no matter how recently it was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItineraryState {
    Preparing,
    Loaded,
    InRoute,
    Closed,
}

impl ItineraryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItineraryState::Preparing => "preparing",
            ItineraryState::Loaded => "loaded",
            ItineraryState::InRoute => "in_route",
            ItineraryState::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "preparing" => Some(ItineraryState::Preparing),
            "loaded" => Some(ItineraryState::Loaded),
            "in_route" => Some(ItineraryState::InRoute),
            "closed" => Some(ItineraryState::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "itineraries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub vehicle_id: i64,
    pub user_id: Uuid,
    pub state: String, // Storing as string in DB, but will convert to/from enum
    pub is_active: bool,
    pub auto_cancelled: bool,
    pub prepared_at: Option<DateTimeUtc>,
    pub loaded_at: Option<DateTimeUtc>,
    pub closed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn state(&self) -> Option<ItineraryState> {
        ItineraryState::from_str(&self.state)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::vehicle::Entity",
        from = "Column::VehicleId",
        to = "super::vehicle::Column::Id"
    )]
    Vehicle,
    #[sea_orm(has_many = "super::itinerary_action::Entity")]
    ItineraryAction,
    #[sea_orm(has_many = "super::pack_action::Entity")]
    PackAction,
}

impl Related<super::vehicle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vehicle.def()
    }
}

impl Related<super::itinerary_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItineraryAction.def()
    }
}

impl Related<super::pack_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackAction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
