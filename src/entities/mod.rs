pub mod batch;
pub mod drug;
pub mod itinerary;
pub mod itinerary_action;
pub mod latest_pack_action;
pub mod pack_action;
pub mod station_order;
pub mod vehicle;
pub mod workstation;
pub mod workstation_audit;
pub mod workstation_transaction;
