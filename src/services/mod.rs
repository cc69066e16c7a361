pub mod inventory;
pub mod itineraries;
pub mod notifications;
pub mod transfers;

pub use inventory::InventoryService;
pub use itineraries::ItineraryService;
pub use notifications::NotificationService;
pub use transfers::TransferService;
