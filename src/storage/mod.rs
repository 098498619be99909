pub mod db;
pub mod inventory;
pub mod migrations;
pub mod renewals;

pub use db::Db;
pub use inventory::InventoryStore;
pub use renewals::RenewalStore;
