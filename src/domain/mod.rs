pub mod event;

pub use event::{EventBatch, InventoryEvent};
