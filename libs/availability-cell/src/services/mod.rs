pub mod availability;
pub mod bulk;
pub mod delete_flow;
pub mod rules;
pub mod store;

pub use availability::AvailabilityService;
pub use bulk::BulkUpdateCoordinator;
pub use delete_flow::DeleteFlow;
pub use store::{AvailabilityStore, InMemoryAvailabilityStore, StoreBackend, SupabaseAvailabilityStore};
