pub mod bucketize;
pub mod cache;
pub mod reader;
pub mod source;

pub use cache::{CacheStats, DashboardCache, NoopCache, TtlCache};
pub use reader::{caller_scope, DashboardReader};
pub use source::{InMemoryRecordSource, RecordSource, SourceBackend, SupabaseRecordSource, PAGE_SIZE};
