pub mod batch;
pub mod providers;

pub use batch::resolve_in_order;
pub use providers::{MetadataProvider, TmdbProvider};
