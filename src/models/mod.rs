//! Domain and wire types shared by the server routes and the client core.

pub mod batch;
pub mod media;
pub mod watch_later;

pub use batch::{
    is_valid_external_id, AggregatedMediaData, BatchResponse, ExternalIdRecord,
    ExternalIdsBatchRequest, ExternalKeyBatchRequest, RatingRecord, RuntimeRecord,
};
pub use media::{Genre, MediaItem, MediaKey, MediaKind, Page, TimeWindow};
pub use watch_later::{WatchLaterEntry, WatchLaterRequest};
