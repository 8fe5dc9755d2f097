use std::collections::HashMap;

use crate::models::{
    AggregatedMediaData, ExternalIdRecord, MediaItem, MediaKey, RatingRecord, RuntimeRecord,
};

/// Joins the three batch results back onto `items`.
///
/// `external_ids` corresponds positionally to `items`; runtimes and ratings are
/// matched by external id. A batch that has not resolved (or failed) is passed
/// as `None` and simply contributes nothing.
///
/// The result holds exactly one entry per distinct item key, even when every
/// source is unavailable. Runtime and rating data are only attached through the
/// item's own external id.
pub fn aggregate(
    items: &[MediaItem],
    external_ids: Option<&[ExternalIdRecord]>,
    runtimes: Option<&[RuntimeRecord]>,
    ratings: Option<&[RatingRecord]>,
) -> HashMap<MediaKey, AggregatedMediaData> {
    let runtime_index: HashMap<&str, &RuntimeRecord> = runtimes
        .unwrap_or_default()
        .iter()
        .map(|record| (record.external_id.as_str(), record))
        .collect();
    let rating_index: HashMap<&str, &RatingRecord> = ratings
        .unwrap_or_default()
        .iter()
        .map(|record| (record.external_id.as_str(), record))
        .collect();
    let external_ids = external_ids.unwrap_or_default();

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            // a record for another title means the batches are out of step
            let ids = external_ids
                .get(i)
                .filter(|record| record.id == item.id && record.kind == item.kind);

            let external_id = ids.and_then(|record| record.external_id.as_deref());
            let data = AggregatedMediaData {
                external_ids: ids.cloned(),
                runtime: external_id
                    .and_then(|id| runtime_index.get(id))
                    .map(|record| (*record).clone()),
                rating: external_id
                    .and_then(|id| rating_index.get(id))
                    .map(|record| (*record).clone()),
            };

            (item.key(), data)
        })
        .collect()
}
