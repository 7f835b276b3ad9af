use crate::train::TrainEntity;

/// Trains whose number contains `query`, ignoring case. An empty query
/// matches every train. Input order is preserved.
pub fn filter_by_number<'a>(
    trains: impl IntoIterator<Item = &'a TrainEntity>,
    query: &str,
) -> Vec<&'a TrainEntity> {
    let needle = query.to_lowercase();
    trains
        .into_iter()
        .filter(|train| needle.is_empty() || train.number.to_lowercase().contains(&needle))
        .collect()
}
