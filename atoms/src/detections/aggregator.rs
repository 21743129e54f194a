use super::model::{CategoryCount, DetectedObject, DetectionSummary};

/// Normalize raw per-category counts.
///
/// Zero counts are dropped, the total is the sum of what remains, and each
/// retained category gets `100 * count / total`. Input order is preserved.
pub fn aggregate<I>(counts: I) -> DetectionSummary
where
    I: IntoIterator<Item = CategoryCount>,
{
    let retained: Vec<CategoryCount> = counts.into_iter().filter(|c| c.count > 0).collect();
    let total_objects: u32 = retained.iter().map(|c| c.count).sum();

    // Only reachable with an empty `retained`.
    if total_objects == 0 {
        return DetectionSummary::default();
    }

    let detected_objects = retained
        .into_iter()
        .map(|c| DetectedObject {
            percentage: f64::from(c.count) * 100.0 / f64::from(total_objects),
            class_name: c.class_name,
            count: c.count,
        })
        .collect();

    DetectionSummary {
        detected_objects,
        total_objects,
    }
}

/// Sum counts per category across several batches and renormalize.
/// Categories keep the order in which they were first seen.
pub fn merge_totals<'a, I>(batches: I) -> DetectionSummary
where
    I: IntoIterator<Item = &'a [DetectedObject]>,
{
    let mut merged: Vec<CategoryCount> = Vec::new();
    for object in batches.into_iter().flatten() {
        match merged.iter_mut().find(|c| c.class_name == object.class_name) {
            Some(existing) => existing.count += object.count,
            None => merged.push(CategoryCount::new(object.class_name.clone(), object.count)),
        }
    }
    aggregate(merged)
}
