use std::cmp::Ordering;

use crate::geofile::feature::{AttributeValue, Feature};

use super::{SortKey, SortOrder};

/// Whether `feature` has no usable value for `key`. Distances are missing when unset, fields
/// when absent, null or empty.
pub fn is_missing_key(feature: &Feature, key: &SortKey) -> bool {
    match key {
        SortKey::Distance => feature.distance.is_none(),
        SortKey::Field(field) => !feature.has_value(field),
    }
}

/// Unset distances order after every set distance.
fn compare_distance(a: &Feature, b: &Feature) -> Ordering {
    match (a.distance, b.distance) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn present_value<'a>(feature: &'a Feature, field: &str) -> Option<&'a AttributeValue> {
    feature.attribute(field).filter(|value| !value.is_missing())
}

/// Missing values order after every present value.
fn compare_field(a: &Feature, b: &Feature, field: &str) -> Ordering {
    match (present_value(a, field), present_value(b, field)) {
        (Some(a), Some(b)) => a.total_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_primary(a: &Feature, b: &Feature, key: &SortKey) -> Ordering {
    match key {
        SortKey::Distance => compare_distance(a, b),
        SortKey::Field(field) => compare_field(a, b, field),
    }
}

/// Ascending comparator used for both partitions.
///
/// Ties on a field key fall back to distance and then to the identifier. Ties on distance fall
/// back to the identifier only. Unset distances and missing identifiers sort after set ones,
/// which keeps the comparator a total order.
pub fn compare_features(a: &Feature, b: &Feature, key: &SortKey, id_field: &str) -> Ordering {
    compare_primary(a, b, key).then_with(|| match key {
        SortKey::Distance => compare_field(a, b, id_field),
        SortKey::Field(_) => {
            compare_distance(a, b).then_with(|| compare_field(a, b, id_field))
        }
    })
}

/// Partition by presence of the sort key, sort each partition, and join them with the missing
/// partition last for ascending order and first for descending order.
///
/// Records missing a field are ordered by distance and identifier like the rest.
pub fn sort_features(
    features: Vec<Feature>,
    key: &SortKey,
    order: SortOrder,
    id_field: &str,
) -> Vec<Feature> {
    let (mut present, mut missing): (Vec<Feature>, Vec<Feature>) = features
        .into_iter()
        .partition(|feature| !is_missing_key(feature, key));
    present.sort_by(|a, b| compare_features(a, b, key, id_field));
    // Records without a distance keep their input order.
    if let SortKey::Field(_) = key {
        missing.sort_by(|a, b| compare_features(a, b, key, id_field));
    }
    log::debug!(
        "Sorted {} records by {:?}, {} without a value",
        present.len() + missing.len(),
        key,
        missing.len()
    );
    match order {
        SortOrder::Asc => {
            present.append(&mut missing);
            present
        }
        SortOrder::Desc => {
            missing.append(&mut present);
            missing
        }
    }
}
