use std::{cmp::Ordering, collections::HashMap};

use crate::geofile::feature::{AttributeValue, Feature};

use super::{GroupSortKey, GroupSpec, SortOrder};

/// A bucket of records sharing a group field value.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: String,
    pub value: AttributeValue,
    pub label: String,
    pub count: usize,
    pub features: Vec<Feature>,
}

/// Label shown for a group or a record title: trimmed text, or `no_value_label` when there is
/// nothing to show.
pub fn display_label(value: Option<&AttributeValue>, no_value_label: &str) -> String {
    match value {
        None | Some(AttributeValue::Null) => no_value_label.to_string(),
        Some(AttributeValue::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                no_value_label.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Some(other) => other.to_string(),
    }
}

/// Key identifying the bucket a value belongs to. Absent values share the null bucket, and values
/// of different kinds with the same text never share a bucket.
type BucketKey = (u8, String);

fn bucket_key(value: &AttributeValue) -> BucketKey {
    (value.kind_rank(), value.to_string())
}

fn group_value(feature: &Feature, field: &str) -> AttributeValue {
    feature
        .attribute(field)
        .cloned()
        .unwrap_or(AttributeValue::Null)
}

/// Bucket `features` by `spec.field`, count each bucket and return the buckets in display order.
/// The returned groups have no members yet, see [`fill_groups`].
pub fn build_groups(features: &[Feature], spec: &GroupSpec) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index_by_key: HashMap<BucketKey, usize> = HashMap::new();
    for feature in features {
        let value = group_value(feature, &spec.field);
        let key = bucket_key(&value);
        match index_by_key.get(&key) {
            Some(index) => groups[*index].count += 1,
            None => {
                index_by_key.insert(key, groups.len());
                groups.push(Group {
                    id: format!("group_{}_{}_{}", spec.id_prefix, spec.field, value),
                    label: display_label(Some(&value), &spec.no_value_label),
                    value,
                    count: 1,
                    features: Vec::new(),
                });
            }
        }
    }
    sort_groups(groups, spec)
}

fn compare_groups(a: &Group, b: &Group, spec: &GroupSpec) -> Ordering {
    let by_value = match spec.order {
        SortOrder::Asc => a.value.total_cmp(&b.value),
        SortOrder::Desc => b.value.total_cmp(&a.value),
    };
    match spec.sort_by {
        GroupSortKey::Value => by_value,
        GroupSortKey::Count => b.count.cmp(&a.count).then(by_value),
    }
}

/// Groups with a missing value always go last, whatever the configured order.
fn sort_groups(groups: Vec<Group>, spec: &GroupSpec) -> Vec<Group> {
    let (mut present, mut missing): (Vec<Group>, Vec<Group>) =
        groups.into_iter().partition(|group| !group.value.is_missing());
    present.sort_by(|a, b| compare_groups(a, b, spec));
    if spec.sort_by == GroupSortKey::Count {
        missing.sort_by(|a, b| b.count.cmp(&a.count));
    }
    present.append(&mut missing);
    present
}

/// Distribute already sorted `features` into `groups`, keeping their relative order.
pub fn fill_groups(mut groups: Vec<Group>, features: &[Feature], field: &str) -> Vec<Group> {
    let index_by_key: HashMap<BucketKey, usize> = groups
        .iter()
        .enumerate()
        .map(|(index, group)| (bucket_key(&group.value), index))
        .collect();
    for feature in features {
        let key = bucket_key(&group_value(feature, field));
        if let Some(index) = index_by_key.get(&key) {
            groups[*index].features.push(feature.clone());
        } else {
            log::warn!("No group found for value {:?} of field {}", key.1, field);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{build_groups, display_label};
    use crate::{
        geofile::feature::{AttributeValue, Feature, FeatureMap},
        ranking::{GroupSortKey, GroupSpec, SortOrder},
    };

    fn records(values: &[&str]) -> Vec<Feature> {
        values
            .iter()
            .map(|value| {
                Feature::new(FeatureMap::from([(
                    "ZONE".to_string(),
                    AttributeValue::from(*value),
                )]))
            })
            .collect()
    }

    fn spec(sort_by: GroupSortKey, order: SortOrder) -> GroupSpec {
        GroupSpec {
            field: "ZONE".to_string(),
            order,
            sort_by,
            id_prefix: "ds".to_string(),
            no_value_label: "(none)".to_string(),
        }
    }

    fn labels_and_counts(
        values: &[&str],
        sort_by: GroupSortKey,
        order: SortOrder,
    ) -> Vec<(String, usize)> {
        build_groups(&records(values), &spec(sort_by, order))
            .into_iter()
            .map(|group| (group.label, group.count))
            .collect()
    }

    #[rstest]
    #[case(None, "(none)")]
    #[case(Some(AttributeValue::Null), "(none)")]
    #[case(Some(AttributeValue::from("   ")), "(none)")]
    #[case(Some(AttributeValue::from("  Main St ")), "Main St")]
    #[case(Some(AttributeValue::from(12.0)), "12")]
    fn test_display_label(#[case] value: Option<AttributeValue>, #[case] expected: &str) {
        assert_eq!(expected, display_label(value.as_ref(), "(none)"));
    }

    #[test]
    fn test_count_sort_breaks_ties_by_value_in_configured_order() {
        let values = ["b", "a", "", "c", "c", "a", "b", ""];
        assert_eq!(
            vec![
                ("a".to_string(), 2),
                ("b".to_string(), 2),
                ("c".to_string(), 2),
                ("(none)".to_string(), 2)
            ],
            labels_and_counts(&values, GroupSortKey::Count, SortOrder::Asc)
        );
        assert_eq!(
            vec![
                ("c".to_string(), 2),
                ("b".to_string(), 2),
                ("a".to_string(), 2),
                ("(none)".to_string(), 2)
            ],
            labels_and_counts(&values, GroupSortKey::Count, SortOrder::Desc)
        );
    }

    #[test]
    fn test_count_sort_puts_larger_groups_first() {
        let values = ["x", "y", "y", "z", "y", "z"];
        assert_eq!(
            vec![
                ("y".to_string(), 3),
                ("z".to_string(), 2),
                ("x".to_string(), 1)
            ],
            labels_and_counts(&values, GroupSortKey::Count, SortOrder::Asc)
        );
    }

    #[rstest]
    #[case(SortOrder::Asc, vec!["a", "b", "(none)"])]
    #[case(SortOrder::Desc, vec!["b", "a", "(none)"])]
    fn test_value_sort_keeps_missing_last(#[case] order: SortOrder, #[case] expected: Vec<&str>) {
        let labels: Vec<String> = labels_and_counts(&["", "b", "a"], GroupSortKey::Value, order)
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(expected, labels);
    }
}
