//! Order-independent comparison of condition lists.
//!
//! [`canonical_hash`] is only a bucketing key. Equality is always decided by
//! structural one-to-one matching in [`sets_equal`]. The service may omit an
//! empty value on read, so a missing value and `""` match each other here.

use std::collections::HashMap;

use crate::point::{Comparison, Condition, Point, PointTag};

/// Render the canonical `{type}-{value}-{point}` key of a condition.
///
/// Zero-key tags render the point together with the matched text,
/// `query` keeps its declared name rather than the wire tag `get`, and numeric
/// keys render as integers.
#[must_use]
pub fn canonical_hash(condition: &Condition) -> String {
    let comparison = if condition.point().tag() == PointTag::Instance {
        Comparison::Equal
    } else {
        condition.comparison()
    };
    let value = condition.value().unwrap_or_default();

    let point = match condition.point() {
        Point::Bare(tag) if tag.carries_value() => format!("{tag}:{value}"),
        Point::Bare(tag) => tag.to_string(),
        Point::Named(tag, key) => format!("{tag}:{key}"),
        Point::Indexed(tag, index) => format!("{tag}:{index}"),
    };

    format!("{comparison}-{value}-{point}")
}

/// Multiset equality of two condition lists.
///
/// Every element of `left` must pair with a distinct, structurally equal
/// element of `right`. Lists of different length are never equal.
#[must_use]
pub fn sets_equal(left: &[Condition], right: &[Condition]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut matched = vec![false; right.len()];
    left.iter().all(|candidate| {
        let found = (0..right.len())
            .find(|&i| !matched[i] && same_condition(&right[i], candidate));
        match found {
            Some(i) => {
                matched[i] = true;
                true
            }
            None => false,
        }
    })
}

fn same_condition(left: &Condition, right: &Condition) -> bool {
    left.point() == right.point()
        && left.comparison() == right.comparison()
        && left.value().unwrap_or_default() == right.value().unwrap_or_default()
}

/// Drop structural duplicates, keeping the first occurrence of each.
#[must_use]
pub fn dedup<I>(conditions: I) -> Vec<Condition>
where
    I: IntoIterator<Item = Condition>,
{
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    let mut unique: Vec<Condition> = Vec::new();

    for condition in conditions {
        let bucket = buckets.entry(canonical_hash(&condition)).or_default();
        if bucket.iter().any(|&i| same_condition(&unique[i], &condition)) {
            continue;
        }
        bucket.push(unique.len());
        unique.push(condition);
    }

    unique
}

/// Unordered collection of conditions compared as a multiset.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a condition.
    pub fn insert(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    /// Number of conditions, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the conditions.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    /// Conditions as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Condition] {
        &self.0
    }

    /// The same set without structural duplicates.
    #[must_use]
    pub fn deduplicated(&self) -> Self {
        Self(dedup(self.0.iter().cloned()))
    }
}

impl PartialEq for ConditionSet {
    fn eq(&self, other: &Self) -> bool {
        sets_equal(&self.0, &other.0)
    }
}

impl Eq for ConditionSet {}

impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ConditionSet {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(tag: &str, key: Option<&str>, comparison: &str, value: Option<&str>) -> Condition {
        Condition::parse(tag, key, comparison, value).unwrap()
    }

    fn sample() -> Vec<Condition> {
        vec![
            cond("method", None, "equal", Some("POST")),
            cond("header", Some("host"), "iequal", Some("example.com")),
            cond("path", Some("0"), "equal", Some("login")),
            cond("query", Some("id"), "absent", None),
        ]
    }

    #[test]
    fn test_canonical_hash_rendering() {
        assert_eq!(
            canonical_hash(&cond("method", None, "equal", Some("GET"))),
            "equal-GET-method:GET"
        );
        assert_eq!(
            canonical_hash(&cond("path", Some("3.0"), "equal", Some("api"))),
            "equal-api-path:3"
        );
        assert_eq!(
            canonical_hash(&cond("header", Some("host"), "equal", Some("a"))),
            "equal-a-header:HOST"
        );
        assert_eq!(
            canonical_hash(&cond("query", Some("q"), "absent", None)),
            "absent--query:q"
        );
        assert_eq!(
            canonical_hash(&cond("instance", None, "equal", Some("9"))),
            "equal-9-instance:9"
        );
    }

    #[test]
    fn test_permutations_are_equal() {
        let original = sample();
        let mut reversed = original.clone();
        reversed.reverse();
        let mut rotated = original.clone();
        rotated.rotate_left(1);

        assert!(sets_equal(&original, &reversed));
        assert!(sets_equal(&original, &rotated));
        assert!(sets_equal(&[], &[]));
    }

    #[test]
    fn test_any_difference_breaks_equality() {
        let original = sample();

        let mut changed_value = original.clone();
        changed_value[0] = cond("method", None, "equal", Some("GET"));
        assert!(!sets_equal(&original, &changed_value));

        let mut changed_type = original.clone();
        changed_type[2] = cond("path", Some("0"), "regex", Some("login"));
        assert!(!sets_equal(&original, &changed_type));

        let mut changed_point = original.clone();
        changed_point[2] = cond("path", Some("1"), "equal", Some("login"));
        assert!(!sets_equal(&original, &changed_point));

        assert!(!sets_equal(&original, &original[..3]));
    }

    #[test]
    fn test_duplicates_must_pair_one_to_one() {
        let a = cond("uri", None, "equal", Some("/a"));
        let b = cond("uri", None, "equal", Some("/b"));

        assert!(sets_equal(
            &[a.clone(), a.clone(), b.clone()],
            &[a.clone(), b.clone(), a.clone()]
        ));
        assert!(!sets_equal(
            &[a.clone(), a.clone(), b.clone()],
            &[a.clone(), b.clone(), b]
        ));
    }

    #[test]
    fn test_missing_and_empty_value_match() {
        let sent = cond("action_ext", None, "equal", Some(""));
        let read = cond("action_ext", None, "equal", None);

        assert_eq!(canonical_hash(&sent), canonical_hash(&read));
        assert!(sets_equal(&[sent.clone()], &[read.clone()]));
        assert_eq!(dedup(vec![sent.clone(), read]), vec![sent]);
        assert!(!sets_equal(
            &[cond("action_ext", None, "equal", Some(""))],
            &[cond("action_ext", None, "equal", Some("php"))]
        ));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let a = cond("header", Some("host"), "equal", Some("x"));
        let b = cond("header", Some("HOST"), "equal", Some("x"));
        let c = cond("scheme", None, "equal", Some("https"));

        let unique = dedup(vec![a.clone(), c.clone(), b]);
        assert_eq!(unique, vec![a, c]);
    }

    #[test]
    fn test_condition_set_equality() {
        let left: ConditionSet = sample().into_iter().collect();
        let right = ConditionSet::from(sample().into_iter().rev().collect::<Vec<_>>());
        assert_eq!(left, right);
        assert_eq!(left.len(), 4);

        let mut doubled = left.clone();
        doubled.insert(sample()[0].clone());
        assert_ne!(left, doubled);
        assert_eq!(doubled.deduplicated(), left);
    }
}
