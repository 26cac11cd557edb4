//! Tree <-> row mapping.
//!
//! A composite tree is stored as one row per leaf, keyed by the dotted path
//! from the root (root name included). Composites contribute no rows of
//! their own except when empty: an empty composite is written as a single
//! `branch` marker row so that its existence survives the round trip.
//!
//! `reconstruct(flatten(tree)) == tree` holds for every tree.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::metrics::{
    validate_name, BasicMetric, CompositeMetric, Metric, MetricValue, PATH_SEPARATOR,
};

/// Type tag of an empty-composite marker row.
pub const BRANCH_TAG: &str = "branch";

/// Value carried by one field row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(MetricValue),
    EmptyBranch,
}

impl FieldValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            FieldValue::Scalar(v) => v.value_type().as_str(),
            FieldValue::EmptyBranch => BRANCH_TAG,
        }
    }
}

/// One flattened field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub field_path: String,
    pub value: FieldValue,
}

impl FieldRow {
    pub fn scalar(field_path: &str, value: MetricValue) -> Self {
        Self {
            field_path: field_path.to_string(),
            value: FieldValue::Scalar(value),
        }
    }

    pub fn empty_branch(field_path: &str) -> Self {
        Self {
            field_path: field_path.to_string(),
            value: FieldValue::EmptyBranch,
        }
    }
}

/// Flatten a tree into field rows, depth-first in insertion order.
pub fn flatten(tree: &CompositeMetric) -> Vec<FieldRow> {
    let mut rows = Vec::new();
    flatten_into(tree, tree.name(), &mut rows);
    rows
}

fn flatten_into(node: &CompositeMetric, path: &str, rows: &mut Vec<FieldRow>) {
    if node.is_empty() {
        rows.push(FieldRow::empty_branch(path));
        return;
    }
    for child in node.children() {
        let child_path = format!("{}{}{}", path, PATH_SEPARATOR, child.name());
        match child {
            BasicMetric::Leaf(m) => rows.push(FieldRow::scalar(&child_path, m.value().clone())),
            BasicMetric::Composite(c) => flatten_into(c, &child_path, rows),
        }
    }
}

/// Rebuild a tree from field rows.
///
/// Rows are applied in order, so children come back in the order their rows
/// were written.
pub fn reconstruct(rows: &[FieldRow]) -> Result<CompositeMetric> {
    let first = rows
        .first()
        .ok_or_else(|| Error::malformed("", "record has no field rows"))?;
    let root_name = first.field_path.split(PATH_SEPARATOR).next().unwrap_or("");
    let mut tree = CompositeMetric::new(root_name)
        .map_err(|e| Error::malformed(&first.field_path, e.to_string()))?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut markers: Vec<&str> = Vec::new();

    for row in rows {
        let path = row.field_path.as_str();
        if !seen.insert(path) {
            return Err(Error::malformed(path, "duplicate field path"));
        }

        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        for segment in &segments {
            validate_name(segment)
                .map_err(|e| Error::malformed(path, format!("invalid path segment: {}", e)))?;
        }
        if segments[0] != tree.name() {
            return Err(Error::malformed(
                path,
                format!("more than one root: '{}' and '{}'", tree.name(), segments[0]),
            ));
        }

        if let FieldValue::EmptyBranch = row.value {
            markers.push(path);
        }
        insert_row(&mut tree, path, &segments[1..], &row.value)?;
    }

    // A marker only stands for an empty composite; rows below it contradict it.
    for marker in markers {
        let still_empty = match marker.split_once(PATH_SEPARATOR) {
            None => tree.is_empty(),
            Some((_, rest)) => tree
                .get_path(rest)
                .ok()
                .and_then(BasicMetric::as_composite)
                .map_or(false, CompositeMetric::is_empty),
        };
        if !still_empty {
            return Err(Error::malformed(
                marker,
                "path marked as empty composite also has children",
            ));
        }
    }

    Ok(tree)
}

fn insert_row(
    root: &mut CompositeMetric,
    path: &str,
    relative: &[&str],
    value: &FieldValue,
) -> Result<()> {
    let (last, parents) = match relative.split_last() {
        Some(split) => split,
        None => {
            return match value {
                FieldValue::EmptyBranch => Ok(()),
                FieldValue::Scalar(_) => Err(Error::malformed(path, "leaf value at root path")),
            }
        }
    };

    let mut node = root;
    for segment in parents {
        if !node.contains(segment) {
            node.add_composite(segment)
                .map_err(|e| Error::malformed(path, e.to_string()))?;
        }
        node = match node.composite_child_mut(segment) {
            Some(c) => c,
            None => {
                return Err(Error::malformed(
                    path,
                    "path is both a leaf and a prefix of another field",
                ))
            }
        };
    }

    if node.contains(last) {
        return Err(Error::malformed(
            path,
            "path is both a leaf and a prefix of another field",
        ));
    }
    let added = match value {
        FieldValue::Scalar(v) => Metric::new(last, v.clone()).and_then(|m| node.add(m)),
        FieldValue::EmptyBranch => node.add_composite(last).map(|_| ()),
    };
    added.map_err(|e| Error::malformed(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn build_sample() -> CompositeMetric {
        let mut build = CompositeMetric::new("Build").unwrap();
        build.add_key_value("cpu", 42.5).unwrap();
        build.add_key_value("mem", 1024).unwrap();
        let mut tests = build.add_composite("tests").unwrap();
        tests.add_key_value("passed", true).unwrap();
        tests.add_key_value("runner", "nextest").unwrap();
        tests.add_composite("skipped").unwrap();
        build
    }

    #[test]
    fn test_flatten_paths_and_tags() {
        let rows = flatten(&build_sample());
        let summary: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.field_path.as_str(), r.value.type_tag()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Build.cpu", "float"),
                ("Build.mem", "int"),
                ("Build.tests.passed", "bool"),
                ("Build.tests.runner", "str"),
                ("Build.tests.skipped", "branch"),
            ]
        );
    }

    #[test]
    fn test_round_trip_sample() {
        let tree = build_sample();
        let rebuilt = reconstruct(&flatten(&tree)).unwrap();
        assert_eq!(rebuilt, tree);
        let names: Vec<&str> = rebuilt.children().map(|c| c.name()).collect();
        assert_eq!(names, vec!["cpu", "mem", "tests"]);
    }

    #[test]
    fn test_round_trip_empty_root() {
        let tree = CompositeMetric::new("Empty").unwrap();
        let rows = flatten(&tree);
        assert_eq!(rows, vec![FieldRow::empty_branch("Empty")]);
        assert_eq!(reconstruct(&rows).unwrap(), tree);
    }

    #[test]
    fn test_reconstruct_rejects_leaf_prefix_conflict() {
        let rows = vec![
            FieldRow::scalar("Build.cpu", MetricValue::Float(1.0)),
            FieldRow::scalar("Build.cpu.user", MetricValue::Float(2.0)),
        ];
        assert!(matches!(reconstruct(&rows), Err(Error::MalformedRecord { .. })));

        let rows = vec![
            FieldRow::scalar("Build.cpu.user", MetricValue::Float(2.0)),
            FieldRow::scalar("Build.cpu", MetricValue::Float(1.0)),
        ];
        assert!(matches!(reconstruct(&rows), Err(Error::MalformedRecord { .. })));
    }

    #[test]
    fn test_reconstruct_rejects_bad_rows() {
        let two_roots = vec![
            FieldRow::scalar("A.x", MetricValue::Integer(1)),
            FieldRow::scalar("B.x", MetricValue::Integer(1)),
        ];
        assert!(reconstruct(&two_roots).is_err());

        let duplicate = vec![
            FieldRow::scalar("A.x", MetricValue::Integer(1)),
            FieldRow::scalar("A.x", MetricValue::Integer(2)),
        ];
        assert!(reconstruct(&duplicate).is_err());

        let leaf_root = vec![FieldRow::scalar("A", MetricValue::Integer(1))];
        assert!(reconstruct(&leaf_root).is_err());

        let empty_segment = vec![FieldRow::scalar("A..x", MetricValue::Integer(1))];
        assert!(reconstruct(&empty_segment).is_err());

        assert!(reconstruct(&[]).is_err());
    }

    #[test]
    fn test_reconstruct_rejects_marker_with_children() {
        let rows = vec![
            FieldRow::empty_branch("A.sub"),
            FieldRow::scalar("A.sub.x", MetricValue::Integer(1)),
        ];
        let err = reconstruct(&rows).unwrap_err();
        match err {
            Error::MalformedRecord { field_path, .. } => assert_eq!(field_path, "A.sub"),
            other => panic!("unexpected error {:?}", other),
        }

        let rows = vec![
            FieldRow::empty_branch("A"),
            FieldRow::scalar("A.x", MetricValue::Integer(1)),
        ];
        assert!(reconstruct(&rows).is_err());
    }

    #[derive(Debug, Clone)]
    enum Shape {
        Leaf(MetricValue),
        Branch(Vec<(String, Shape)>),
    }

    fn value_strategy() -> impl Strategy<Value = MetricValue> {
        prop_oneof![
            any::<i64>().prop_map(MetricValue::Integer),
            (-1.0e12f64..1.0e12).prop_map(MetricValue::Float),
            any::<bool>().prop_map(MetricValue::Boolean),
            "[a-zA-Z0-9 _-]{0,32}".prop_map(MetricValue::Text),
        ]
    }

    fn children_strategy() -> impl Strategy<Value = Vec<(String, Shape)>> {
        let leaf = value_strategy().prop_map(Shape::Leaf);
        let shape = leaf.prop_recursive(4, 64, 6, |inner| {
            prop::collection::btree_map("[a-z][a-z0-9_]{0,6}", inner, 0..6)
                .prop_map(|m| Shape::Branch(m.into_iter().collect()))
        });
        prop::collection::btree_map("[a-z][a-z0-9_]{0,6}", shape, 0..6)
            .prop_map(|m| m.into_iter().collect())
    }

    fn build(name: &str, children: &[(String, Shape)]) -> CompositeMetric {
        let mut node = CompositeMetric::new(name).unwrap();
        for (child_name, shape) in children {
            match shape {
                Shape::Leaf(v) => {
                    node.add_key_value(child_name, v.clone()).unwrap();
                }
                Shape::Branch(grandchildren) => {
                    node.add(build(child_name, grandchildren)).unwrap();
                }
            }
        }
        node
    }

    proptest! {
        #[test]
        fn test_flatten_reconstruct_round_trip(children in children_strategy()) {
            let tree = build("Root", &children);
            let rows = flatten(&tree);
            prop_assert_eq!(reconstruct(&rows).unwrap(), tree);
        }

        #[test]
        fn test_flatten_paths_are_unique(children in children_strategy()) {
            let tree = build("Root", &children);
            let rows = flatten(&tree);
            let unique: HashSet<&str> = rows.iter().map(|r| r.field_path.as_str()).collect();
            prop_assert_eq!(unique.len(), rows.len());
        }
    }
}
