//! Composite metrics.
//!
//! A `CompositeMetric` is a named, ordered collection of child metrics, each
//! either a leaf `Metric` or another composite. Children are addressed by
//! name or by a path of names joined with `.` or `/`:
//!
//! ```
//! use daktylos_core::metrics::CompositeMetric;
//!
//! let mut build = CompositeMetric::new("Build").unwrap();
//! build.add_key_value("cpu", 42.5).unwrap();
//! let mut by_test = build.add_composite("by_test").unwrap();
//! by_test.add_key_value("test_store", 1.25).unwrap();
//!
//! assert!(build.get_path("by_test/test_store").is_ok());
//! assert!(build.field("Build.by_test.test_store").is_some());
//! ```

use std::collections::HashMap;
use std::ops::{Deref, Index};

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ConstructionError, Error, Result};
use crate::metrics::metric::{validate_name, BasicMetric, Metric, RESERVED_NAME_CHARS};
use crate::metrics::value::MetricValue;

/// Branch node of a metric tree.
#[derive(Debug, Clone)]
pub struct CompositeMetric {
    name: String,
    children: Vec<BasicMetric>,
    index: HashMap<String, usize>,
}

impl CompositeMetric {
    pub fn new(name: &str) -> std::result::Result<Self, ConstructionError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            children: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Build a composite from a set of children, rejecting duplicate names.
    pub fn with_children<I>(name: &str, children: I) -> std::result::Result<Self, ConstructionError>
    where
        I: IntoIterator<Item = BasicMetric>,
    {
        let mut composite = Self::new(name)?;
        for child in children {
            composite.add(child)?;
        }
        Ok(composite)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Attach a child, rejecting a name already used by a sibling.
    pub fn add(&mut self, child: impl Into<BasicMetric>) -> std::result::Result<(), ConstructionError> {
        self.attach(child.into()).map(|_| ())
    }

    fn attach(&mut self, child: BasicMetric) -> std::result::Result<&mut BasicMetric, ConstructionError> {
        if self.index.contains_key(child.name()) {
            return Err(ConstructionError::DuplicateName {
                parent: self.name.clone(),
                child: child.name().to_string(),
            });
        }
        let position = self.children.len();
        self.index.insert(child.name().to_string(), position);
        self.children.push(child);
        Ok(&mut self.children[position])
    }

    pub fn add_key_value(
        &mut self,
        name: &str,
        value: impl Into<MetricValue>,
    ) -> std::result::Result<(), ConstructionError> {
        let metric = Metric::new(name, value)?;
        self.add(metric)
    }

    /// Attach an empty child composite and return a handle for populating it.
    pub fn add_composite(&mut self, name: &str) -> std::result::Result<CompositeMut<'_>, ConstructionError> {
        let child = CompositeMetric::new(name)?;
        match self.attach(child.into())? {
            BasicMetric::Composite(c) => Ok(CompositeMut { inner: c }),
            // attach() stores exactly what it was given
            BasicMetric::Leaf(_) => unreachable!("composite child stored as leaf"),
        }
    }

    /// Detach a child by name.
    pub fn remove(&mut self, name: &str) -> Option<BasicMetric> {
        let position = self.index.remove(name)?;
        let removed = self.children.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<&BasicMetric> {
        self.index.get(name).map(|&i| &self.children[i])
    }

    /// Handle on a composite child; `None` for leaves and missing names.
    pub fn get_composite_mut(&mut self, name: &str) -> Option<CompositeMut<'_>> {
        self.composite_child_mut(name).map(|inner| CompositeMut { inner })
    }

    pub(crate) fn composite_child_mut(&mut self, name: &str) -> Option<&mut CompositeMetric> {
        match self.index.get(name) {
            Some(&i) => match &mut self.children[i] {
                BasicMetric::Composite(c) => Some(c),
                BasicMetric::Leaf(_) => None,
            },
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Child by name, failing when absent.
    pub fn element(&self, name: &str) -> Result<&BasicMetric> {
        self.get(name).ok_or_else(|| Error::KeyNotFound {
            metric: self.name.clone(),
            path: name.to_string(),
        })
    }

    /// Resolve a path relative to this composite (its own name excluded).
    ///
    /// Segments may be separated by `.` or `/`.
    pub fn get_path(&self, path: &str) -> Result<&BasicMetric> {
        let not_found = || Error::KeyNotFound {
            metric: self.name.clone(),
            path: path.to_string(),
        };

        let mut segments = path.split(RESERVED_NAME_CHARS);
        let first = segments.next().filter(|s| !s.is_empty()).ok_or_else(not_found)?;
        let mut current = self.get(first).ok_or_else(not_found)?;
        for part in segments {
            match current {
                BasicMetric::Composite(c) => {
                    current = c.get(part).ok_or_else(not_found)?;
                }
                BasicMetric::Leaf(_) => return Err(not_found()),
            }
        }
        Ok(current)
    }

    /// Resolve a full field path (root name first) to a leaf.
    pub fn field(&self, field_path: &str) -> Option<&Metric> {
        let rest = field_path
            .strip_prefix(self.name.as_str())?
            .strip_prefix(RESERVED_NAME_CHARS)?;
        self.get_path(rest).ok()?.as_leaf()
    }

    /// Children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &BasicMetric> {
        self.children.iter()
    }

    /// Relative paths of descendants, in depth-first insertion order.
    ///
    /// With `core_metrics_only` only leaves are listed; otherwise composite
    /// nodes are listed too, before their own children.
    pub fn keys(&self, core_metrics_only: bool) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_keys(core_metrics_only, "", &mut keys);
        keys
    }

    fn collect_keys(&self, core_metrics_only: bool, root: &str, out: &mut Vec<String>) {
        for child in &self.children {
            let path = if root.is_empty() {
                child.name().to_string()
            } else {
                format!("{}.{}", root, child.name())
            };
            match child {
                BasicMetric::Leaf(_) => out.push(path),
                BasicMetric::Composite(c) => {
                    if !core_metrics_only {
                        out.push(path.clone());
                    }
                    c.collect_keys(core_metrics_only, &path, out);
                }
            }
        }
    }

    /// Every leaf with its full field path (root name included), depth-first.
    pub fn leaves(&self) -> Vec<(String, &Metric)> {
        let mut out = Vec::new();
        self.collect_leaves(&self.name, &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Metric)>) {
        for child in &self.children {
            let path = format!("{}.{}", prefix, child.name());
            match child {
                BasicMetric::Leaf(m) => out.push((path, m)),
                BasicMetric::Composite(c) => c.collect_leaves(&path, out),
            }
        }
    }

    /// Build a tree from a JSON object: objects become composites, scalars leaves.
    ///
    /// Children are added in the object's key order.
    pub fn from_json(name: &str, value: &Value) -> std::result::Result<Self, ConstructionError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConstructionError::UnsupportedValue {
                name: name.to_string(),
                reason: "composite metrics are built from JSON objects".to_string(),
            })?;
        let mut composite = Self::new(name)?;
        for (key, child) in object {
            if child.is_object() {
                composite.add(Self::from_json(key, child)?)?;
            } else {
                let value = MetricValue::from_json(child).map_err(|reason| {
                    ConstructionError::UnsupportedValue {
                        name: key.clone(),
                        reason,
                    }
                })?;
                composite.add_key_value(key, value)?;
            }
        }
        Ok(composite)
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for child in &self.children {
            let value = match child {
                BasicMetric::Leaf(m) => m.value().to_json(),
                BasicMetric::Composite(c) => c.to_json(),
            };
            object.insert(child.name().to_string(), value);
        }
        Value::Object(object)
    }

    /// Derive a tree from any serializable record of scalars and nested records.
    pub fn from_serialize<T: Serialize>(name: &str, data: &T) -> Result<Self> {
        let value = serde_json::to_value(data)?;
        Ok(Self::from_json(name, &value)?)
    }

    /// Convert back into a typed record.
    pub fn to_deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

/// Mutable handle on a composite nested inside another.
///
/// Children can be added and removed through the handle, but the composite
/// itself cannot be replaced, so its name stays the one its parent indexes
/// it by:
///
/// ```compile_fail
/// use daktylos_core::metrics::CompositeMetric;
///
/// let mut build = CompositeMetric::new("Build").unwrap();
/// let mut tests = build.add_composite("tests").unwrap();
/// *tests = CompositeMetric::new("cpu").unwrap();
/// ```
#[derive(Debug)]
pub struct CompositeMut<'a> {
    inner: &'a mut CompositeMetric,
}

impl<'a> CompositeMut<'a> {
    pub fn add(&mut self, child: impl Into<BasicMetric>) -> std::result::Result<(), ConstructionError> {
        self.inner.add(child)
    }

    pub fn add_key_value(
        &mut self,
        name: &str,
        value: impl Into<MetricValue>,
    ) -> std::result::Result<(), ConstructionError> {
        self.inner.add_key_value(name, value)
    }

    pub fn add_composite(&mut self, name: &str) -> std::result::Result<CompositeMut<'_>, ConstructionError> {
        self.inner.add_composite(name)
    }

    pub fn get_composite_mut(&mut self, name: &str) -> Option<CompositeMut<'_>> {
        self.inner.get_composite_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<BasicMetric> {
        self.inner.remove(name)
    }
}

impl Deref for CompositeMut<'_> {
    type Target = CompositeMetric;

    fn deref(&self) -> &CompositeMetric {
        &*self.inner
    }
}

impl PartialEq for CompositeMetric {
    /// Same name and same children by name, regardless of insertion order.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .all(|child| other.get(child.name()) == Some(child))
    }
}

impl Index<&str> for CompositeMetric {
    type Output = BasicMetric;

    /// Panics when there is no child of that name; see `element` for the
    /// fallible form.
    fn index(&self, name: &str) -> &BasicMetric {
        match self.get(name) {
            Some(child) => child,
            None => panic!("no child '{}' in composite metric '{}'", name, self.name),
        }
    }
}

impl Serialize for CompositeMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len()))?;
        for child in &self.children {
            map.serialize_entry(child.name(), child)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn sample() -> CompositeMetric {
        let mut top = CompositeMetric::new("TestMetric").unwrap();
        top.add_key_value("child1", 1).unwrap();
        let mut child2 = top.add_composite("child2").unwrap();
        child2.add_key_value("grandchild2_1", 28832.12993).unwrap();
        child2.add_key_value("grandchild2_2", 0.00081238).unwrap();
        let mut child3 = top.add_composite("child3").unwrap();
        child3.add_key_value("grandchild3_1", 291).unwrap();
        top
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let mut top = CompositeMetric::new("Build").unwrap();
        top.add_key_value("cpu", 1.0).unwrap();
        let err = top.add_key_value("cpu", 2.0).unwrap_err();
        assert_eq!(
            err,
            ConstructionError::DuplicateName {
                parent: "Build".to_string(),
                child: "cpu".to_string()
            }
        );
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(CompositeMetric::new("").unwrap_err(), ConstructionError::EmptyName);
    }

    #[test]
    fn test_lookup() {
        let top = sample();
        assert!(top.get("child1").is_some());
        assert!(top.get("missing").is_none());
        assert!(matches!(top.element("missing"), Err(Error::KeyNotFound { .. })));

        let leaf = top.get_path("child2.grandchild2_1").unwrap();
        assert_eq!(leaf.value(), Some(&MetricValue::Float(28832.12993)));
        let same = top.get_path("child2/grandchild2_1").unwrap();
        assert_eq!(leaf, same);

        assert!(top.get_path("child1.deeper").is_err());
        assert!(top.get_path("").is_err());
        assert!(top.get_path("child2..grandchild2_1").is_err());
    }

    #[test]
    fn test_index_by_name() {
        let mut build = CompositeMetric::new("Build").unwrap();
        build.add_key_value("cpu", 42.5).unwrap();
        assert_eq!(build["cpu"].value(), Some(&MetricValue::Float(42.5)));
    }

    #[test]
    #[should_panic(expected = "no child 'gpu'")]
    fn test_index_missing_panics() {
        let build = CompositeMetric::new("Build").unwrap();
        let _ = &build["gpu"];
    }

    #[test]
    fn test_field_requires_root() {
        let top = sample();
        assert!(top.field("TestMetric.child3.grandchild3_1").is_some());
        assert!(top.field("child3.grandchild3_1").is_none());
        assert!(top.field("TestMetric.child3").is_none()); // composite, not a leaf
        assert!(top.field("TestMetricX.child1").is_none());
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = CompositeMetric::with_children(
            "Build",
            vec![
                Metric::new("cpu", 42.5).unwrap().into(),
                Metric::new("mem", 1024).unwrap().into(),
            ],
        )
        .unwrap();
        let b = CompositeMetric::with_children(
            "Build",
            vec![
                Metric::new("mem", 1024).unwrap().into(),
                Metric::new("cpu", 42.5).unwrap().into(),
            ],
        )
        .unwrap();
        assert_eq!(a, b);

        let c = CompositeMetric::with_children(
            "Build",
            vec![Metric::new("cpu", 42.5).unwrap().into()],
        )
        .unwrap();
        assert_ne!(a, c);
        assert_ne!(c, a);
    }

    #[test]
    fn test_int_and_float_not_equal() {
        let mut a = CompositeMetric::new("m").unwrap();
        a.add_key_value("v", 1).unwrap();
        let mut b = CompositeMetric::new("m").unwrap();
        b.add_key_value("v", 1.0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_keys_and_leaves() {
        let top = sample();
        assert_eq!(
            top.keys(true),
            vec![
                "child1",
                "child2.grandchild2_1",
                "child2.grandchild2_2",
                "child3.grandchild3_1"
            ]
        );
        assert_eq!(top.keys(false).len(), 6);

        let leaves: Vec<String> = top.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(leaves[0], "TestMetric.child1");
        assert_eq!(leaves[3], "TestMetric.child3.grandchild3_1");
    }

    #[test]
    fn test_remove_keeps_index_consistent() {
        let mut top = sample();
        assert!(top.remove("child1").is_some());
        assert!(top.remove("child1").is_none());
        assert_eq!(top.children().next().unwrap().name(), "child2");
        assert!(top.get_path("child3.grandchild3_1").is_ok());
    }

    #[test]
    fn test_json_conversion() {
        let value = json!({"cpu": 42.5, "mem": 1024, "by_test": {"t1": true}, "empty": {}});
        let tree = CompositeMetric::from_json("Build", &value).unwrap();
        assert_eq!(tree.get_path("by_test.t1").unwrap().value(), Some(&MetricValue::Boolean(true)));
        assert!(tree.get("empty").unwrap().as_composite().unwrap().is_empty());
        assert_eq!(tree.to_json(), value);

        assert!(CompositeMetric::from_json("Build", &json!({"list": [1]})).is_err());
        assert!(CompositeMetric::from_json("Build", &json!(3)).is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestPerformance {
        user_cpu: f64,
        system_cpu: f64,
        by_test: HashMap<String, SingleTest>,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SingleTest {
        duration: f64,
        passed: bool,
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut by_test = HashMap::new();
        by_test.insert(
            "test1".to_string(),
            SingleTest {
                duration: 3.8,
                passed: true,
            },
        );
        let data = TestPerformance {
            user_cpu: 11.2,
            system_cpu: 0.1,
            by_test,
        };

        let tree = CompositeMetric::from_serialize("TestRun", &data).unwrap();
        assert_eq!(tree.name(), "TestRun");
        assert!(tree.field("TestRun.by_test.test1.duration").is_some());

        let back: TestPerformance = tree.to_deserialize().unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_nested_handles_keep_names_stable() {
        let mut build = CompositeMetric::new("Build").unwrap();
        build.add_key_value("cpu", 42.5).unwrap();
        let mut tests = build.add_composite("tests").unwrap();
        tests.add_key_value("passed", true).unwrap();
        let mut flaky = tests.add_composite("flaky").unwrap();
        flaky.add_key_value("retries", 2).unwrap();
        assert_eq!(flaky.name(), "flaky");

        assert!(build.get_composite_mut("cpu").is_none());
        assert!(build.get_composite_mut("missing").is_none());
        let mut tests = build.get_composite_mut("tests").unwrap();
        assert!(tests.remove("passed").is_some());
        tests.add_key_value("failed", 0).unwrap();
        assert!(tests.add_key_value("flaky", 1).is_err());

        let names: Vec<&str> = build.children().map(BasicMetric::name).collect();
        assert_eq!(names, vec!["cpu", "tests"]);
        assert_eq!(build.get("tests").map(BasicMetric::name), Some("tests"));
        assert_eq!(build.clone(), build);
        assert_eq!(
            build.leaves().into_iter().map(|(p, _)| p).collect::<Vec<_>>(),
            vec!["Build.cpu", "Build.tests.flaky.retries", "Build.tests.failed"]
        );
    }

    #[derive(Serialize)]
    struct Ordered {
        zeta: i64,
        alpha: f64,
        middle: bool,
    }

    #[test]
    fn test_from_serialize_keeps_declaration_order() {
        let data = Ordered {
            zeta: 1,
            alpha: 2.0,
            middle: true,
        };
        let tree = CompositeMetric::from_serialize("Ordered", &data).unwrap();
        assert_eq!(tree.keys(true), vec!["zeta", "alpha", "middle"]);
    }

    #[test]
    fn test_serialize_preserves_insertion_order() {
        let mut tree = CompositeMetric::new("Build").unwrap();
        tree.add_key_value("zeta", 1).unwrap();
        tree.add_key_value("alpha", 2).unwrap();
        assert_eq!(serde_json::to_string(&tree).unwrap(), r#"{"zeta":1,"alpha":2}"#);
    }
}
