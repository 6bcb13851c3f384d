//! Vertex/edge metadata store.
//!
//! Components, assets and buckets are vertices carrying scalar properties
//! and [`NestedAttributes`]. Assets point at their component through a
//! [`EDGE_PART_OF`] edge. Every scalar property and attribute leaf is
//! indexed so facets can do point lookups by format key.
//!
//! Two backends implement [`MetadataStore`]: [`SqliteMetadataStore`] for
//! durable storage and [`MemoryMetadataStore`] for tests and ephemeral
//! deployments. Both serialize transactions.

mod error;
mod memory;
mod sqlite;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::attributes::{index_value, NestedAttributes};

pub use error::GraphError;
pub use memory::MemoryMetadataStore;
pub use sqlite::SqliteMetadataStore;

/// Edge label linking an asset (out) to its component (in).
pub const EDGE_PART_OF: &str = "part_of";

/// Property holding a bucket's repository name.
pub const P_REPOSITORY_NAME: &str = "repository_name";

/// Prefix under which attribute leaves are indexed.
pub const P_ATTRIBUTES: &str = "attributes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(Uuid);

impl VertexId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for VertexId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| GraphError::InvalidRecord(format!("bad vertex id '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexClass {
    Bucket,
    Component,
    Asset,
}

impl VertexClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VertexClass::Bucket => "bucket",
            VertexClass::Component => "component",
            VertexClass::Asset => "asset",
        }
    }
}

impl FromStr for VertexClass {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bucket" => Ok(VertexClass::Bucket),
            "component" => Ok(VertexClass::Component),
            "asset" => Ok(VertexClass::Asset),
            other => Err(GraphError::InvalidRecord(format!(
                "unknown vertex class '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for VertexClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vertex as loaded from (or about to be saved to) the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    id: VertexId,
    class: VertexClass,
    bucket: VertexId,
    properties: BTreeMap<String, Value>,
    attributes: NestedAttributes,
    created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Vertex {
    pub(crate) fn new(id: VertexId, class: VertexClass, bucket: VertexId) -> Self {
        let now = Utc::now();
        Self {
            id,
            class,
            bucket,
            properties: BTreeMap::new(),
            attributes: NestedAttributes::default(),
            created: now,
            last_updated: now,
        }
    }

    pub(crate) fn from_parts(
        id: VertexId,
        class: VertexClass,
        bucket: VertexId,
        properties: BTreeMap<String, Value>,
        attributes: NestedAttributes,
        created: DateTime<Utc>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            class,
            bucket,
            properties,
            attributes,
            created,
            last_updated,
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn class(&self) -> VertexClass {
        self.class
    }

    pub fn bucket(&self) -> VertexId {
        self.bucket
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn set_property(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if value.is_null() {
            self.properties.remove(key);
        } else {
            self.properties.insert(key.to_string(), value);
        }
    }

    pub fn attributes(&self) -> &NestedAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut NestedAttributes {
        &mut self.attributes
    }

    /// All `(key, value)` pairs this vertex is findable by.
    pub fn index_entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .properties
            .iter()
            .filter_map(|(k, v)| index_value(v).map(|v| (k.clone(), v)))
            .collect();
        entries.extend(self.attributes.flatten(P_ATTRIBUTES));
        entries
    }
}

/// `(class, key)` pairs whose values must be unique within a bucket.
#[derive(Debug, Clone, Default)]
pub(crate) struct UniqueIndexes(Arc<RwLock<HashSet<(VertexClass, String)>>>);

impl UniqueIndexes {
    pub fn insert(&self, class: VertexClass, key: &str) {
        self.0.write().insert((class, key.to_string()));
    }

    /// Index entries of `vertex` that fall under a unique index.
    pub fn unique_entries(&self, vertex: &Vertex) -> Vec<(String, String)> {
        let unique = self.0.read();
        if unique.is_empty() {
            return Vec::new();
        }
        vertex
            .index_entries()
            .into_iter()
            .filter(|(key, _)| unique.contains(&(vertex.class(), key.clone())))
            .collect()
    }
}

/// A transactional vertex/edge store.
#[async_trait]
pub trait MetadataStore: Send + Sync + fmt::Debug + 'static {
    /// Open a transaction. Only one transaction is active at a time; callers
    /// wait here until the previous one commits or is dropped.
    async fn begin(&self) -> Result<Box<dyn MetadataTx>, GraphError>;

    /// Declare `key` unique among vertices of `class` within one bucket.
    fn ensure_unique_index(&self, class: VertexClass, key: &str);
}

/// One unit of work against a [`MetadataStore`].
///
/// Dropping a transaction without calling [`MetadataTx::commit`] discards
/// every change made through it.
#[async_trait]
pub trait MetadataTx: Send {
    /// Find the bucket vertex for a repository, creating it if needed.
    async fn bucket(&mut self, repository: &str) -> Result<Vertex, GraphError>;

    /// Allocate a new, empty vertex inside `bucket`.
    async fn create_vertex(
        &mut self,
        class: VertexClass,
        bucket: VertexId,
    ) -> Result<Vertex, GraphError>;

    async fn vertex(&mut self, id: VertexId) -> Result<Option<Vertex>, GraphError>;

    /// Persist properties and attributes, refreshing the property index.
    async fn save_vertex(&mut self, vertex: &mut Vertex) -> Result<(), GraphError>;

    /// Delete a vertex and its edges. Deleting a missing vertex returns `false`.
    async fn delete_vertex(&mut self, id: VertexId) -> Result<bool, GraphError>;

    /// Indexed point lookup. With duplicates the oldest vertex wins.
    async fn find_with_property(
        &mut self,
        class: VertexClass,
        key: &str,
        value: &str,
        bucket: VertexId,
    ) -> Result<Option<Vertex>, GraphError>;

    async fn add_edge(&mut self, from: VertexId, label: &str, to: VertexId)
        -> Result<(), GraphError>;

    /// Vertices with a `label` edge pointing at `to`, in edge insertion order.
    async fn in_vertices(&mut self, to: VertexId, label: &str) -> Result<Vec<Vertex>, GraphError>;

    /// Vertices `from` points at with a `label` edge, in edge insertion order.
    async fn out_vertices(&mut self, from: VertexId, label: &str)
        -> Result<Vec<Vertex>, GraphError>;

    async fn commit(self: Box<Self>) -> Result<(), GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Behaviour both backends must share.
    pub(crate) async fn exercise_store(store: &dyn MetadataStore) {
        store.ensure_unique_index(VertexClass::Component, "attributes.test.key");

        let mut tx = store.begin().await.unwrap();
        let bucket = tx.bucket("repo").await.unwrap();
        assert_eq!(bucket.property_str(P_REPOSITORY_NAME), Some("repo"));

        let mut component = tx
            .create_vertex(VertexClass::Component, bucket.id())
            .await
            .unwrap();
        component.set_property("name", "bar");
        component
            .attributes_mut()
            .child_mut("test")
            .unwrap()
            .set("key", "foo:bar:1")
            .unwrap();
        tx.save_vertex(&mut component).await.unwrap();

        let mut first = tx.create_vertex(VertexClass::Asset, bucket.id()).await.unwrap();
        first.set_property("name", "a.jar");
        tx.save_vertex(&mut first).await.unwrap();
        let mut second = tx.create_vertex(VertexClass::Asset, bucket.id()).await.unwrap();
        second.set_property("name", "a.pom");
        tx.save_vertex(&mut second).await.unwrap();
        tx.add_edge(first.id(), EDGE_PART_OF, component.id()).await.unwrap();
        tx.add_edge(second.id(), EDGE_PART_OF, component.id()).await.unwrap();
        tx.commit().await.unwrap();

        // Committed state is visible to the next transaction
        let mut tx = store.begin().await.unwrap();
        let bucket_again = tx.bucket("repo").await.unwrap();
        assert_eq!(bucket_again.id(), bucket.id());

        let found = tx
            .find_with_property(
                VertexClass::Component,
                "attributes.test.key",
                "foo:bar:1",
                bucket.id(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), component.id());
        assert_eq!(found.property_str("name"), Some("bar"));

        // Class and bucket scope the lookup
        assert!(tx
            .find_with_property(VertexClass::Asset, "attributes.test.key", "foo:bar:1", bucket.id())
            .await
            .unwrap()
            .is_none());
        let other = tx.bucket("other").await.unwrap();
        assert!(tx
            .find_with_property(
                VertexClass::Component,
                "attributes.test.key",
                "foo:bar:1",
                other.id()
            )
            .await
            .unwrap()
            .is_none());

        let assets = tx.in_vertices(component.id(), EDGE_PART_OF).await.unwrap();
        let names: Vec<_> = assets.iter().filter_map(|a| a.property_str("name")).collect();
        assert_eq!(names, vec!["a.jar", "a.pom"]);
        let owners = tx.out_vertices(first.id(), EDGE_PART_OF).await.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].id(), component.id());

        // Unique keys are enforced on save
        let mut duplicate = tx
            .create_vertex(VertexClass::Component, bucket.id())
            .await
            .unwrap();
        duplicate
            .attributes_mut()
            .child_mut("test")
            .unwrap()
            .set("key", "foo:bar:1")
            .unwrap();
        assert!(matches!(
            tx.save_vertex(&mut duplicate).await,
            Err(GraphError::DuplicateKey { .. })
        ));
        drop(tx);

        // Deletes are idempotent and cascade to edges
        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_vertex(first.id()).await.unwrap());
        assert!(!tx.delete_vertex(first.id()).await.unwrap());
        let assets = tx.in_vertices(component.id(), EDGE_PART_OF).await.unwrap();
        assert_eq!(assets.len(), 1);
        // Dropped without commit
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.vertex(first.id()).await.unwrap().is_some());
        assert_eq!(
            tx.in_vertices(component.id(), EDGE_PART_OF).await.unwrap().len(),
            2
        );
        // The rolled back duplicate never made it in
        assert!(tx.vertex(duplicate.id()).await.unwrap().is_none());
    }

    #[test]
    fn test_index_entries() {
        let bucket = VertexId::generate();
        let mut vertex = Vertex::new(VertexId::generate(), VertexClass::Asset, bucket);
        vertex.set_property("name", "foo.txt");
        vertex.set_property("size", 12);
        vertex
            .attributes_mut()
            .child_mut("raw")
            .unwrap()
            .set("key", "/foo.txt")
            .unwrap();

        let entries = vertex.index_entries();
        assert!(entries.contains(&("name".to_string(), "foo.txt".to_string())));
        assert!(entries.contains(&("size".to_string(), "12".to_string())));
        assert!(entries.contains(&("attributes.raw.key".to_string(), "/foo.txt".to_string())));

        vertex.set_property("name", Value::Null);
        assert!(vertex.property("name").is_none());
    }

    #[test]
    fn test_class_and_id_parse() {
        assert_eq!("asset".parse::<VertexClass>().unwrap(), VertexClass::Asset);
        assert!("edge".parse::<VertexClass>().is_err());
        let id = VertexId::generate();
        assert_eq!(id.to_string().parse::<VertexId>().unwrap(), id);
        assert!("nope".parse::<VertexId>().is_err());
    }
}
