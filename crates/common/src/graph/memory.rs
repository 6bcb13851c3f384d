use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    GraphError, MetadataStore, MetadataTx, UniqueIndexes, Vertex, VertexClass, VertexId,
    P_REPOSITORY_NAME,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IndexKey {
    bucket: VertexId,
    class: VertexClass,
    key: String,
    value: String,
}

impl IndexKey {
    fn new(bucket: VertexId, class: VertexClass, key: &str, value: &str) -> Self {
        Self {
            bucket,
            class,
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    from: VertexId,
    label: String,
    to: VertexId,
}

#[derive(Debug, Clone, Default)]
struct Graph {
    vertices: HashMap<VertexId, Vertex>,
    /// Property index: (bucket, class, key, value) -> vertex ids
    index: HashMap<IndexKey, Vec<VertexId>>,
    /// Edges in insertion order
    edges: Vec<Edge>,
}

impl Graph {
    fn unindex(&mut self, vertex: &Vertex) {
        for (key, value) in vertex.index_entries() {
            let index_key = IndexKey::new(vertex.bucket(), vertex.class(), &key, &value);
            if let Some(ids) = self.index.get_mut(&index_key) {
                ids.retain(|id| *id != vertex.id());
                if ids.is_empty() {
                    self.index.remove(&index_key);
                }
            }
        }
    }

    fn reindex(&mut self, vertex: &Vertex) {
        for (key, value) in vertex.index_entries() {
            self.index
                .entry(IndexKey::new(vertex.bucket(), vertex.class(), &key, &value))
                .or_default()
                .push(vertex.id());
        }
    }

    fn lookup(&self, key: &IndexKey) -> impl Iterator<Item = &Vertex> {
        self.index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.vertices.get(id))
    }
}

/// In-memory metadata store.
///
/// A transaction holds the store lock for its whole lifetime and works on a
/// copy-on-write snapshot of the graph which replaces the committed graph on
/// commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataStore {
    graph: Arc<Mutex<Arc<Graph>>>,
    unique: UniqueIndexes,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn begin(&self) -> Result<Box<dyn MetadataTx>, GraphError> {
        let committed = self.graph.clone().lock_owned().await;
        let working = Arc::clone(&committed);
        Ok(Box::new(MemoryTx {
            committed,
            working,
            unique: self.unique.clone(),
        }))
    }

    fn ensure_unique_index(&self, class: VertexClass, key: &str) {
        self.unique.insert(class, key);
    }
}

struct MemoryTx {
    committed: OwnedMutexGuard<Arc<Graph>>,
    working: Arc<Graph>,
    unique: UniqueIndexes,
}

impl MemoryTx {
    fn graph_mut(&mut self) -> &mut Graph {
        Arc::make_mut(&mut self.working)
    }

    fn require(&self, id: VertexId) -> Result<(), GraphError> {
        if self.working.vertices.contains_key(&id) {
            Ok(())
        } else {
            Err(GraphError::VertexNotFound(id))
        }
    }
}

#[async_trait]
impl MetadataTx for MemoryTx {
    async fn bucket(&mut self, repository: &str) -> Result<Vertex, GraphError> {
        let existing = self
            .working
            .vertices
            .values()
            .find(|v| {
                v.class() == VertexClass::Bucket
                    && v.property_str(P_REPOSITORY_NAME) == Some(repository)
            })
            .cloned();
        if let Some(bucket) = existing {
            return Ok(bucket);
        }

        let id = VertexId::generate();
        let mut bucket = Vertex::new(id, VertexClass::Bucket, id);
        bucket.set_property(P_REPOSITORY_NAME, repository);
        let graph = self.graph_mut();
        graph.reindex(&bucket);
        graph.vertices.insert(id, bucket.clone());
        Ok(bucket)
    }

    async fn create_vertex(
        &mut self,
        class: VertexClass,
        bucket: VertexId,
    ) -> Result<Vertex, GraphError> {
        self.require(bucket)?;
        let vertex = Vertex::new(VertexId::generate(), class, bucket);
        self.graph_mut()
            .vertices
            .insert(vertex.id(), vertex.clone());
        Ok(vertex)
    }

    async fn vertex(&mut self, id: VertexId) -> Result<Option<Vertex>, GraphError> {
        Ok(self.working.vertices.get(&id).cloned())
    }

    async fn save_vertex(&mut self, vertex: &mut Vertex) -> Result<(), GraphError> {
        let previous = self
            .working
            .vertices
            .get(&vertex.id())
            .cloned()
            .ok_or(GraphError::VertexNotFound(vertex.id()))?;

        for (key, value) in self.unique.unique_entries(vertex) {
            let index_key = IndexKey::new(vertex.bucket(), vertex.class(), &key, &value);
            if self.working.lookup(&index_key).any(|v| v.id() != vertex.id()) {
                return Err(GraphError::DuplicateKey {
                    class: vertex.class(),
                    key,
                    value,
                });
            }
        }

        vertex.touch();
        let graph = self.graph_mut();
        graph.unindex(&previous);
        graph.reindex(vertex);
        graph.vertices.insert(vertex.id(), vertex.clone());
        Ok(())
    }

    async fn delete_vertex(&mut self, id: VertexId) -> Result<bool, GraphError> {
        if !self.working.vertices.contains_key(&id) {
            return Ok(false);
        }
        let graph = self.graph_mut();
        if let Some(vertex) = graph.vertices.remove(&id) {
            graph.unindex(&vertex);
        }
        graph.edges.retain(|e| e.from != id && e.to != id);
        Ok(true)
    }

    async fn find_with_property(
        &mut self,
        class: VertexClass,
        key: &str,
        value: &str,
        bucket: VertexId,
    ) -> Result<Option<Vertex>, GraphError> {
        let index_key = IndexKey::new(bucket, class, key, value);
        Ok(self
            .working
            .lookup(&index_key)
            .min_by_key(|v| v.created())
            .cloned())
    }

    async fn add_edge(
        &mut self,
        from: VertexId,
        label: &str,
        to: VertexId,
    ) -> Result<(), GraphError> {
        self.require(from)?;
        self.require(to)?;
        let graph = self.graph_mut();
        let exists = graph
            .edges
            .iter()
            .any(|e| e.from == from && e.to == to && e.label == label);
        if !exists {
            graph.edges.push(Edge {
                from,
                label: label.to_string(),
                to,
            });
        }
        Ok(())
    }

    async fn in_vertices(&mut self, to: VertexId, label: &str) -> Result<Vec<Vertex>, GraphError> {
        Ok(self
            .working
            .edges
            .iter()
            .filter(|e| e.to == to && e.label == label)
            .filter_map(|e| self.working.vertices.get(&e.from).cloned())
            .collect())
    }

    async fn out_vertices(
        &mut self,
        from: VertexId,
        label: &str,
    ) -> Result<Vec<Vertex>, GraphError> {
        Ok(self
            .working
            .edges
            .iter()
            .filter(|e| e.from == from && e.label == label)
            .filter_map(|e| self.working.vertices.get(&e.to).cloned())
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), GraphError> {
        let MemoryTx {
            mut committed,
            working,
            ..
        } = *self;
        *committed = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::exercise_store;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryMetadataStore::new();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_transactions_are_serialized() {
        let store = MemoryMetadataStore::new();
        let tx = store.begin().await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let mut tx = contender.begin().await.unwrap();
            tx.bucket("late").await.unwrap();
            tx.commit().await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(tx);
        waiter.await.unwrap();
    }
}
