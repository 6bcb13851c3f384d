//! Typed views of component and asset vertices.

use blob_store::{BlobRef, HashAlgorithm};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::attributes::{AttributeError, NestedAttributes};
use crate::graph::{Vertex, VertexId};

use super::error::{Result, StorageError};

pub const P_FORMAT: &str = "format";
pub const P_GROUP: &str = "group";
pub const P_NAME: &str = "name";
pub const P_VERSION: &str = "version";
pub const P_PATH: &str = "path";
pub const P_CONTENT_TYPE: &str = "content_type";
pub const P_BLOB_REF: &str = "blob_ref";
pub const P_SIZE: &str = "size";
pub const P_BLOB_UPDATED: &str = "blob_updated";

/// Attribute namespace holding the digests of an asset's blob.
pub const A_CHECKSUM: &str = "checksum";

fn set_optional(vertex: &mut Vertex, key: &str, value: Option<&str>) {
    vertex.set_property(key, value.map(Value::from).unwrap_or(Value::Null));
}

/// A named, versioned unit owning zero or more assets.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    vertex: Vertex,
}

impl Component {
    pub(crate) fn new(mut vertex: Vertex, format: &str) -> Self {
        vertex.set_property(P_FORMAT, format);
        Self { vertex }
    }

    pub(crate) fn from_vertex(vertex: Vertex) -> Self {
        Self { vertex }
    }

    pub(crate) fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    pub(crate) fn vertex_mut(&mut self) -> &mut Vertex {
        &mut self.vertex
    }

    pub fn id(&self) -> VertexId {
        self.vertex.id()
    }

    pub fn format(&self) -> &str {
        self.vertex.property_str(P_FORMAT).unwrap_or_default()
    }

    pub fn group(&self) -> Option<&str> {
        self.vertex.property_str(P_GROUP)
    }

    pub fn set_group(&mut self, group: Option<&str>) {
        set_optional(&mut self.vertex, P_GROUP, group);
    }

    pub fn name(&self) -> Option<&str> {
        self.vertex.property_str(P_NAME)
    }

    pub fn set_name(&mut self, name: &str) {
        self.vertex.set_property(P_NAME, name);
    }

    pub fn version(&self) -> Option<&str> {
        self.vertex.property_str(P_VERSION)
    }

    pub fn set_version(&mut self, version: Option<&str>) {
        set_optional(&mut self.vertex, P_VERSION, version);
    }

    pub fn attributes(&self) -> &NestedAttributes {
        self.vertex.attributes()
    }

    pub fn attributes_mut(&mut self) -> &mut NestedAttributes {
        self.vertex.attributes_mut()
    }

    /// Copy of the attributes under this component's format namespace.
    pub fn format_attributes(&self) -> NestedAttributes {
        self.vertex.attributes().child(self.format())
    }

    pub fn format_attributes_mut(
        &mut self,
    ) -> std::result::Result<&mut NestedAttributes, AttributeError> {
        let format = self.format().to_string();
        self.vertex.attributes_mut().child_mut(&format)
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.vertex.created()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.vertex.last_updated()
    }
}

/// A single stored file, optionally part of a component.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    vertex: Vertex,
}

impl Asset {
    pub(crate) fn new(mut vertex: Vertex, format: &str) -> Self {
        vertex.set_property(P_FORMAT, format);
        Self { vertex }
    }

    pub(crate) fn from_vertex(vertex: Vertex) -> Self {
        Self { vertex }
    }

    pub(crate) fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    pub(crate) fn vertex_mut(&mut self) -> &mut Vertex {
        &mut self.vertex
    }

    pub fn id(&self) -> VertexId {
        self.vertex.id()
    }

    pub fn format(&self) -> &str {
        self.vertex.property_str(P_FORMAT).unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.vertex.property_str(P_NAME)
    }

    pub fn set_name(&mut self, name: &str) {
        self.vertex.set_property(P_NAME, name);
    }

    pub fn path(&self) -> Option<&str> {
        self.vertex.property_str(P_PATH)
    }

    pub fn set_path(&mut self, path: &str) {
        self.vertex.set_property(P_PATH, path);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.vertex.property_str(P_CONTENT_TYPE)
    }

    pub fn size(&self) -> Option<u64> {
        self.vertex.property(P_SIZE).and_then(Value::as_u64)
    }

    /// When the blob was last replaced.
    pub fn blob_updated(&self) -> Option<DateTime<Utc>> {
        self.vertex
            .property(P_BLOB_UPDATED)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn blob_ref(&self) -> Result<Option<BlobRef>> {
        self.vertex
            .property_str(P_BLOB_REF)
            .map(|s| {
                s.parse::<BlobRef>()
                    .map_err(|e| StorageError::InvalidRecord(format!("asset {}: {}", self.id(), e)))
            })
            .transpose()
    }

    pub(crate) fn attach_blob(
        &mut self,
        blob_ref: &BlobRef,
        size: u64,
        content_type: &str,
        hashes: impl IntoIterator<Item = (HashAlgorithm, String)>,
    ) -> Result<()> {
        self.vertex.set_property(P_BLOB_REF, blob_ref.to_string());
        self.vertex.set_property(P_SIZE, size);
        self.vertex.set_property(P_CONTENT_TYPE, content_type);
        self.vertex
            .set_property(P_BLOB_UPDATED, serde_json::to_value(Utc::now())?);

        let checksum = self.vertex.attributes_mut().child_mut(A_CHECKSUM)?;
        for (algorithm, digest) in hashes {
            checksum.set(algorithm.name(), digest)?;
        }
        Ok(())
    }

    pub(crate) fn detach_blob(&mut self) {
        for key in [P_BLOB_REF, P_SIZE, P_CONTENT_TYPE, P_BLOB_UPDATED] {
            self.vertex.set_property(key, Value::Null);
        }
        self.vertex.attributes_mut().remove(A_CHECKSUM);
    }

    /// Stored digest of the blob for `algorithm`.
    pub fn checksum(&self, algorithm: HashAlgorithm) -> Option<String> {
        self.vertex
            .attributes()
            .child(A_CHECKSUM)
            .get_str(algorithm.name())
            .map(str::to_string)
    }

    pub fn attributes(&self) -> &NestedAttributes {
        self.vertex.attributes()
    }

    pub fn attributes_mut(&mut self) -> &mut NestedAttributes {
        self.vertex.attributes_mut()
    }

    pub fn format_attributes(&self) -> NestedAttributes {
        self.vertex.attributes().child(self.format())
    }

    pub fn format_attributes_mut(
        &mut self,
    ) -> std::result::Result<&mut NestedAttributes, AttributeError> {
        let format = self.format().to_string();
        self.vertex.attributes_mut().child_mut(&format)
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.vertex.created()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.vertex.last_updated()
    }
}
