use std::fmt;

use crate::attributes::NestedAttributes;

use super::Result;

/// Where a path lives in the component/asset model.
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    /// Normalized path; also the asset key
    pub path: String,
    pub asset_name: String,
    /// Owning component, for coordinate based paths
    pub component: Option<ComponentLocator>,
    /// Format attributes set on a newly created asset
    pub asset_attributes: NestedAttributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentLocator {
    pub key: String,
    pub group: Option<String>,
    pub name: String,
    pub version: Option<String>,
    /// Format attributes set on a newly created component
    pub attributes: NestedAttributes,
}

/// Format specific half of a content facet.
pub trait FormatStrategy: Send + Sync + fmt::Debug + 'static {
    /// Format name; also the attribute namespace.
    fn format(&self) -> &str;

    /// Map a normalized path onto the model.
    fn locate(&self, path: &str) -> Result<Locator>;

    /// Veto a write before anything is stored.
    fn check_put(&self, _locator: &Locator) -> Result<()> {
        Ok(())
    }
}
