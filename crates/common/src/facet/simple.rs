//! Simple format: standalone assets keyed by name, no components.

use crate::attributes::NestedAttributes;

use super::{FormatStrategy, Locator, Result, StorageContentFacet};

pub const FORMAT: &str = "simple";

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStrategy;

impl FormatStrategy for SimpleStrategy {
    fn format(&self) -> &str {
        FORMAT
    }

    fn locate(&self, path: &str) -> Result<Locator> {
        Ok(Locator {
            path: path.to_string(),
            asset_name: path.to_string(),
            component: None,
            asset_attributes: NestedAttributes::new(),
        })
    }
}

pub type SimpleFacet = StorageContentFacet<SimpleStrategy>;
