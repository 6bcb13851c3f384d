//! Raw format: every path is its own component with a single asset.

use crate::attributes::NestedAttributes;

use super::{ComponentLocator, FormatStrategy, Locator, Result, StorageContentFacet};

pub const FORMAT: &str = "raw";

const A_PATH: &str = "path";

#[derive(Debug, Clone, Copy, Default)]
pub struct RawStrategy;

/// Parent directory with a leading slash; `/` for top level files.
fn group_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => format!("/{}", dir),
        None => "/".to_string(),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

impl FormatStrategy for RawStrategy {
    fn format(&self) -> &str {
        FORMAT
    }

    fn locate(&self, path: &str) -> Result<Locator> {
        let mut attributes = NestedAttributes::new();
        attributes.set(A_PATH, path)?;

        Ok(Locator {
            path: path.to_string(),
            asset_name: name_of(path).to_string(),
            component: Some(ComponentLocator {
                key: path.to_string(),
                group: Some(group_of(path)),
                name: name_of(path).to_string(),
                version: None,
                attributes: attributes.clone(),
            }),
            asset_attributes: attributes,
        })
    }
}

pub type RawFacet = StorageContentFacet<RawStrategy>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate() {
        let locator = RawStrategy.locate("docs/guide/index.html").unwrap();
        let component = locator.component.unwrap();
        assert_eq!(component.group.as_deref(), Some("/docs/guide"));
        assert_eq!(component.name, "index.html");
        assert_eq!(component.version, None);
        assert_eq!(locator.asset_name, "index.html");

        let top = RawStrategy.locate("README").unwrap();
        assert_eq!(top.component.unwrap().group.as_deref(), Some("/"));
    }
}
