//! Maven 2 repository layout.

mod group;
mod path;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attributes::NestedAttributes;

use super::{ComponentLocator, FacetError, FormatStrategy, Locator, Result, StorageContentFacet};

pub use group::MavenGroupFacet;
pub use path::{Coordinates, MavenPath};

pub const FORMAT: &str = "maven2";

const A_GROUP_ID: &str = "groupId";
const A_ARTIFACT_ID: &str = "artifactId";
const A_VERSION: &str = "version";
const A_BASE_VERSION: &str = "baseVersion";
const A_CLASSIFIER: &str = "classifier";
const A_EXTENSION: &str = "extension";

/// Which artifact versions a repository accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    #[default]
    Release,
    Snapshot,
    Mixed,
}

impl VersionPolicy {
    pub fn allows(&self, coordinates: &Coordinates) -> bool {
        match self {
            VersionPolicy::Release => !coordinates.snapshot,
            VersionPolicy::Snapshot => coordinates.snapshot,
            VersionPolicy::Mixed => true,
        }
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VersionPolicy::Release => "release",
            VersionPolicy::Snapshot => "snapshot",
            VersionPolicy::Mixed => "mixed",
        })
    }
}

impl FromStr for VersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(VersionPolicy::Release),
            "snapshot" => Ok(VersionPolicy::Snapshot),
            "mixed" => Ok(VersionPolicy::Mixed),
            other => Err(format!("unknown version policy '{}'", other)),
        }
    }
}

/// Components are GAVs keyed `groupId:artifactId:version`; files outside
/// the artifact layout are standalone assets.
#[derive(Debug, Clone, Default)]
pub struct MavenStrategy {
    version_policy: VersionPolicy,
}

impl MavenStrategy {
    pub fn new(version_policy: VersionPolicy) -> Self {
        Self { version_policy }
    }

    pub fn version_policy(&self) -> VersionPolicy {
        self.version_policy
    }
}

fn coordinate_attributes(coordinates: &Coordinates) -> Result<NestedAttributes> {
    let mut attributes = NestedAttributes::new();
    attributes.set(A_GROUP_ID, &coordinates.group_id)?;
    attributes.set(A_ARTIFACT_ID, &coordinates.artifact_id)?;
    attributes.set(A_VERSION, &coordinates.version)?;
    if coordinates.snapshot {
        attributes.set(A_BASE_VERSION, &coordinates.base_version)?;
    }
    Ok(attributes)
}

impl FormatStrategy for MavenStrategy {
    fn format(&self) -> &str {
        FORMAT
    }

    fn locate(&self, path: &str) -> Result<Locator> {
        let maven_path = MavenPath::parse(path);
        let Some(coordinates) = maven_path.coordinates() else {
            return Ok(Locator {
                path: path.to_string(),
                asset_name: maven_path.file_name().to_string(),
                component: None,
                asset_attributes: NestedAttributes::new(),
            });
        };

        let mut asset_attributes = coordinate_attributes(coordinates)?;
        asset_attributes.set(A_CLASSIFIER, coordinates.classifier.as_deref())?;
        asset_attributes.set(A_EXTENSION, &coordinates.extension)?;

        Ok(Locator {
            path: path.to_string(),
            asset_name: maven_path.file_name().to_string(),
            component: Some(ComponentLocator {
                key: coordinates.component_key(),
                group: Some(coordinates.group_id.clone()),
                name: coordinates.artifact_id.clone(),
                version: Some(coordinates.version.clone()),
                attributes: coordinate_attributes(coordinates)?,
            }),
            asset_attributes,
        })
    }

    fn check_put(&self, locator: &Locator) -> Result<()> {
        let maven_path = MavenPath::parse(&locator.path);
        match maven_path.coordinates() {
            Some(coordinates) if !self.version_policy.allows(coordinates) => {
                Err(FacetError::Rejected(format!(
                    "version {} not allowed by {} policy",
                    coordinates.version, self.version_policy
                )))
            }
            _ => Ok(()),
        }
    }
}

pub type MavenFacet = StorageContentFacet<MavenStrategy>;
