//! Maven repository layout paths.

use std::fmt;
use std::sync::LazyLock;

use blob_store::HashAlgorithm;
use regex::Regex;

const SNAPSHOT: &str = "SNAPSHOT";

/// Timestamp and build number of a deployed snapshot, e.g. `20150601.101010-3`.
static SNAPSHOT_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8}\.\d{6})-(\d+)").expect("valid snapshot regex"));

/// GAV coordinates of an artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub group_id: String,
    pub artifact_id: String,
    /// Version as it appears in the file name (timestamped for deployed snapshots)
    pub version: String,
    /// Version as it appears in the directory name
    pub base_version: String,
    pub snapshot: bool,
    pub timestamp: Option<String>,
    pub build_number: Option<u32>,
    pub classifier: Option<String>,
    /// Everything after the first dot following version and classifier, e.g. `jar`, `tar.gz`, `jar.sha1`
    pub extension: String,
}

impl Coordinates {
    /// Component key, `groupId:artifactId:version`.
    pub fn component_key(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// A parsed repository path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenPath {
    path: String,
    file_name: String,
    hash_type: Option<HashAlgorithm>,
    coordinates: Option<Coordinates>,
}

impl MavenPath {
    /// Parse a normalized path. Paths that do not follow the artifact
    /// layout (metadata, index files) parse without coordinates.
    pub fn parse(path: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let hash_type = HashAlgorithm::REQUIRED
            .into_iter()
            .find(|a| file_name.ends_with(a.extension()));
        Self {
            path: path.to_string(),
            coordinates: parse_coordinates(path),
            file_name,
            hash_type,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn coordinates(&self) -> Option<&Coordinates> {
        self.coordinates.as_ref()
    }

    pub fn hash_type(&self) -> Option<HashAlgorithm> {
        self.hash_type
    }

    pub fn is_hash(&self) -> bool {
        self.hash_type.is_some()
    }

    /// Path of the file this checksum file belongs to; itself for other files.
    pub fn main(&self) -> MavenPath {
        match self.hash_type {
            Some(a) => MavenPath::parse(&self.path[..self.path.len() - a.extension().len()]),
            None => self.clone(),
        }
    }

    /// Path of the checksum file for this path.
    pub fn hash(&self, algorithm: HashAlgorithm) -> MavenPath {
        let main = self.main();
        MavenPath::parse(&format!("{}{}", main.path, algorithm.extension()))
    }
}

impl fmt::Display for MavenPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn parse_coordinates(path: &str) -> Option<Coordinates> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 4 {
        return None;
    }
    let n = segments.len();
    let file_name = segments[n - 1];
    let base_version = segments[n - 2];
    let artifact_id = segments[n - 3];
    let group_id = segments[..n - 3].join(".");

    let rest = file_name.strip_prefix(artifact_id)?.strip_prefix('-')?;

    let snapshot = base_version.ends_with(SNAPSHOT);
    let (version, timestamp, build_number, tail) = match rest.strip_prefix(base_version) {
        Some(tail) => (base_version.to_string(), None, None, tail),
        None if snapshot => {
            let prefix = &base_version[..base_version.len() - SNAPSHOT.len()];
            let after = rest.strip_prefix(prefix)?;
            let captures = SNAPSHOT_TIMESTAMP.captures(after)?;
            let whole = captures.get(0)?.as_str();
            let timestamp = captures.get(1)?.as_str().to_string();
            let build_number = captures.get(2)?.as_str().parse::<u32>().ok()?;
            (
                format!("{}{}", prefix, whole),
                Some(timestamp),
                Some(build_number),
                &after[whole.len()..],
            )
        }
        None => return None,
    };

    let (classifier, extension) = if let Some(extension) = tail.strip_prefix('.') {
        (None, extension)
    } else if let Some(classified) = tail.strip_prefix('-') {
        let (classifier, extension) = classified.split_once('.')?;
        if classifier.is_empty() {
            return None;
        }
        (Some(classifier.to_string()), extension)
    } else {
        return None;
    };
    if extension.is_empty() {
        return None;
    }

    Some(Coordinates {
        group_id,
        artifact_id: artifact_id.to_string(),
        version,
        base_version: base_version.to_string(),
        snapshot,
        timestamp,
        build_number,
        classifier,
        extension: extension.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_artifact() {
        let path = MavenPath::parse("org/example/widget/1.0/widget-1.0.jar");
        let c = path.coordinates().unwrap();
        assert_eq!(c.group_id, "org.example");
        assert_eq!(c.artifact_id, "widget");
        assert_eq!(c.version, "1.0");
        assert_eq!(c.base_version, "1.0");
        assert!(!c.snapshot);
        assert_eq!(c.classifier, None);
        assert_eq!(c.extension, "jar");
        assert_eq!(c.component_key(), "org.example:widget:1.0");
        assert_eq!(path.file_name(), "widget-1.0.jar");
        assert!(!path.is_hash());
    }

    #[test]
    fn test_classifier_and_compound_extension() {
        let path = MavenPath::parse("org/example/widget/1.0/widget-1.0-dist.tar.gz");
        let c = path.coordinates().unwrap();
        assert_eq!(c.classifier.as_deref(), Some("dist"));
        assert_eq!(c.extension, "tar.gz");
    }

    #[test]
    fn test_snapshots() {
        let plain = MavenPath::parse("org/example/widget/1.1-SNAPSHOT/widget-1.1-SNAPSHOT.pom");
        let c = plain.coordinates().unwrap();
        assert!(c.snapshot);
        assert_eq!(c.version, "1.1-SNAPSHOT");
        assert_eq!(c.timestamp, None);

        let stamped = MavenPath::parse(
            "org/example/widget/1.1-SNAPSHOT/widget-1.1-20150601.101010-3-sources.jar",
        );
        let c = stamped.coordinates().unwrap();
        assert!(c.snapshot);
        assert_eq!(c.version, "1.1-20150601.101010-3");
        assert_eq!(c.base_version, "1.1-SNAPSHOT");
        assert_eq!(c.timestamp.as_deref(), Some("20150601.101010"));
        assert_eq!(c.build_number, Some(3));
        assert_eq!(c.classifier.as_deref(), Some("sources"));
        assert_eq!(c.extension, "jar");
    }

    #[test]
    fn test_hash_paths() {
        let path = MavenPath::parse("org/example/widget/1.0/widget-1.0.jar.sha1");
        assert_eq!(path.hash_type(), Some(HashAlgorithm::Sha1));
        assert_eq!(path.coordinates().unwrap().extension, "jar.sha1");
        assert_eq!(path.main().path(), "org/example/widget/1.0/widget-1.0.jar");
        assert_eq!(
            path.hash(HashAlgorithm::Md5).path(),
            "org/example/widget/1.0/widget-1.0.jar.md5"
        );
    }

    #[test]
    fn test_non_artifact_paths() {
        assert!(MavenPath::parse("org/example/widget/maven-metadata.xml")
            .coordinates()
            .is_none());
        assert!(MavenPath::parse("org/example/widget/1.0/other-1.0.jar")
            .coordinates()
            .is_none());
        assert!(MavenPath::parse("widget/1.0/widget-1.0.jar")
            .coordinates()
            .is_none());
        assert!(MavenPath::parse("org/example/widget/1.0/widget-1.0")
            .coordinates()
            .is_none());
        assert!(MavenPath::parse("archetype-catalog.xml").coordinates().is_none());
    }
}
