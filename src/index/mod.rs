//! Dependency index: `groupId:artifactId` coordinates mapped to resolved
//! artifact files.
//!
//! The index is built once per run by walking the host build tool's resolved
//! dependency graph, then pinning the two artifacts the bootstrap module
//! always needs. Coordinate conflicts keep the first-visited artifact and
//! are only warned about; cleaning them up is the project's job, not ours.

use anyhow::{bail, Result};
use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Version of the test-execution API artifact the bootstrap module loads.
pub const PROPER_SUREFIRE_VERSION: &str = "2.6";

/// Version of the modular fork booter artifact. Kept in lockstep with the
/// released plugin version.
pub const PLUGIN_FORK_VERSION: &str = "1.0.0.Beta2";

pub const SUREFIRE_API_GROUP: &str = "org.apache.maven.surefire";
pub const SUREFIRE_API_ARTIFACT: &str = "surefire-api";
pub const MODULAR_BOOTER_GROUP: &str = "org.jboss.maven.surefire.modular";
pub const MODULAR_BOOTER_ARTIFACT: &str = "surefire-booter";

/// `groupId:artifactId` key, the version-agnostic identity of a dependency.
pub fn coordinate(group_id: &str, artifact_id: &str) -> String {
    format!("{group_id}:{artifact_id}")
}

/// Resolution state of a node in the dependency graph. Only `Included`
/// nodes contribute to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Included,
    OmittedForDuplicate,
    OmittedForConflict,
    OmittedForCycle,
}

/// One node of the resolved dependency graph, as supplied by the host build
/// tool. `file` is the already-resolved artifact location when the provider
/// knows it; otherwise the local repository layout decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub state: ResolutionState,
    pub file: Option<PathBuf>,
}

impl DependencyNode {
    fn resolve(&self, repository: &dyn ArtifactRepository) -> ResolvedArtifact {
        let file = self.file.clone().unwrap_or_else(|| {
            repository.path_of(&self.group_id, &self.artifact_id, &self.version)
        });
        ResolvedArtifact {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            file,
        }
    }
}

/// An artifact the index has settled on for a coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub file: PathBuf,
}

impl ResolvedArtifact {
    pub fn coordinate(&self) -> String {
        coordinate(&self.group_id, &self.artifact_id)
    }

    pub fn gav(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Provider of the resolved dependency graph. Visits every node exactly once.
pub trait DependencyGraphSource {
    fn visit_nodes(&self, visit: &mut dyn FnMut(&DependencyNode));
}

impl DependencyGraphSource for Vec<DependencyNode> {
    fn visit_nodes(&self, visit: &mut dyn FnMut(&DependencyNode)) {
        for node in self {
            visit(node);
        }
    }
}

/// Maps a coordinate plus version to a file on disk.
pub trait ArtifactRepository {
    fn path_of(&self, group_id: &str, artifact_id: &str, version: &str) -> PathBuf;
}

/// A Maven-layout local repository:
/// `<base>/<group with dots as separators>/<artifact>/<version>/<artifact>-<version>.jar`.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    base: PathBuf,
}

impl LocalRepository {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        LocalRepository { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl ArtifactRepository for LocalRepository {
    fn path_of(&self, group_id: &str, artifact_id: &str, version: &str) -> PathBuf {
        let mut path = self.base.clone();
        for segment in group_id.split('.') {
            path.push(segment);
        }
        path.push(artifact_id);
        path.push(version);
        path.push(format!("{artifact_id}-{version}.jar"));
        path
    }
}

/// The per-run coordinate index. Owned by one materializer invocation and
/// never shared beyond it.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    artifacts: HashMap<String, ResolvedArtifact>,
}

impl DependencyIndex {
    /// Walk the dependency graph once, indexing every `Included` node, then
    /// pin the two implicitly required bootstrap artifacts at their fixed
    /// versions. An invalid pinned version specification is fatal.
    pub fn build(
        graph: &dyn DependencyGraphSource,
        repository: &dyn ArtifactRepository,
    ) -> Result<Self> {
        let mut index = DependencyIndex::default();

        graph.visit_nodes(&mut |node| {
            if node.state == ResolutionState::Included {
                index.add(node.resolve(repository));
            }
        });

        let implicit = [
            (MODULAR_BOOTER_GROUP, MODULAR_BOOTER_ARTIFACT, PLUGIN_FORK_VERSION),
            (SUREFIRE_API_GROUP, SUREFIRE_API_ARTIFACT, PROPER_SUREFIRE_VERSION),
        ];
        for (group_id, artifact_id, version) in implicit {
            validate_version_spec(version)?;
            index.artifacts.insert(
                coordinate(group_id, artifact_id),
                ResolvedArtifact {
                    group_id: group_id.to_string(),
                    artifact_id: artifact_id.to_string(),
                    version: version.to_string(),
                    file: repository.path_of(group_id, artifact_id, version),
                },
            );
        }

        Ok(index)
    }

    /// Insert with the warn-and-keep-first conflict policy.
    fn add(&mut self, artifact: ResolvedArtifact) {
        let key = artifact.coordinate();
        match self.artifacts.get(&key) {
            Some(existing) if *existing != artifact => {
                warn!(
                    "ignoring found dependency for '{}' since it was already resolved to '{}'; \
                     ignored value is '{}' - run your build tool's dependency report and clean \
                     up the duplicates",
                    key,
                    existing.gav(),
                    artifact.gav()
                );
            }
            Some(_) => {}
            None => {
                self.artifacts.insert(key, artifact);
            }
        }
    }

    pub fn lookup(&self, coordinate: &str) -> Option<&ResolvedArtifact> {
        self.artifacts.get(coordinate)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

fn validate_version_spec(version: &str) -> Result<()> {
    if version.is_empty() || version.chars().any(char::is_whitespace) {
        bail!("invalid version specification '{version}'");
    }
    Ok(())
}
