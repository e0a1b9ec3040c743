// src/session.rs

//! Session files
//!
//! A session describes one solve in TOML: the environment as it is, the
//! user's request and where the repodata lives. Repodata paths are relative
//! to the session file.
//!
//! ```toml
//! channels = ["conda-forge"]
//! history = ["python 3.9.*"]
//! pinned = []
//!
//! [[repodata]]
//! channel = "conda-forge"
//! path = "repodata.json"
//!
//! [request]
//! add = ["numpy"]
//! update_modifier = "update-specs"
//!
//! [[installed]]
//! name = "python"
//! version = "3.9.18"
//! build = "h0755675_0"
//! channel = "conda-forge"
//! ```

use crate::error::{Error, Result};
use crate::index::{resolve_path, IndexService, PackageFormat, RepoDataSource, RepoIndex};
use crate::packages::PackageRecord;
use crate::resolver::ResolveMode;
use crate::spec::MatchSpec;
use crate::state::{DepsModifier, InputState, UpdateModifier, VirtualPackage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the user asked for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionRequest {
    pub add: Vec<MatchSpec>,
    pub remove: Vec<MatchSpec>,
    pub update_modifier: UpdateModifier,
    pub deps_modifier: DepsModifier,
    pub prune: bool,
    pub ignore_pinned: bool,
    pub force_remove: bool,
    /// Classify for a package build tool instead of an environment
    pub build_tool: bool,
}

/// A parsed session file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Session {
    pub channels: Vec<String>,
    pub repodata: Vec<RepoDataSource>,
    pub request: SessionRequest,
    pub history: Vec<MatchSpec>,
    pub pinned: Vec<MatchSpec>,
    pub aggressive_updates: Vec<MatchSpec>,
    pub do_not_remove: Vec<MatchSpec>,
    pub installed: Vec<PackageRecord>,
    pub virtual_packages: Vec<VirtualPackage>,
    /// Directory repodata paths are relative to
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Session {
    pub fn from_toml(content: &str) -> Result<Self> {
        let session: Session = toml::from_str(content)?;
        Ok(session)
    }

    /// Load a session; relative repodata paths resolve against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!(
                "failed to read session file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut session = Self::from_toml(&content)?;
        session.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!(
            "Loaded session {}: {} installed, {} repodata file(s)",
            path.display(),
            session.installed.len(),
            session.repodata.len()
        );
        Ok(session)
    }

    pub fn mode(&self) -> ResolveMode {
        if self.request.build_tool {
            ResolveMode::BuildTool
        } else {
            ResolveMode::Standard
        }
    }

    /// Validated solve inputs
    pub fn input_state(&self) -> Result<InputState> {
        let request = &self.request;
        InputState::builder()
            .installed(self.installed.iter().cloned())
            .history(self.history.iter().cloned())
            .pinned(self.pinned.iter().cloned())
            .add(request.add.iter().cloned())
            .remove(request.remove.iter().cloned())
            .aggressive_updates(self.aggressive_updates.iter().cloned())
            .do_not_remove(self.do_not_remove.iter().cloned())
            .virtual_packages(self.virtual_packages.iter().cloned())
            .channels(self.channels.iter().cloned())
            .update_modifier(request.update_modifier)
            .deps_modifier(request.deps_modifier)
            .prune(request.prune)
            .ignore_pinned(request.ignore_pinned)
            .force_remove(request.force_remove)
            .build()
    }

    /// Repodata sources with paths resolved against the session directory
    pub fn sources(&self) -> Vec<RepoDataSource> {
        self.repodata
            .iter()
            .map(|source| {
                RepoDataSource::new(
                    source.channel.clone(),
                    resolve_path(&self.base_dir, &source.path),
                )
            })
            .collect()
    }

    /// Lazily loading index over this session's repodata
    pub fn index_service(&self, format: PackageFormat) -> IndexService {
        IndexService::from_sources(self.sources(), format)
    }

    /// Load the index right away
    pub fn load_index(&self, format: PackageFormat) -> Result<RepoIndex> {
        RepoIndex::load(&self.sources(), format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackageIndex;
    use std::fs;
    use tempfile::TempDir;

    const SESSION: &str = r#"
channels = ["conda-forge"]
history = ["python 3.9.*", "numpy"]

[[repodata]]
channel = "conda-forge"
path = "repodata.json"

[request]
add = ["scipy"]
update_modifier = "freeze-installed"

[[installed]]
name = "python"
version = "3.9.18"
build = "h0755675_0"
channel = "conda-forge"

[[virtual_packages]]
name = "__glibc"
version = "2.35"
"#;

    const REPODATA: &str = r#"{
        "info": {"subdir": "linux-64"},
        "packages": {
            "scipy-1.11.0-py39_0.tar.bz2": {
                "name": "scipy", "version": "1.11.0", "build": "py39_0",
                "build_number": 0, "depends": ["python >=3.9,<3.10"]
            }
        }
    }"#;

    #[test]
    fn test_parse_session() {
        let session = Session::from_toml(SESSION).unwrap();
        assert_eq!(session.channels, vec!["conda-forge".to_string()]);
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.request.add, vec![MatchSpec::parse("scipy").unwrap()]);
        assert_eq!(session.request.update_modifier, UpdateModifier::FreezeInstalled);
        assert_eq!(session.mode(), ResolveMode::Standard);

        let input = session.input_state().unwrap();
        assert!(input.installed().contains_key("python"));
        assert_eq!(input.virtual_packages()[0].name, "__glibc");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Session::from_toml("channel = \"typo\"").is_err());
    }

    #[test]
    fn test_invalid_request_rejected() {
        let session = Session::from_toml(
            r#"
[request]
add = ["a"]
remove = ["b"]
"#,
        )
        .unwrap();
        assert!(matches!(session.input_state(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_repodata_relative_to_session() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("repodata.json"), REPODATA).unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, SESSION).unwrap();

        let session = Session::from_file(&path).unwrap();
        assert_eq!(session.sources()[0].path, dir.path().join("repodata.json"));

        let service = session.index_service(PackageFormat::PreferConda);
        assert!(!service.is_loaded());
        let index = service.get().unwrap();
        assert_eq!(index.search(&MatchSpec::parse("scipy").unwrap()).len(), 1);
    }

    #[test]
    fn test_build_tool_mode() {
        let session = Session::from_toml("[request]\nbuild_tool = true\n").unwrap();
        assert_eq!(session.mode(), ResolveMode::BuildTool);
    }
}
