// src/index/mod.rs
//! Package index built from local repodata documents
//!
//! The resolver only needs two things from an index: records matching a spec,
//! and the list of channels searched. `RepoIndex` answers both from parsed
//! `repodata.json` files; `IndexService` shares one lazily built snapshot and
//! lets callers drop or rebuild it explicitly.

use crate::error::{Error, Result};
use crate::packages::PackageRecord;
use crate::spec::MatchSpec;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Read access to package metadata
pub trait PackageIndex: Send + Sync {
    /// All records matching `spec`, in channel order
    fn search(&self, spec: &MatchSpec) -> Vec<PackageRecord>;

    /// Channels searched, highest priority first
    fn channels(&self) -> Vec<String>;
}

/// Which artifact flavour to keep when both exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageFormat {
    /// Keep `.conda` artifacts and drop their `.tar.bz2` twins
    #[default]
    PreferConda,
    /// Ignore `.conda` artifacts entirely
    OnlyTarBz2,
}

/// One repodata document belonging to a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDataSource {
    pub channel: String,
    pub path: PathBuf,
}

impl RepoDataSource {
    pub fn new(channel: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            channel: channel.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RepoDataInfo {
    #[serde(default)]
    subdir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RepoData {
    #[serde(default)]
    info: RepoDataInfo,
    #[serde(default)]
    packages: IndexMap<String, PackageRecord>,
    #[serde(default, rename = "packages.conda")]
    packages_conda: IndexMap<String, PackageRecord>,
}

/// Records loaded from one source
#[derive(Debug, Clone)]
struct ChannelRepo {
    source: Option<RepoDataSource>,
    channel: String,
    records: Vec<PackageRecord>,
}

/// In-memory index over one or more repodata documents
#[derive(Debug, Clone, Default)]
pub struct RepoIndex {
    format: PackageFormat,
    repos: Vec<ChannelRepo>,
}

impl RepoIndex {
    /// Load every source, keeping the given order as channel priority
    pub fn load(sources: &[RepoDataSource], format: PackageFormat) -> Result<Self> {
        let mut repos = Vec::with_capacity(sources.len());
        for source in sources {
            let records = read_repodata(source, format)?;
            debug!(
                "Loaded {} records for {} from {}",
                records.len(),
                source.channel,
                source.path.display()
            );
            repos.push(ChannelRepo {
                source: Some(source.clone()),
                channel: source.channel.clone(),
                records,
            });
        }
        Ok(Self { format, repos })
    }

    /// Build an index from records already in memory
    pub fn from_records(channel: impl Into<String>, records: Vec<PackageRecord>) -> Self {
        let channel = channel.into();
        let records = records
            .into_iter()
            .map(|mut r| {
                if r.channel.is_empty() {
                    r.channel = channel.clone();
                }
                r
            })
            .collect();
        Self {
            format: PackageFormat::default(),
            repos: vec![ChannelRepo {
                source: None,
                channel,
                records,
            }],
        }
    }

    /// Append another index's repos after this one's (lower priority)
    pub fn extend(&mut self, other: RepoIndex) {
        self.repos.extend(other.repos);
    }

    pub fn format(&self) -> PackageFormat {
        self.format
    }

    /// Count records, optionally only those accepted by `filter`
    pub fn n_packages(&self, filter: Option<&dyn Fn(&PackageRecord) -> bool>) -> usize {
        let records = self.repos.iter().flat_map(|repo| repo.records.iter());
        match filter {
            Some(filter) => records.filter(|r| filter(r)).count(),
            None => records.count(),
        }
    }

    /// Re-read the files backing `channel`
    ///
    /// Returns how many documents were reloaded. In-memory repos are kept.
    pub fn reload_channel(&mut self, channel: &str) -> Result<usize> {
        let mut reloaded = 0;
        for repo in self.repos.iter_mut().filter(|r| r.channel == channel) {
            if let Some(source) = &repo.source {
                debug!("Reloading repo {} from {}", channel, source.path.display());
                repo.records = read_repodata(source, self.format)?;
                reloaded += 1;
            }
        }
        if reloaded == 0 && !self.repos.iter().any(|r| r.channel == channel) {
            return Err(Error::InvalidInput(format!(
                "Channel '{}' is not part of this index",
                channel
            )));
        }
        Ok(reloaded)
    }
}

impl PackageIndex for RepoIndex {
    fn search(&self, spec: &MatchSpec) -> Vec<PackageRecord> {
        self.repos
            .iter()
            .flat_map(|repo| repo.records.iter())
            .filter(|record| spec.matches(record))
            .cloned()
            .collect()
    }

    fn channels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.repos
            .iter()
            .filter(|repo| seen.insert(repo.channel.as_str()))
            .map(|repo| repo.channel.clone())
            .collect()
    }
}

fn read_repodata(source: &RepoDataSource, format: PackageFormat) -> Result<Vec<PackageRecord>> {
    let content = fs::read_to_string(&source.path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", source.path.display(), e),
        ))
    })?;
    let repodata: RepoData = serde_json::from_str(&content)?;
    Ok(select_records(repodata, &source.channel, format))
}

fn select_records(repodata: RepoData, channel: &str, format: PackageFormat) -> Vec<PackageRecord> {
    let subdir = repodata.info.subdir.unwrap_or_default();
    let conda_stems: HashSet<String> = repodata
        .packages_conda
        .keys()
        .filter_map(|name| name.strip_suffix(".conda"))
        .map(str::to_string)
        .collect();

    let tarballs = repodata.packages.into_iter().filter(|(file_name, _)| {
        match (format, file_name.strip_suffix(".tar.bz2")) {
            (PackageFormat::PreferConda, Some(stem)) => !conda_stems.contains(stem),
            _ => true,
        }
    });

    let conda = match format {
        PackageFormat::PreferConda => Some(repodata.packages_conda.into_iter()),
        PackageFormat::OnlyTarBz2 => None,
    };

    tarballs
        .chain(conda.into_iter().flatten())
        .map(|(file_name, mut record)| {
            if record.file_name.is_empty() {
                record.file_name = file_name;
            }
            if record.channel.is_empty() {
                record.channel = channel.to_string();
            }
            if record.subdir.is_empty() {
                record.subdir = subdir.clone();
            }
            record
        })
        .collect()
}

type IndexLoader = Box<dyn Fn() -> Result<RepoIndex> + Send + Sync>;

/// Lazily built, shared index snapshot
///
/// A solve grabs one `Arc<RepoIndex>` and keeps it for its whole loop;
/// `invalidate` and `reload` only affect later callers.
pub struct IndexService {
    loader: IndexLoader,
    cached: RwLock<Option<Arc<RepoIndex>>>,
}

impl IndexService {
    pub fn new(loader: impl Fn() -> Result<RepoIndex> + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            cached: RwLock::new(None),
        }
    }

    /// Service backed by repodata files
    pub fn from_sources(sources: Vec<RepoDataSource>, format: PackageFormat) -> Self {
        Self::new(move || RepoIndex::load(&sources, format))
    }

    /// Current snapshot, loading it on first use
    pub fn get(&self) -> Result<Arc<RepoIndex>> {
        if let Some(index) = self.cached.read().as_ref() {
            return Ok(Arc::clone(index));
        }

        let mut cached = self.cached.write();
        if let Some(index) = cached.as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new((self.loader)()?);
        info!(
            "Package index ready: {} records in {} channel(s)",
            index.n_packages(None),
            index.channels().len()
        );
        *cached = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Drop the cached snapshot; the next `get` rebuilds it
    pub fn invalidate(&self) {
        self.cached.write().take();
    }

    /// Rebuild the snapshot now
    pub fn reload(&self) -> Result<Arc<RepoIndex>> {
        let index = Arc::new((self.loader)()?);
        *self.cached.write() = Some(Arc::clone(&index));
        Ok(index)
    }

    pub fn is_loaded(&self) -> bool {
        self.cached.read().is_some()
    }
}

/// Resolve a repodata path relative to the file that mentions it
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    const REPODATA: &str = r#"{
        "info": {"subdir": "linux-64"},
        "packages": {
            "zlib-1.2.13-h0_0.tar.bz2": {"name": "zlib", "version": "1.2.13", "build": "h0_0"},
            "zlib-1.3.1-h0_0.tar.bz2": {"name": "zlib", "version": "1.3.1", "build": "h0_0"}
        },
        "packages.conda": {
            "zlib-1.3.1-h0_0.conda": {"name": "zlib", "version": "1.3.1", "build": "h0_0"},
            "numpy-1.26.4-py312_0.conda": {"name": "numpy", "version": "1.26.4", "build": "py312_0"}
        }
    }"#;

    fn repodata_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_prefer_conda_drops_twins() {
        let file = repodata_file(REPODATA);
        let index = RepoIndex::load(
            &[RepoDataSource::new("conda-forge", file.path())],
            PackageFormat::PreferConda,
        )
        .unwrap();

        assert_eq!(index.n_packages(None), 3);
        let zlib = index.search(&MatchSpec::parse("zlib 1.3.1").unwrap());
        assert_eq!(zlib.len(), 1);
        assert_eq!(zlib[0].file_name, "zlib-1.3.1-h0_0.conda");
        assert_eq!(zlib[0].channel, "conda-forge");
        assert_eq!(zlib[0].subdir, "linux-64");
    }

    #[test]
    fn test_only_tar_bz2() {
        let file = repodata_file(REPODATA);
        let index = RepoIndex::load(
            &[RepoDataSource::new("conda-forge", file.path())],
            PackageFormat::OnlyTarBz2,
        )
        .unwrap();

        assert_eq!(index.n_packages(None), 2);
        assert!(index.search(&MatchSpec::parse("numpy").unwrap()).is_empty());
        let only_new = |r: &PackageRecord| r.version == "1.3.1";
        assert_eq!(index.n_packages(Some(&only_new)), 1);
    }

    #[test]
    fn test_channels_in_priority_order() {
        let mut index = RepoIndex::from_records("conda-forge", vec![PackageRecord::new("a", "1", "0")]);
        index.extend(RepoIndex::from_records("defaults", vec![PackageRecord::new("a", "2", "0")]));
        index.extend(RepoIndex::from_records("conda-forge", vec![]));
        assert_eq!(index.channels(), vec!["conda-forge", "defaults"]);

        let found = index.search(&MatchSpec::parse("a").unwrap());
        assert_eq!(found[0].version, "1");
        let pinned = index.search(&MatchSpec::parse("defaults::a").unwrap());
        assert_eq!(pinned.len(), 1);
    }

    #[test]
    fn test_reload_channel_rereads_file() {
        let file = repodata_file(REPODATA);
        let mut index = RepoIndex::load(
            &[RepoDataSource::new("conda-forge", file.path())],
            PackageFormat::PreferConda,
        )
        .unwrap();

        fs::write(file.path(), r#"{"packages": {}}"#).unwrap();
        assert_eq!(index.reload_channel("conda-forge").unwrap(), 1);
        assert_eq!(index.n_packages(None), 0);
        assert!(index.reload_channel("missing").is_err());
    }

    #[test]
    fn test_service_caches_until_invalidated() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let service = IndexService::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RepoIndex::from_records("local", vec![PackageRecord::new("a", "1", "0")]))
        });

        assert!(!service.is_loaded());
        let first = service.get().unwrap();
        let second = service.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        service.invalidate();
        assert!(!service.is_loaded());
        service.get().unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        let reloaded = service.reload().unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_service_propagates_load_errors() {
        let service = IndexService::from_sources(
            vec![RepoDataSource::new("x", "/nonexistent/repodata.json")],
            PackageFormat::PreferConda,
        );
        assert!(service.get().is_err());
        assert!(!service.is_loaded());
    }
}
