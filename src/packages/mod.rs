// src/packages/mod.rs

//! Package records
//!
//! `PackageRecord` is the host-side description of one package artifact, as it
//! appears in conda `repodata.json` documents and in environment metadata.
//! The solver works on `SolverRecord` (see [`convert`]).

pub mod convert;

use crate::error::Result;
use crate::spec::MatchSpec;
use crate::version::{CondaVersion, VersionSpec};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub use convert::SolverRecord;

/// Channels whose packages are not managed by the resolver
const UNMANAGEABLE_CHANNELS: &[&str] = &["pypi", "<develop>"];

/// Noarch classification of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NoArchType {
    /// Platform specific build
    #[default]
    Native,
    /// Pure python, compiled at link time
    Python,
    /// Platform independent files
    Generic,
}

impl NoArchType {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Native => None,
            Self::Python => Some("python"),
            Self::Generic => Some("generic"),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl Serialize for NoArchType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(kind) => serializer.serialize_str(kind),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for NoArchType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Old repodata uses `noarch: true` for generic packages
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Kind(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None | Some(Raw::Flag(false)) => Ok(Self::Native),
            Some(Raw::Flag(true)) => Ok(Self::Generic),
            Some(Raw::Kind(kind)) => match kind.as_str() {
                "python" => Ok(Self::Python),
                "generic" => Ok(Self::Generic),
                "" => Ok(Self::Native),
                other => Err(D::Error::custom(format!("unknown noarch type '{}'", other))),
            },
        }
    }
}

/// A package record in host schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
    /// Channel the record came from (name or base URL)
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub subdir: String,
    #[serde(rename = "fn", default)]
    pub file_name: String,
    #[serde(default)]
    pub url: String,
    /// Lowercase hex digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// Lowercase hex digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_bz2_md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_bz2_size: Option<u64>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub constrains: Vec<String>,
    #[serde(default)]
    pub noarch: NoArchType,
    /// Milliseconds since the Unix epoch, 0 when unknown
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_family: Option<String>,
    /// Space separated feature names
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub track_features: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub features: String,
}

impl PackageRecord {
    /// Create a record with the identifying fields set
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        build: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            build: build.into(),
            ..Self::default()
        }
    }

    pub fn parsed_version(&self) -> Result<CondaVersion> {
        CondaVersion::parse(&self.version)
    }

    /// The strictest spec selecting exactly this record
    ///
    /// `channel::name==version build`
    pub fn to_match_spec(&self) -> Result<MatchSpec> {
        Ok(MatchSpec {
            name: self.name.clone(),
            channel: (!self.channel.is_empty()).then(|| self.channel.clone()),
            version: Some(VersionSpec::Exact(self.parsed_version()?)),
            build: (!self.build.is_empty()).then(|| self.build.clone()),
        })
    }

    /// Channel name without any URL prefix
    pub fn channel_name(&self) -> &str {
        self.channel
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.channel)
    }

    /// Records installed from PyPI or in development mode are left alone
    pub fn is_unmanageable(&self) -> bool {
        UNMANAGEABLE_CHANNELS.contains(&self.channel_name())
    }

    /// Whether any dependency of this record names `name`
    pub fn depends_on(&self, name: &str) -> bool {
        self.depends
            .iter()
            .any(|dep| dependency_name(dep) == name)
    }
}

/// Name part of a dependency string like `python >=3.9,<3.10.0a0`
pub fn dependency_name(dep: &str) -> &str {
    let dep = dep.trim();
    let end = dep
        .find(|c: char| c.is_whitespace() || matches!(c, '=' | '<' | '>' | '!' | '~' | '['))
        .unwrap_or(dep.len());
    &dep[..end]
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.channel.is_empty() {
            write!(f, "{}-{}-{}", self.name, self.version, self.build)
        } else {
            write!(
                f,
                "{}::{}-{}-{}",
                self.channel_name(),
                self.name,
                self.version,
                self.build
            )
        }
    }
}
