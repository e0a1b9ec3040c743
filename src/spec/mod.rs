// src/spec/mod.rs
//! Match spec parsing and matching
//!
//! A match spec names a package and optionally narrows it by channel,
//! version and build. Accepted forms:
//!
//! - `numpy`, `numpy 1.26.*`, `numpy 1.26.4 py312h_0` (space separated)
//! - `numpy=1.26` (prefix), `numpy==1.26.4` (exact), `numpy=1.26.4=py312h_0`
//! - `numpy>=1.20,<2`, `libfoo<0.0.0dev0`
//! - `conda-forge::numpy`, `numpy[version='>=1.20',build=py*]`

use crate::error::{Error, Result};
use crate::packages::PackageRecord;
use crate::version::VersionSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters that start the version part of a compact spec
const OPERATOR_CHARS: &[char] = &['=', '<', '>', '!', '~'];

/// How specific a spec is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecKind {
    /// Only the package name (strictness 1)
    NameOnly,
    /// Name and version (strictness 2)
    Version,
    /// Name, version and build (strictness 3)
    Build,
}

/// A package match spec
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatchSpec {
    /// Package name, may contain `*` globs
    pub name: String,
    pub channel: Option<String>,
    pub version: Option<VersionSpec>,
    /// Build string pattern, may contain `*` globs
    pub build: Option<String>,
}

impl MatchSpec {
    /// A spec that matches any version of `name`
    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: None,
            version: None,
            build: None,
        }
    }

    /// Parse a match spec string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::ParseError("Empty match spec".to_string()));
        }

        let (mut channel, rest) = match s.split_once("::") {
            Some((channel, rest)) => {
                let channel = channel.trim();
                if channel.is_empty() {
                    return Err(Error::ParseError(format!("Empty channel in spec '{}'", s)));
                }
                (Some(channel.to_string()), rest.trim())
            }
            None => (None, s),
        };

        let (body, brackets) = split_brackets(rest)?;
        let body = body.trim().trim_end_matches('=');

        let mut tokens = body.split_whitespace();
        let first = tokens
            .next()
            .ok_or_else(|| Error::ParseError(format!("Missing package name in spec '{}'", s)))?;

        let (name, mut version, mut build) = parse_compact(first)?;
        let remaining: Vec<&str> = tokens.collect();
        match (version.is_some(), remaining.as_slice()) {
            (_, []) => {}
            (true, [b]) => build = Some(b.to_string()),
            (false, [v]) => version = Some(VersionSpec::parse(v)?),
            (false, [v, b]) => {
                version = Some(VersionSpec::parse(v)?);
                build = Some(b.to_string());
            }
            _ => {
                return Err(Error::ParseError(format!(
                    "Too many fields in spec '{}'",
                    s
                )));
            }
        }

        for (key, value) in brackets {
            match key.as_str() {
                "version" => version = Some(VersionSpec::parse(&value)?),
                "build" => build = Some(value),
                "channel" => {
                    if channel.is_none() {
                        channel = Some(value);
                    }
                }
                other => {
                    return Err(Error::ParseError(format!(
                        "Unsupported key '{}' in spec '{}'",
                        other, s
                    )));
                }
            }
        }

        Ok(Self {
            channel,
            ..Self::assemble(name, version, build)
        })
    }

    fn assemble(name: String, version: Option<VersionSpec>, build: Option<String>) -> Self {
        Self {
            name,
            channel: None,
            version: version.filter(|v| !v.is_any()),
            build: build.filter(|b| b != "*"),
        }
    }

    /// 1 for name only, 2 with a version, 3 with a build
    pub fn strictness(&self) -> u8 {
        match self.kind() {
            SpecKind::NameOnly => 1,
            SpecKind::Version => 2,
            SpecKind::Build => 3,
        }
    }

    pub fn kind(&self) -> SpecKind {
        if self.build.is_some() {
            SpecKind::Build
        } else if self.version.is_some() {
            SpecKind::Version
        } else {
            SpecKind::NameOnly
        }
    }

    pub fn is_name_only(&self) -> bool {
        self.kind() == SpecKind::NameOnly
    }

    /// Whether the name is a glob pattern
    pub fn is_glob(&self) -> bool {
        self.name.contains('*')
    }

    /// Check whether `name` is selected by this spec's name (glob aware)
    pub fn matches_name(&self, name: &str) -> bool {
        if self.is_glob() {
            glob_match(&self.name, name)
        } else {
            self.name == name
        }
    }

    /// Check whether a record satisfies every part of this spec
    pub fn matches(&self, record: &PackageRecord) -> bool {
        if !self.matches_name(&record.name) {
            return false;
        }

        if let Some(channel) = &self.channel {
            let record_channel = record.channel.trim_end_matches('/');
            let same = record_channel == channel
                || record_channel.ends_with(&format!("/{}", channel));
            if !same {
                return false;
            }
        }

        if let Some(version) = &self.version
            && !version.matches_str(&record.version)
        {
            return false;
        }

        match &self.build {
            Some(build) if build.contains('*') => glob_match(build, &record.build),
            Some(build) => build == &record.build,
            None => true,
        }
    }
}

/// Split `name=1.2=b0`, `name==1.2`, `name>=1,<2` into its parts
fn parse_compact(token: &str) -> Result<(String, Option<VersionSpec>, Option<String>)> {
    let (name, rest) = match token.find(OPERATOR_CHARS) {
        Some(idx) => (&token[..idx], &token[idx..]),
        None => (token, ""),
    };

    if name.is_empty() {
        return Err(Error::ParseError(format!(
            "Missing package name in spec '{}'",
            token
        )));
    }
    let name = name.to_ascii_lowercase();

    if rest.is_empty() {
        return Ok((name, None, None));
    }

    if let Some(exact) = rest.strip_prefix("==") {
        return match exact.split_once('=') {
            Some((version, build)) if is_plain_version(version) => Ok((
                name,
                Some(VersionSpec::parse(&format!("=={}", version))?),
                Some(build.to_string()),
            )),
            _ => Ok((name, Some(VersionSpec::parse(rest)?), None)),
        };
    }

    if let Some(fuzzy) = rest.strip_prefix('=') {
        return match fuzzy.split_once('=') {
            // `name=1.2=b0` pins the version exactly as written
            Some((version, build)) if is_plain_version(version) => Ok((
                name,
                Some(VersionSpec::parse(version)?),
                Some(build.to_string()),
            )),
            _ => Ok((name, Some(VersionSpec::parse(rest)?), None)),
        };
    }

    Ok((name, Some(VersionSpec::parse(rest)?), None))
}

fn is_plain_version(s: &str) -> bool {
    !s.contains([',', '|', '<', '>', '!', '~'])
}

/// Split a trailing `[key=value, ...]` block off a spec
fn split_brackets(s: &str) -> Result<(&str, Vec<(String, String)>)> {
    let Some(open) = s.find('[') else {
        return Ok((s, Vec::new()));
    };
    let inner = s[open + 1..]
        .trim_end()
        .strip_suffix(']')
        .ok_or_else(|| Error::ParseError(format!("Unclosed bracket in spec '{}'", s)))?;

    let mut pairs = Vec::new();
    for item in split_unquoted(inner) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let (key, value) = item.split_once('=').ok_or_else(|| {
            Error::ParseError(format!("Expected key=value in bracket of '{}'", s))
        })?;
        let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
        pairs.push((key.trim().to_ascii_lowercase(), value.to_string()));
    }

    Ok((&s[..open], pairs))
}

/// Split on commas that are not inside quotes
fn split_unquoted(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            (None, ',') => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn glob_match(pattern: &str, value: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(value))
        .unwrap_or(false)
}

impl fmt::Display for MatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(channel) = &self.channel {
            write!(f, "{}::", channel)?;
        }
        write!(f, "{}", self.name)?;

        let version = self.version.as_ref().map(|v| v.to_string());
        match (&version, &self.build) {
            (Some(v), _) if v.starts_with(OPERATOR_CHARS) => write!(f, "{}", v)?,
            (Some(v), _) => write!(f, " {}", v)?,
            (None, Some(_)) => write!(f, " *")?,
            (None, None) => {}
        }
        if let Some(build) = &self.build {
            write!(f, " {}", build)?;
        }
        Ok(())
    }
}

impl FromStr for MatchSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MatchSpec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<MatchSpec> for String {
    fn from(spec: MatchSpec) -> Self {
        spec.to_string()
    }
}
