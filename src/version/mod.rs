// src/version/mod.rs

//! Version handling and constraint satisfaction for conda packages
//!
//! Conda versions are compared component by component. Each dot, underscore
//! or dash separated component is split into numeric and alphabetic runs:
//!
//! - `1.1dev1 < 1.1a1 < 1.1rc1 < 1.1 < 1.1.post1`
//! - `1.1 == 1.1.0` (missing components compare as zero)
//! - `2!1.0 > 3.0` (epoch wins)
//!
//! A [`VersionSpec`] is the version part of a match spec (`3.9.*`, `>=1.2,<2`,
//! `==1.0`, ...).

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One run inside a version component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    /// `dev` sorts below every other run
    Dev,
    Str(String),
    Num(u64),
    /// `post` sorts above every other run
    Post,
}

const ZERO: Segment = Segment::Num(0);

/// A parsed conda version
#[derive(Debug, Clone)]
pub struct CondaVersion {
    source: String,
    epoch: u64,
    components: Vec<Vec<Segment>>,
    local: Vec<Vec<Segment>>,
}

impl CondaVersion {
    /// Parse a conda version string
    ///
    /// Format: `[epoch!]version[+local]`
    /// Examples:
    /// - "3.9.0" → components [3] [9] [0]
    /// - "1!2.0" → epoch 1
    /// - "1.0rc1" → components [1] [0 rc 1]
    /// - "0.0.0dev0" → components [0] [0] [0 dev 0]
    pub fn parse(s: &str) -> Result<Self> {
        let source = s.trim();
        if source.is_empty() {
            return Err(Error::ParseError("Empty version string".to_string()));
        }

        if let Some(bad) = source
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '!' | '+')))
        {
            return Err(Error::ParseError(format!(
                "Invalid character '{}' in version '{}'",
                bad, source
            )));
        }

        let lower = source.to_ascii_lowercase();
        let (epoch, rest) = match lower.split_once('!') {
            Some((epoch, rest)) => {
                let epoch = epoch.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!("Invalid epoch in version '{}': {}", source, e))
                })?;
                (epoch, rest.to_string())
            }
            None => (0, lower),
        };

        let (public, local) = match rest.split_once('+') {
            Some((public, local)) => (public.to_string(), Some(local.to_string())),
            None => (rest, None),
        };

        let components = split_components(&public);
        if components.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                source
            )));
        }

        Ok(Self {
            source: source.to_string(),
            epoch,
            components,
            local: local.map(|l| split_components(&l)).unwrap_or_default(),
        })
    }

    /// The version as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of public components (`3.9.0` has three)
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Check whether this version lies inside the prefix range of `prefix`
    ///
    /// `3.9.7` starts with `3.9`, `3.10` does not.
    pub fn starts_with(&self, prefix: &CondaVersion) -> bool {
        if self.epoch != prefix.epoch {
            return false;
        }

        let zero_component = vec![ZERO];
        for (i, expected) in prefix.components.iter().enumerate() {
            let actual = self.components.get(i).unwrap_or(&zero_component);
            let last = i + 1 == prefix.components.len();
            if last {
                // The final prefix component only has to lead the actual one
                for (j, seg) in expected.iter().enumerate() {
                    let got = actual.get(j).unwrap_or(&ZERO);
                    if got != seg {
                        return false;
                    }
                }
            } else if compare_component(actual, expected) != Ordering::Equal {
                return false;
            }
        }
        true
    }

    /// The first `n` public components as a new version (`3.9.0` → `3.9`)
    pub fn truncated(&self, n: usize) -> CondaVersion {
        let n = n.min(self.components.len());
        let source = self
            .source
            .split(['.', '_', '-'])
            .take(n.max(1))
            .collect::<Vec<_>>()
            .join(".");
        CondaVersion {
            source,
            epoch: self.epoch,
            components: self.components[..n].to_vec(),
            local: Vec::new(),
        }
    }

    /// Compare two conda versions
    pub fn compare(&self, other: &CondaVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_components(&self.components, &other.components))
            .then_with(|| compare_components(&self.local, &other.local))
    }

    fn normalized(components: &[Vec<Segment>]) -> Vec<Vec<Segment>> {
        let mut out: Vec<Vec<Segment>> = components
            .iter()
            .map(|c| {
                let mut c = c.clone();
                while c.last() == Some(&ZERO) {
                    c.pop();
                }
                c
            })
            .collect();
        while out.last().is_some_and(|c| c.is_empty()) {
            out.pop();
        }
        out
    }
}

fn split_components(s: &str) -> Vec<Vec<Segment>> {
    s.split(['.', '_', '-'])
        .filter(|c| !c.is_empty())
        .map(split_runs)
        .collect()
}

fn split_runs(component: &str) -> Vec<Segment> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut numeric = None;

    for c in component.chars() {
        let is_digit = c.is_ascii_digit();
        if numeric.is_some_and(|n| n != is_digit) {
            runs.push(to_segment(&current, numeric == Some(true)));
            current.clear();
        }
        numeric = Some(is_digit);
        current.push(c);
    }
    if !current.is_empty() {
        runs.push(to_segment(&current, numeric == Some(true)));
    }

    // Components that start with letters get an implicit leading zero
    if matches!(runs.first(), Some(seg) if !matches!(seg, Segment::Num(_))) {
        runs.insert(0, ZERO);
    }
    runs
}

fn to_segment(run: &str, numeric: bool) -> Segment {
    if numeric {
        // Digit runs longer than u64 saturate; real versions never get there
        return Segment::Num(run.parse().unwrap_or(u64::MAX));
    }
    match run {
        "dev" => Segment::Dev,
        "post" => Segment::Post,
        other => Segment::Str(other.to_string()),
    }
}

fn compare_component(a: &[Segment], b: &[Segment]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).unwrap_or(&ZERO);
        let right = b.get(i).unwrap_or(&ZERO);
        match left.cmp(right) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

fn compare_components(a: &[Vec<Segment>], b: &[Vec<Segment>]) -> Ordering {
    let zero = vec![ZERO];
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).unwrap_or(&zero);
        let right = b.get(i).unwrap_or(&zero);
        match compare_component(left, right) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

impl fmt::Display for CondaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl FromStr for CondaVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for CondaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for CondaVersion {}

impl Hash for CondaVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        format!("{:?}", Self::normalized(&self.components)).hash(state);
        format!("{:?}", Self::normalized(&self.local)).hash(state);
    }
}

impl Ord for CondaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for CondaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Version constraint of a match spec
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    /// Any version is acceptable (`*`)
    Any,
    /// Exact version match (`==1.2`)
    Exact(CondaVersion),
    /// Equal to or inside the prefix range of the version (`1.2`)
    Bare(CondaVersion),
    /// Prefix match (`1.2.*`, `1.2*`, `=1.2`)
    Prefix(CondaVersion),
    /// Compatible release (`~=1.2.3` means `>=1.2.3,1.2.*`)
    Compatible(CondaVersion),
    /// Not equal (`!=1.2`)
    NotEqual(CondaVersion),
    /// Greater than
    GreaterThan(CondaVersion),
    /// Greater than or equal
    GreaterOrEqual(CondaVersion),
    /// Less than
    LessThan(CondaVersion),
    /// Less than or equal
    LessOrEqual(CondaVersion),
    /// Every constraint must be satisfied (`>=1.0,<2.0`)
    And(Vec<VersionSpec>),
    /// At least one constraint must be satisfied (`1.0|2.0`)
    Or(Vec<VersionSpec>),
}

impl VersionSpec {
    /// Parse a version spec string
    ///
    /// Examples:
    /// - "*" → Any
    /// - "3.9.*" → Prefix(3.9)
    /// - "==3.9.0" → Exact(3.9.0)
    /// - ">=1.0,<2.0" → And(GreaterOrEqual, LessThan)
    /// - "1.0|2.0" → Or(Bare, Bare)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionSpec::Any);
        }

        // `|` binds weaker than `,`
        if s.contains('|') {
            let parts = s
                .split('|')
                .map(Self::parse)
                .collect::<Result<Vec<_>>>()?;
            return Ok(VersionSpec::Or(parts));
        }

        if s.contains(',') {
            let parts = s
                .split(',')
                .map(Self::parse)
                .collect::<Result<Vec<_>>>()?;
            return Ok(VersionSpec::And(parts));
        }

        let operand = |rest: &str| -> Result<CondaVersion> {
            let rest = rest.trim();
            CondaVersion::parse(rest.strip_suffix(".*").unwrap_or(rest))
        };

        if let Some(rest) = s.strip_prefix("==") {
            Ok(VersionSpec::Exact(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionSpec::NotEqual(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionSpec::GreaterOrEqual(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionSpec::LessOrEqual(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix("~=") {
            Ok(VersionSpec::Compatible(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionSpec::GreaterThan(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionSpec::LessThan(operand(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionSpec::Prefix(parse_prefix(rest)?))
        } else if s.ends_with('*') {
            Ok(VersionSpec::Prefix(parse_prefix(s)?))
        } else {
            Ok(VersionSpec::Bare(CondaVersion::parse(s)?))
        }
    }

    /// Check if a version satisfies this constraint
    pub fn matches(&self, version: &CondaVersion) -> bool {
        match self {
            VersionSpec::Any => true,
            VersionSpec::Exact(v) => version == v,
            VersionSpec::Bare(v) => version == v || version.starts_with(v),
            VersionSpec::Prefix(v) => version.starts_with(v),
            VersionSpec::Compatible(v) => {
                let floor = v.truncated(v.component_count().saturating_sub(1).max(1));
                version >= v && version.starts_with(&floor)
            }
            VersionSpec::NotEqual(v) => version != v,
            VersionSpec::GreaterThan(v) => version > v,
            VersionSpec::GreaterOrEqual(v) => version >= v,
            VersionSpec::LessThan(v) => version < v,
            VersionSpec::LessOrEqual(v) => version <= v,
            VersionSpec::And(parts) => parts.iter().all(|p| p.matches(version)),
            VersionSpec::Or(parts) => parts.iter().any(|p| p.matches(version)),
        }
    }

    /// Check a raw version string; unparseable versions never match
    pub fn matches_str(&self, version: &str) -> bool {
        match CondaVersion::parse(version) {
            Ok(v) => self.matches(&v),
            Err(_) => matches!(self, VersionSpec::Any),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, VersionSpec::Any)
    }
}

fn parse_prefix(s: &str) -> Result<CondaVersion> {
    let trimmed = s.trim().trim_end_matches('*').trim_end_matches('.');
    CondaVersion::parse(trimmed)
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Any => write!(f, "*"),
            VersionSpec::Exact(v) => write!(f, "=={}", v),
            VersionSpec::Bare(v) => write!(f, "{}", v),
            VersionSpec::Prefix(v) => write!(f, "{}.*", v),
            VersionSpec::Compatible(v) => write!(f, "~={}", v),
            VersionSpec::NotEqual(v) => write!(f, "!={}", v),
            VersionSpec::GreaterThan(v) => write!(f, ">{}", v),
            VersionSpec::GreaterOrEqual(v) => write!(f, ">={}", v),
            VersionSpec::LessThan(v) => write!(f, "<{}", v),
            VersionSpec::LessOrEqual(v) => write!(f, "<={}", v),
            VersionSpec::And(parts) => write!(f, "{}", join(parts, ",")),
            VersionSpec::Or(parts) => write!(f, "{}", join(parts, "|")),
        }
    }
}

fn join(parts: &[VersionSpec], sep: &str) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

impl FromStr for VersionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
