// src/resolver/neuter.rs

//! Relaxing over-constrained historical specs
//!
//! A fully specified history spec (name, version and build) that keeps
//! conflicting is widened so the next attempt has room to move:
//!
//! - `==1.2.3` → `1.2.3` (equal or prefix)
//! - `1.2.3` → `1.2.3.*`
//! - `!=`, `>`, `>=`, `<`, `<=`, prefix, compound and `~=` versions stay
//! - no version → name only
//!
//! Channel and build are always dropped, so the result matches every
//! record the original matched.

use crate::spec::MatchSpec;
use crate::version::VersionSpec;

/// Widen `spec`; the input is left untouched
pub fn neuter(spec: &MatchSpec) -> MatchSpec {
    let version = spec.version.as_ref().and_then(|version| match version {
        VersionSpec::Any => None,
        VersionSpec::Exact(v) => Some(VersionSpec::Bare(v.clone())),
        VersionSpec::Bare(v) => Some(VersionSpec::Prefix(v.clone())),
        other => Some(other.clone()),
    });

    MatchSpec {
        name: spec.name.clone(),
        channel: None,
        version,
        build: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::PackageRecord;

    fn neutered(s: &str) -> String {
        neuter(&MatchSpec::parse(s).unwrap()).to_string()
    }

    #[test]
    fn test_exact_becomes_bare() {
        assert_eq!(neutered("python==3.9.0 b0"), "python 3.9.0");
    }

    #[test]
    fn test_bare_becomes_prefix() {
        assert_eq!(neutered("numpy 1.26.4 py312_0"), "numpy 1.26.4.*");
        assert_eq!(neutered("conda-forge::numpy=1.26.4=py312_0"), "numpy 1.26.4.*");
    }

    #[test]
    fn test_operators_kept() {
        assert_eq!(neutered("openssl >=3.0 h0_0"), "openssl>=3.0");
        assert_eq!(neutered("openssl !=3.0.1 h0_0"), "openssl!=3.0.1");
        assert_eq!(neutered("openssl <4 h0_0"), "openssl<4");
        assert_eq!(neutered("openssl 3.0.* h0_0"), "openssl 3.0.*");
        assert_eq!(neutered("openssl >=3,<4 h0_0"), "openssl>=3,<4");
    }

    #[test]
    fn test_no_version_becomes_name_only() {
        assert_eq!(neutered("zlib * h0_0"), "zlib");
    }

    #[test]
    fn test_input_not_mutated() {
        let original = MatchSpec::parse("python==3.9.0 b0").unwrap();
        let copy = original.clone();
        let _ = neuter(&original);
        assert_eq!(original, copy);
    }

    #[test]
    fn test_neutering_only_widens() {
        let candidates = [
            ("3.9.0", "b0"),
            ("3.9.0", "b1"),
            ("3.9.0.1", "b0"),
            ("3.9.1", "b0"),
            ("3.10.0", "b0"),
            ("3.8.0", "b0"),
        ];
        let specs = [
            "python==3.9.0 b0",
            "python 3.9.0 b0",
            "python >=3.9 b0",
            "python 3.9.* b*",
            "python * b0",
        ];
        for spec in specs {
            let original = MatchSpec::parse(spec).unwrap();
            let relaxed = neuter(&original);
            for (version, build) in candidates {
                let record = PackageRecord::new("python", version, build);
                if original.matches(&record) {
                    assert!(relaxed.matches(&record), "{} lost {}-{}", spec, version, build);
                }
            }
        }
    }
}
