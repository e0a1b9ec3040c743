// src/packages/convert.rs

//! Conversion between host records and solver records
//!
//! The solver side keeps digests as raw bytes, sizes as optional values and
//! timestamps as real datetimes. Host records keep lowercase hex strings,
//! zero sizes and millisecond timestamps.

use super::{NoArchType, PackageRecord};
use crate::error::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A package record in solver schema
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SolverRecord {
    pub name: String,
    pub version: String,
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub subdir: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, with = "hex_bytes")]
    pub md5: Option<Vec<u8>>,
    #[serde(default, with = "hex_bytes")]
    pub sha256: Option<Vec<u8>>,
    #[serde(default, with = "hex_bytes")]
    pub legacy_bz2_md5: Option<Vec<u8>>,
    #[serde(default)]
    pub legacy_bz2_size: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub constrains: Vec<String>,
    #[serde(default)]
    pub noarch: NoArchType,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub license_family: Option<String>,
    #[serde(default)]
    pub track_features: Vec<String>,
    #[serde(default)]
    pub features: Option<String>,
}

/// Hex strings on the wire, bytes in memory
mod hex_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.is_empty() => hex::decode(&s).map(Some).map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}

fn decode_hash(name: &str, field: &str, value: &Option<String>) -> Result<Option<Vec<u8>>, Error> {
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(hex_str) => hex::decode(hex_str)
            .map(Some)
            .map_err(|e| Error::RecordConversion {
                name: name.to_string(),
                reason: format!("invalid {} '{}': {}", field, hex_str, e),
            }),
    }
}

fn split_features(features: &str) -> Vec<String> {
    features
        .split([' ', ','])
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

impl TryFrom<&PackageRecord> for SolverRecord {
    type Error = Error;

    fn try_from(record: &PackageRecord) -> Result<Self, Self::Error> {
        let timestamp = match record.timestamp {
            0 => None,
            ms => {
                let ms = i64::try_from(ms).map_err(|_| Error::RecordConversion {
                    name: record.name.clone(),
                    reason: format!("timestamp {} out of range", ms),
                })?;
                Some(Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                    Error::RecordConversion {
                        name: record.name.clone(),
                        reason: format!("timestamp {} out of range", ms),
                    }
                })?)
            }
        };

        Ok(Self {
            name: record.name.clone(),
            version: record.version.clone(),
            build: record.build.clone(),
            build_number: record.build_number,
            channel: record.channel.clone(),
            subdir: record.subdir.clone(),
            file_name: record.file_name.clone(),
            url: record.url.clone(),
            md5: decode_hash(&record.name, "md5", &record.md5)?,
            sha256: decode_hash(&record.name, "sha256", &record.sha256)?,
            legacy_bz2_md5: decode_hash(&record.name, "legacy_bz2_md5", &record.legacy_bz2_md5)?,
            legacy_bz2_size: record.legacy_bz2_size,
            size: (record.size != 0).then_some(record.size),
            depends: record.depends.clone(),
            constrains: record.constrains.clone(),
            noarch: record.noarch,
            timestamp,
            arch: record.arch.clone(),
            platform: record.platform.clone(),
            license: record.license.clone(),
            license_family: record.license_family.clone(),
            track_features: split_features(&record.track_features),
            features: (!record.features.is_empty()).then(|| record.features.clone()),
        })
    }
}

impl From<SolverRecord> for PackageRecord {
    fn from(record: SolverRecord) -> Self {
        let timestamp = record
            .timestamp
            .map(|t| u64::try_from(t.timestamp_millis()).unwrap_or(0))
            .unwrap_or(0);

        Self {
            name: record.name,
            version: record.version,
            build: record.build,
            build_number: record.build_number,
            channel: record.channel,
            subdir: record.subdir,
            file_name: record.file_name,
            url: record.url,
            md5: record.md5.map(hex::encode),
            sha256: record.sha256.map(hex::encode),
            legacy_bz2_md5: record.legacy_bz2_md5.map(hex::encode),
            legacy_bz2_size: record.legacy_bz2_size,
            size: record.size.unwrap_or(0),
            depends: record.depends,
            constrains: record.constrains,
            noarch: record.noarch,
            timestamp,
            arch: record.arch,
            platform: record.platform,
            license: record.license,
            license_family: record.license_family,
            track_features: record.track_features.join(" "),
            features: record.features.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_record() -> PackageRecord {
        PackageRecord {
            name: "zlib".to_string(),
            version: "1.3.1".to_string(),
            build: "h4ab18f5_1".to_string(),
            build_number: 1,
            channel: "https://conda.anaconda.org/conda-forge".to_string(),
            subdir: "linux-64".to_string(),
            file_name: "zlib-1.3.1-h4ab18f5_1.conda".to_string(),
            md5: Some("9653f1bf3766164d0e65fa723cabbc54".to_string()),
            sha256: Some(
                "cdd6a1e4b1ee1e3ef4e4a0c51ef3b7c8be6e0cf8f6c7fd8bd2c6a4c89a58d44a".to_string(),
            ),
            size: 93004,
            depends: vec!["libgcc-ng >=12".to_string()],
            timestamp: 1716874410000,
            track_features: "feat_a feat_b".to_string(),
            ..PackageRecord::default()
        }
    }

    #[test]
    fn test_convert_preserves_solving_fields() {
        let original = host_record();
        let solver = SolverRecord::try_from(&original).unwrap();
        assert_eq!(solver.md5.as_ref().map(Vec::len), Some(16));
        assert_eq!(solver.size, Some(93004));
        assert_eq!(solver.track_features, vec!["feat_a", "feat_b"]);
        assert_eq!(
            solver.timestamp.map(|t| t.timestamp_millis()),
            Some(1716874410000)
        );

        let back = PackageRecord::from(solver);
        assert_eq!(back, original);
    }

    #[test]
    fn test_convert_zero_means_absent() {
        let record = PackageRecord::new("tzdata", "2024a", "h0c530f3_0");
        let solver = SolverRecord::try_from(&record).unwrap();
        assert_eq!(solver.size, None);
        assert_eq!(solver.timestamp, None);
        assert_eq!(solver.md5, None);
    }

    #[test]
    fn test_convert_rejects_bad_hex() {
        let mut record = host_record();
        record.md5 = Some("not-hex".to_string());
        let err = SolverRecord::try_from(&record).unwrap_err();
        assert!(matches!(err, Error::RecordConversion { ref name, .. } if name == "zlib"));
    }

    #[test]
    fn test_uppercase_hex_is_lowered() {
        let mut record = host_record();
        record.md5 = Some("9653F1BF3766164D0E65FA723CABBC54".to_string());
        let back = PackageRecord::from(SolverRecord::try_from(&record).unwrap());
        assert_eq!(back.md5.as_deref(), Some("9653f1bf3766164d0e65fa723cabbc54"));
    }

    #[test]
    fn test_solver_record_json_uses_hex() {
        let solver = SolverRecord::try_from(&host_record()).unwrap();
        let json = serde_json::to_value(&solver).unwrap();
        assert_eq!(json["md5"], "9653f1bf3766164d0e65fa723cabbc54");
        let back: SolverRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, solver);
    }
}
