//! Typed view of the records a package differ writes to its JSON output.
//!
//! Package comparisons keep their payload typed so that layer paths can be folded away;
//! every other record is carried as an opaque JSON object and written back untouched.

use indexmap::IndexMap;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::SerializeMap,
};
use serde_json::{Map, Value};

pub const DIFF_TYPE_KEY: &str = "DiffType";
pub const DIFF_KEY: &str = "Diff";
pub const PACKAGES1_KEY: &str = "Packages1";
pub const PACKAGES2_KEY: &str = "Packages2";
/// Differ whose packages may be installed at several layer paths at once.
pub const NODE_DIFFER: &str = "NodeDiffer";

/// Version and size reported for one package at one layer path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageInfo {
    pub version: String,
    pub size: i64,
}

/// Layer path -> package info.
pub type PathMap = IndexMap<String, PackageInfo>;
/// Version -> size.
pub type VersionMap = IndexMap<String, i64>;
/// Package name -> per-package entry.
pub type PackageMap<P> = IndexMap<String, P>;

/// What a fixture holds for a single package.
///
/// Fresh differ output is keyed by layer path. A fixture that has already been through the
/// normalizer is keyed by version with bare integer sizes, which is recognised here so a second
/// pass leaves it alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PackageVersions {
    Layered(PathMap),
    Collapsed(VersionMap),
}

impl<'de> Deserialize<'de> for PackageVersions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = IndexMap::<String, Value>::deserialize(deserializer)?;
        if !entries.is_empty() && entries.values().all(|entry| entry.as_i64().is_some()) {
            let versions = entries
                .into_iter()
                .filter_map(|(version, size)| size.as_i64().map(|size| (version, size)))
                .collect();
            return Ok(Self::Collapsed(versions));
        }

        let mut paths = PathMap::with_capacity(entries.len());
        for (path, entry) in entries {
            let info: PackageInfo = serde_json::from_value(entry)
                .map_err(|err| {
                    D::Error::custom(format_args!(
                        "layer path `{path}` needs a string `Version` and an integer `Size`: {err}"
                    ))
                })?;
            paths.insert(path, info);
        }
        Ok(Self::Layered(paths))
    }
}

/// Payload of a package comparison record.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDiff<P> {
    pub packages1: PackageMap<P>,
    pub packages2: PackageMap<P>,
    /// The payload as read. The `Packages1`/`Packages2` slots only mark where the typed maps
    /// are written back; `InfoDiff` and anything else the differ emitted pass through.
    pub payload: Map<String, Value>,
}

impl PackageDiff<PackageVersions> {
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        let mut payload: Map<String, Value> = serde_json::from_value(payload)?;
        let packages1 = take_packages(&mut payload, PACKAGES1_KEY)?;
        let packages2 = take_packages(&mut payload, PACKAGES2_KEY)?;
        Ok(Self {
            packages1,
            packages2,
            payload,
        })
    }
}

fn take_packages(
    payload: &mut Map<String, Value>,
    key: &'static str,
) -> Result<PackageMap<PackageVersions>, serde_json::Error> {
    // `take` leaves a null behind so the map is written back at its original position.
    let slot = payload
        .get_mut(key)
        .ok_or_else(|| serde_json::Error::missing_field(key))?;
    serde_json::from_value(slot.take())
        .map_err(|err| serde_json::Error::custom(format_args!("`{key}`: {err}")))
}

impl<P> PackageDiff<P> {
    /// Swap the per-package entries while keeping the rest of the payload.
    pub fn map_packages<Q>(
        self,
        mut f: impl FnMut(&PackageMap<P>) -> PackageMap<Q>,
    ) -> PackageDiff<Q> {
        PackageDiff {
            packages1: f(&self.packages1),
            packages2: f(&self.packages2),
            payload: self.payload,
        }
    }
}

impl<P: Serialize> Serialize for PackageDiff<P> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.payload.len()))?;
        for (key, value) in &self.payload {
            match key.as_str() {
                PACKAGES1_KEY => map.serialize_entry(key, &self.packages1)?,
                PACKAGES2_KEY => map.serialize_entry(key, &self.packages2)?,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}

/// One element of the top-level diff array.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffRecord<P> {
    /// A package comparison. `envelope` is the original record; its `Diff` slot only marks
    /// where `diff` is written back.
    Packages {
        envelope: Map<String, Value>,
        diff: PackageDiff<P>,
    },
    Opaque(Map<String, Value>),
}

impl<P> DiffRecord<P> {
    pub fn diff_type(&self) -> Option<&str> {
        let fields = match self {
            Self::Packages { envelope, .. } => envelope,
            Self::Opaque(fields) => fields,
        };
        fields.get(DIFF_TYPE_KEY).and_then(Value::as_str)
    }

    pub fn is_packages(&self) -> bool {
        matches!(self, Self::Packages { .. })
    }
}

impl<P: Serialize> Serialize for DiffRecord<P> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Packages { envelope, diff } => {
                let mut map = serializer.serialize_map(Some(envelope.len()))?;
                for (key, value) in envelope {
                    if key == DIFF_KEY {
                        map.serialize_entry(key, diff)?;
                    } else {
                        map.serialize_entry(key, value)?;
                    }
                }
                map.end()
            }
            Self::Opaque(fields) => fields.serialize(serializer),
        }
    }
}
