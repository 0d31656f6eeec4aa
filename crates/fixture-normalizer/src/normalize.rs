use serde::Serialize;
use serde_json::{Map, Value, ser::PrettyFormatter};
use tracing::debug;

use crate::error::{DocumentError, SchemaError};
use crate::model::{
    DIFF_KEY, DIFF_TYPE_KEY, DiffRecord, NODE_DIFFER, PACKAGES1_KEY, PACKAGES2_KEY, PackageDiff,
    PackageMap, PackageVersions, VersionMap,
};

/// Knobs for classifying and rendering a diff document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// `DiffType` tags whose payload carries per-layer package maps.
    pub diff_types: Vec<String>,
    pub indent: usize,
    pub trailing_newline: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            diff_types: vec![NODE_DIFFER.to_string()],
            indent: 4,
            trailing_newline: false,
        }
    }
}

impl NormalizeOptions {
    fn collapses(&self, diff_type: &str) -> bool {
        self.diff_types.iter().any(|candidate| candidate == diff_type)
    }
}

/// Replace every package's layer-path map with a version -> size map.
///
/// Paths are visited in document order, so when two layers report the same version the size
/// from the later one is kept.
pub fn collapse_paths(packages: &PackageMap<PackageVersions>) -> PackageMap<VersionMap> {
    packages
        .iter()
        .map(|(name, versions)| {
            let collapsed = match versions {
                PackageVersions::Layered(paths) => paths
                    .values()
                    .map(|info| (info.version.clone(), info.size))
                    .collect(),
                PackageVersions::Collapsed(versions) => versions.clone(),
            };
            (name.clone(), collapsed)
        })
        .collect()
}

/// Split the top-level array into typed records.
pub fn parse_records(
    document: Value,
    options: &NormalizeOptions,
) -> Result<Vec<DiffRecord<PackageVersions>>, SchemaError> {
    let items = match document {
        Value::Array(items) => items,
        other => {
            return Err(SchemaError::NotAnArray {
                found: kind_of(&other),
            });
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| classify(index, item, options))
        .collect()
}

fn classify(
    index: usize,
    item: Value,
    options: &NormalizeOptions,
) -> Result<DiffRecord<PackageVersions>, SchemaError> {
    let Value::Object(mut envelope) = item else {
        return Err(SchemaError::NotAnObject { index });
    };
    let diff_type = match envelope.get(DIFF_TYPE_KEY) {
        None => return Err(SchemaError::MissingDiffType { index }),
        Some(Value::String(tag)) if options.collapses(tag) => tag.clone(),
        Some(_) => return Ok(DiffRecord::Opaque(envelope)),
    };

    // `take` leaves a null behind so the payload is written back at its original position.
    let payload = envelope
        .get_mut(DIFF_KEY)
        .map(Value::take)
        .ok_or_else(|| SchemaError::MissingDiff {
            index,
            diff_type: diff_type.clone(),
        })?;
    let diff = PackageDiff::from_payload(payload).map_err(|source| SchemaError::Payload {
        index,
        diff_type,
        source,
    })?;
    Ok(DiffRecord::Packages { envelope, diff })
}

/// Fold layer paths out of every package record; other records pass through.
pub fn collapse_records(records: Vec<DiffRecord<PackageVersions>>) -> Vec<DiffRecord<VersionMap>> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            if record.is_packages() {
                debug!(
                    index,
                    diff_type = record.diff_type().unwrap_or_default(),
                    "collapsing layer paths"
                );
            }
            match record {
                DiffRecord::Packages { envelope, diff } => DiffRecord::Packages {
                    envelope,
                    diff: diff.map_packages(collapse_paths),
                },
                DiffRecord::Opaque(fields) => DiffRecord::Opaque(fields),
            }
        })
        .collect()
}

/// Result of normalizing one document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub records: usize,
    pub package_records: usize,
}

/// Parse, collapse and render a whole document.
pub fn normalize_str(text: &str, options: &NormalizeOptions) -> Result<Normalized, DocumentError> {
    let document: Value = serde_json::from_str(text).map_err(DocumentError::Parse)?;
    let records = collapse_records(parse_records(document, options)?);
    let package_records = records.iter().filter(|record| record.is_packages()).count();
    let text = render(&records, options).map_err(DocumentError::Render)?;
    Ok(Normalized {
        text,
        records: records.len(),
        package_records,
    })
}

/// Pure document-level transform over an already parsed value.
pub fn normalize_value(document: Value, options: &NormalizeOptions) -> Result<Value, SchemaError> {
    let records = collapse_records(parse_records(document, options)?);
    Ok(Value::Array(
        records.into_iter().map(record_into_value).collect(),
    ))
}

fn record_into_value(record: DiffRecord<VersionMap>) -> Value {
    match record {
        DiffRecord::Packages { mut envelope, diff } => {
            let mut payload = diff.payload;
            payload.insert(PACKAGES1_KEY.into(), versions_to_value(diff.packages1));
            payload.insert(PACKAGES2_KEY.into(), versions_to_value(diff.packages2));
            envelope.insert(DIFF_KEY.into(), Value::Object(payload));
            Value::Object(envelope)
        }
        DiffRecord::Opaque(fields) => Value::Object(fields),
    }
}

fn versions_to_value(packages: PackageMap<VersionMap>) -> Value {
    packages
        .into_iter()
        .map(|(name, versions)| {
            let versions = versions
                .into_iter()
                .map(|(version, size)| (version, Value::from(size)))
                .collect::<Map<_, _>>();
            (name, Value::Object(versions))
        })
        .collect::<Map<_, _>>()
        .into()
}

/// Serialize with `indent` spaces per level. Empty containers stay `{}`/`[]` and no trailing
/// newline is written unless asked for, which is the layout existing golden files use.
pub fn render<T: Serialize + ?Sized>(
    value: &T,
    options: &NormalizeOptions,
) -> Result<String, serde_json::Error> {
    let indent = " ".repeat(options.indent);
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    if options.trailing_newline {
        out.push(b'\n');
    }
    // serde_json only ever writes UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PackageInfo, PathMap};
    use serde_json::json;

    fn node_record(packages1: Value, packages2: Value) -> Value {
        json!({
            "Image1": "gcr.io/example/node:old",
            "Image2": "gcr.io/example/node:new",
            "DiffType": "NodeDiffer",
            "Diff": {
                "Packages1": packages1,
                "Packages2": packages2,
                "InfoDiff": []
            }
        })
    }

    fn normalize(document: Value) -> Value {
        normalize_value(document, &NormalizeOptions::default()).expect("normalize")
    }

    #[test]
    fn empty_document_stays_empty() {
        assert_eq!(normalize(json!([])), json!([]));
    }

    #[test]
    fn other_differs_pass_through() {
        let input = json!([{"DiffType": "Other", "Diff": {"x": 1}}]);
        assert_eq!(normalize(input.clone()), input);
    }

    #[test]
    fn single_path_collapses_to_version() {
        let out = normalize(json!([node_record(
            json!({"foo": {"/layerA": {"Version": "1.0", "Size": 100}}}),
            json!({})
        )]));
        assert_eq!(out[0]["Diff"]["Packages1"], json!({"foo": {"1.0": 100}}));
        assert_eq!(out[0]["Diff"]["Packages2"], json!({}));
        assert_eq!(out[0]["Diff"]["InfoDiff"], json!([]));
    }

    #[test]
    fn diff_keys_keep_their_positions() {
        let out = normalize(json!([{
            "DiffType": "NodeDiffer",
            "Diff": {
                "InfoDiff": [],
                "Packages2": {"foo": {"/a": {"Version": "1.0", "Size": 1}}},
                "Packages1": {}
            }
        }]));
        let keys: Vec<_> = out[0]["Diff"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["InfoDiff", "Packages2", "Packages1"]);
        assert_eq!(out[0]["Diff"]["Packages2"], json!({"foo": {"1.0": 1}}));
    }

    #[test]
    fn duplicate_version_keeps_last_layer_size() {
        let out = normalize(json!([node_record(
            json!({"foo": {
                "/a": {"Version": "1.0", "Size": 100},
                "/b": {"Version": "1.0", "Size": 200}
            }}),
            json!({"foo": {
                "/b": {"Version": "1.0", "Size": 200},
                "/a": {"Version": "1.0", "Size": 100}
            }})
        )]));
        assert_eq!(out[0]["Diff"]["Packages1"], json!({"foo": {"1.0": 200}}));
        assert_eq!(out[0]["Diff"]["Packages2"], json!({"foo": {"1.0": 100}}));
    }

    #[test]
    fn distinct_versions_are_all_kept() {
        let out = normalize(json!([node_record(
            json!({}),
            json!({"foo": {
                "/a": {"Version": "1.0", "Size": 100},
                "/b": {"Version": "2.0", "Size": 150}
            }})
        )]));
        assert_eq!(
            out[0]["Diff"]["Packages2"],
            json!({"foo": {"1.0": 100, "2.0": 150}})
        );
    }

    #[test]
    fn collapse_paths_preserves_package_names() {
        let packages = PackageMap::from([
            (
                "express".to_string(),
                PackageVersions::Layered(PathMap::from([(
                    "/usr/lib/node_modules/express".to_string(),
                    PackageInfo {
                        version: "4.16.2".into(),
                        size: 4096,
                    },
                )])),
            ),
            ("left-pad".to_string(), PackageVersions::Layered(PathMap::new())),
        ]);
        let collapsed = collapse_paths(&packages);
        assert_eq!(
            collapsed.keys().collect::<Vec<_>>(),
            packages.keys().collect::<Vec<_>>()
        );
        assert_eq!(collapsed["express"]["4.16.2"], 4096);
        assert!(collapsed["left-pad"].is_empty());
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let once = normalize(json!([
            {"DiffType": "Apt", "Diff": {"Packages1": {"x": {"Version": "1", "Size": 1}}}},
            node_record(
                json!({"foo": {"/a": {"Version": "1.0", "Size": 100}}, "bar": {}}),
                json!({"foo": {"/b": {"Version": "2.0", "Size": 150}}})
            )
        ]));
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn record_without_diff_type_is_rejected() {
        let err = normalize_value(json!([{"Diff": {}}]), &NormalizeOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchemaError::MissingDiffType { index: 0 }));
    }

    #[test]
    fn non_string_diff_type_passes_through() {
        let input = json!([{"DiffType": 7, "Diff": null}]);
        assert_eq!(normalize(input.clone()), input);
    }

    #[test]
    fn node_record_without_diff_is_rejected() {
        let err = normalize_value(
            json!([{"DiffType": "Other"}, {"DiffType": "NodeDiffer"}]),
            &NormalizeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MissingDiff { index: 1, .. }));
    }

    #[test]
    fn missing_packages2_names_the_field() {
        let err = normalize_value(
            json!([{"DiffType": "NodeDiffer", "Diff": {"Packages1": {}}}]),
            &NormalizeOptions::default(),
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("Packages2"),
            "expected missing Packages2, got {err}"
        );
    }

    #[test]
    fn missing_version_names_the_field() {
        let err = normalize_value(
            json!([node_record(json!({"foo": {"/a": {"Size": 1}}}), json!({}))]),
            &NormalizeOptions::default(),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Version"), "{message}");
        assert!(message.contains("/a"), "{message}");
    }

    #[test]
    fn top_level_object_is_rejected() {
        let err = normalize_value(json!({"DiffType": "NodeDiffer"}), &NormalizeOptions::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "top-level value must be an array of diff records, found an object"
        );
    }

    #[test]
    fn configured_diff_types_are_collapsed() {
        let options = NormalizeOptions {
            diff_types: vec!["PipDiffer".into()],
            ..NormalizeOptions::default()
        };
        let input = json!([
            node_record(json!({"foo": {"/a": {"Version": "1.0", "Size": 1}}}), json!({})),
            {
                "DiffType": "PipDiffer",
                "Diff": {
                    "Packages1": {"six": {"/py2": {"Version": "1.11", "Size": 9}}},
                    "Packages2": {}
                }
            }
        ]);
        let out = normalize_value(input.clone(), &options).unwrap();
        assert_eq!(out[0], input[0]);
        assert_eq!(out[1]["Diff"]["Packages1"], json!({"six": {"1.11": 9}}));
    }

    #[test]
    fn normalize_str_counts_records() {
        let text = serde_json::to_string(&json!([
            {"DiffType": "History", "Diff": {"Adds": [], "Dels": []}},
            node_record(json!({"foo": {"/a": {"Version": "1.0", "Size": 100}}}), json!({}))
        ]))
        .unwrap();
        let normalized = normalize_str(&text, &NormalizeOptions::default()).unwrap();
        assert_eq!(normalized.records, 2);
        assert_eq!(normalized.package_records, 1);
        let reparsed: Value = serde_json::from_str(&normalized.text).unwrap();
        assert_eq!(reparsed[1]["Diff"]["Packages1"], json!({"foo": {"1.0": 100}}));
    }

    #[test]
    fn normalize_str_rejects_invalid_json() {
        let err = normalize_str("[{", &NormalizeOptions::default()).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)), "{err}");
    }

    #[test]
    fn render_uses_configured_indent() {
        let options = NormalizeOptions {
            indent: 2,
            trailing_newline: true,
            ..NormalizeOptions::default()
        };
        let rendered = render(&json!([{"a": 1}]), &options).unwrap();
        assert_eq!(rendered, "[\n  {\n    \"a\": 1\n  }\n]\n");
    }
}
