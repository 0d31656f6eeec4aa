//! Keeps package diff fixtures stable by folding layer paths out of them.
//!
//! A package differ reports every install of a package keyed by the image layer path it was
//! found under. Those paths change between image builds, so golden files keyed by them churn.
//! This crate rewrites each package's `{path: {Version, Size}}` map into `{version: size}` and
//! leaves every other record alone.

pub mod config;
pub mod error;
pub mod fixtures;
pub mod model;
pub mod normalize;

pub use config::NormalizerConfig;
pub use error::{DocumentError, NormalizeError, SchemaError};
pub use fixtures::{
    CheckOutcome, NormalizeOutcome, check, discover_fixtures, normalize, normalize_with,
};
pub use model::{DiffRecord, PackageDiff, PackageInfo, PackageVersions, PathMap, VersionMap};
pub use normalize::{
    NormalizeOptions, Normalized, collapse_paths, normalize_str, normalize_value, render,
};
