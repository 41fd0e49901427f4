//! Validation and defaulting of ZookeeperCluster specs.
//!
//! This module provides:
//! - Defaulting (repository, version, leading "v" trimmed)
//! - Size validation
//! - Version validation (semver)
//! - Reserved pod label checks

use crate::controller::error::{Error, Result};
use crate::crd::{DEFAULT_REPOSITORY, DEFAULT_ZOOKEEPER_VERSION, ZookeeperClusterSpec};

/// Minimum ensemble size
pub const MIN_SIZE: i32 = 1;

/// Prefix of label keys reserved for the operator.
const RESERVED_LABEL_PREFIX: &str = "zookeeper_";

/// Fill in defaults and normalize user input.
pub fn apply_defaults(spec: &mut ZookeeperClusterSpec) {
    if spec.repository.is_empty() {
        spec.repository = DEFAULT_REPOSITORY.to_string();
    }
    if spec.version.is_empty() {
        spec.version = DEFAULT_ZOOKEEPER_VERSION.to_string();
    }
    spec.version = spec.version.trim_start_matches('v').to_string();
}

/// Validate the cluster spec
pub fn validate_spec(spec: &ZookeeperClusterSpec) -> Result<()> {
    validate_size(spec)?;
    validate_version(spec)?;
    validate_pod_labels(spec)?;
    Ok(())
}

fn validate_size(spec: &ZookeeperClusterSpec) -> Result<()> {
    if spec.size < MIN_SIZE {
        return Err(Error::Validation(format!(
            "size {} is below minimum {}",
            spec.size, MIN_SIZE
        )));
    }
    Ok(())
}

fn validate_version(spec: &ZookeeperClusterSpec) -> Result<()> {
    semver::Version::parse(&spec.version).map_err(|e| {
        Error::Validation(format!("version {:?} is not a semantic version: {}", spec.version, e))
    })?;
    Ok(())
}

fn validate_pod_labels(spec: &ZookeeperClusterSpec) -> Result<()> {
    let Some(pod) = &spec.pod else {
        return Ok(());
    };
    for key in pod.labels.keys() {
        if key == "app" || key.starts_with(RESERVED_LABEL_PREFIX) {
            return Err(Error::Validation(format!(
                "pod label {:?} is reserved",
                key
            )));
        }
    }
    Ok(())
}
