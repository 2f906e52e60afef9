//! Schema validation helpers for crystal JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(map, &["$schema", "pipeline", "store", "extract"], layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("pipeline") {
        validate_pipeline(value, layer, "pipeline")?;
    }
    if let Some(value) = map.get("store") {
        validate_store(value, layer, "store")?;
    }
    if let Some(value) = map.get("extract") {
        validate_extract(value, layer, "extract")?;
    }
    Ok(())
}

/// Validate the "pipeline" block.
fn validate_pipeline(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "default_compression_ratio",
            "stage_timeout_secs",
            "low_grounding_threshold",
            "continuation_prompt",
            "retention",
        ],
        layer,
        path,
    )?;

    if let Some(value) = map.get("default_compression_ratio") {
        expect_f64(value, layer, &join_path(path, "default_compression_ratio"))?;
    }
    if let Some(value) = map.get("stage_timeout_secs")
        && !value.is_null()
    {
        expect_u64(value, layer, &join_path(path, "stage_timeout_secs"))?;
    }
    if let Some(value) = map.get("low_grounding_threshold") {
        expect_f64(value, layer, &join_path(path, "low_grounding_threshold"))?;
    }
    if let Some(value) = map.get("continuation_prompt") {
        expect_string(value, layer, &join_path(path, "continuation_prompt"))?;
    }
    if let Some(value) = map.get("retention") {
        let retention_path = join_path(path, "retention");
        let retention = expect_object(value, layer, &retention_path)?;
        ensure_allowed_keys(retention, &["ttl_secs", "max_entries"], layer, &retention_path)?;
        if let Some(value) = retention.get("ttl_secs") {
            expect_u64(value, layer, &join_path(&retention_path, "ttl_secs"))?;
        }
        if let Some(value) = retention.get("max_entries") {
            expect_u64(value, layer, &join_path(&retention_path, "max_entries"))?;
        }
    }
    Ok(())
}

/// Validate the "store" block.
fn validate_store(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["enabled", "path"], layer, path)?;

    if let Some(value) = map.get("enabled") {
        expect_bool(value, layer, &join_path(path, "enabled"))?;
    }
    if let Some(value) = map.get("path")
        && !value.is_null()
    {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    Ok(())
}

/// Validate the "extract" block.
fn validate_extract(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["max_payload_bytes"], layer, path)?;

    if let Some(value) = map.get("max_payload_bytes") {
        expect_u64(value, layer, &join_path(path, "max_payload_bytes"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

/// Expect a JSON string or return a typed error.
fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_string() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

/// Expect a JSON boolean or return a typed error.
fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_boolean() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Expect a non-negative JSON integer or return a typed error.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected unsigned integer"))
    }
}

/// Expect a JSON number or return a typed error.
fn expect_f64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected number"))
    }
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

/// Join nested paths for better error messages.
fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
