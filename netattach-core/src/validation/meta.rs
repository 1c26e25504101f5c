use std::collections::BTreeMap;

use kube::core::ObjectMeta;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{ErrorList, FieldError, FieldPath};

pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
pub const QUALIFIED_NAME_MAX_LENGTH: usize = 63;
pub const LABEL_VALUE_MAX_LENGTH: usize = 63;
pub const TOTAL_ANNOTATION_SIZE_LIMIT: usize = 256 * 1024;

static DNS1123_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());
static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});
static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").unwrap());
static LABEL_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").unwrap());

pub fn is_dns1123_label(value: &str) -> bool {
    value.len() <= DNS1123_LABEL_MAX_LENGTH && DNS1123_LABEL.is_match(value)
}

pub fn is_dns1123_subdomain(value: &str) -> bool {
    value.len() <= DNS1123_SUBDOMAIN_MAX_LENGTH && DNS1123_SUBDOMAIN.is_match(value)
}

/// `prefix/name` or `name`, where prefix is a DNS subdomain.
pub fn is_qualified_name(value: &str) -> bool {
    let (prefix, name) = match value.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, value),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || !is_dns1123_subdomain(prefix) {
            return false;
        }
    }

    name.len() <= QUALIFIED_NAME_MAX_LENGTH && QUALIFIED_NAME.is_match(name)
}

pub fn is_label_value(value: &str) -> bool {
    value.len() <= LABEL_VALUE_MAX_LENGTH && LABEL_VALUE.is_match(value)
}

pub fn validate_object_meta(meta: &ObjectMeta, namespaced: bool, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();

    match meta.name.as_deref() {
        None | Some("") => errors.push(FieldError::required(
            path.child("name"),
            "name or generateName is required",
        )),
        Some(name) if !is_dns1123_subdomain(name) => errors.push(FieldError::invalid(
            path.child("name"),
            name,
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.'",
        )),
        Some(_) => {}
    }

    match (namespaced, meta.namespace.as_deref()) {
        (true, None | Some("")) => {
            errors.push(FieldError::required(path.child("namespace"), ""));
        }
        (true, Some(namespace)) if !is_dns1123_label(namespace) => {
            errors.push(FieldError::invalid(
                path.child("namespace"),
                namespace,
                "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-'",
            ));
        }
        (false, Some(namespace)) if !namespace.is_empty() => {
            errors.push(FieldError::forbidden(
                path.child("namespace"),
                "not allowed on this type",
            ));
        }
        _ => {}
    }

    if let Some(generation) = meta.generation {
        if generation < 0 {
            errors.push(FieldError::invalid(
                path.child("generation"),
                generation.to_string(),
                "must be greater than or equal to 0",
            ));
        }
    }

    if let Some(labels) = &meta.labels {
        errors.extend(validate_labels(labels, &path.child("labels")));
    }

    if let Some(annotations) = &meta.annotations {
        errors.extend(validate_annotations(annotations, &path.child("annotations")));
    }

    errors
}

pub fn validate_object_meta_update(
    new_meta: &ObjectMeta,
    old_meta: &ObjectMeta,
    path: &FieldPath,
) -> ErrorList {
    let mut errors = ErrorList::new();

    if new_meta.name != old_meta.name {
        errors.push(FieldError::invalid(
            path.child("name"),
            new_meta.name.as_deref().unwrap_or_default(),
            "field is immutable",
        ));
    }

    if new_meta.namespace != old_meta.namespace {
        errors.push(FieldError::invalid(
            path.child("namespace"),
            new_meta.namespace.as_deref().unwrap_or_default(),
            "field is immutable",
        ));
    }

    if new_meta.uid.is_some() && new_meta.uid != old_meta.uid {
        errors.push(FieldError::invalid(
            path.child("uid"),
            new_meta.uid.as_deref().unwrap_or_default(),
            "field is immutable",
        ));
    }

    if new_meta.creation_timestamp.is_some()
        && new_meta.creation_timestamp != old_meta.creation_timestamp
    {
        errors.push(FieldError::invalid(
            path.child("creationTimestamp"),
            new_meta
                .creation_timestamp
                .as_ref()
                .map(|time| time.0.to_rfc3339())
                .unwrap_or_default(),
            "field is immutable",
        ));
    }

    errors
}

pub fn validate_labels(labels: &BTreeMap<String, String>, path: &FieldPath) -> ErrorList {
    labels
        .iter()
        .flat_map(|(key, value)| {
            let mut errors = Vec::new();
            if !is_qualified_name(key) {
                errors.push(FieldError::invalid(
                    path.clone(),
                    key,
                    "name part must consist of alphanumeric characters, '-', '_' or '.'",
                ));
            }
            if !is_label_value(value) {
                errors.push(FieldError::invalid(
                    path.key(key),
                    value,
                    "a valid label value must be 63 characters or less and consist of alphanumeric characters, '-', '_' or '.'",
                ));
            }
            errors
        })
        .collect()
}

pub fn validate_annotations(annotations: &BTreeMap<String, String>, path: &FieldPath) -> ErrorList {
    let mut errors: ErrorList = annotations
        .keys()
        .filter(|key| !is_qualified_name(&key.to_lowercase()))
        .map(|key| {
            FieldError::invalid(
                path.clone(),
                key,
                "name part must consist of alphanumeric characters, '-', '_' or '.'",
            )
        })
        .collect();

    let total_size: usize = annotations
        .iter()
        .map(|(key, value)| key.len() + value.len())
        .sum();

    if total_size > TOTAL_ANNOTATION_SIZE_LIMIT {
        errors.push(FieldError::too_long(
            path.clone(),
            "",
            TOTAL_ANNOTATION_SIZE_LIMIT,
        ));
    }

    errors
}
