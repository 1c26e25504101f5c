use std::any::type_name;

use kube::Resource;

use crate::error::ApiError;

pub fn pretty_type_name<'a, T>() -> &'a str {
    type_name::<T>().split("::").last().unwrap_or_default()
}

pub trait RequireMetadata<E> {
    fn require_name_or_else(&self, error: impl FnOnce() -> E) -> Result<&str, E>;
}

impl<T: Resource, E> RequireMetadata<E> for T {
    fn require_name_or_else(&self, error: impl FnOnce() -> E) -> Result<&str, E> {
        self.meta()
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(error)
    }
}

/// Name of the object for error messages, empty when it has none yet.
pub fn display_name<T: Resource>(object: &T) -> &str {
    object.meta().name.as_deref().unwrap_or_default()
}

pub fn require_name<T: Resource>(object: &T) -> Result<&str, ApiError> {
    object.require_name_or_else(|| {
        ApiError::bad_request(format!(
            "{} is missing metadata.name!",
            pretty_type_name::<T>()
        ))
    })
}
