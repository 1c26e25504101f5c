pub mod api;
pub mod config;
pub mod error;
pub mod helpers;
pub mod registry;
pub mod resources;
pub mod selection;
pub mod storage;
pub mod strategy;
pub mod validation;

pub const RESOURCE_GROUP: &str = "netattach.dev";
pub const RESOURCE_VERSION: &str = "v1alpha1";
