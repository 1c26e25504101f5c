use std::net::IpAddr;

use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::resources::crd::v1alpha1::network::{Network, NetworkSpec, NetworkStatus};

use super::{
    meta::{validate_object_meta, validate_object_meta_update},
    ErrorList, FieldError, FieldPath,
};

pub const PLUGIN_NAME_MAX_LENGTH: usize = 253;
pub const ARG_NAME_MAX_LENGTH: usize = 63;

static PLUGIN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_./]*[A-Za-z0-9])?$").unwrap());
static ARG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][-A-Za-z0-9_.]*$").unwrap());

pub fn validate_network(network: &Network) -> ErrorList {
    let mut errors = validate_object_meta(&network.metadata, true, &FieldPath::new("metadata"));
    errors.extend(validate_network_spec(&network.spec, &FieldPath::new("spec")));

    errors
}

pub fn validate_network_update(new_network: &Network, old_network: &Network) -> ErrorList {
    validate_object_meta_update(
        &new_network.metadata,
        &old_network.metadata,
        &FieldPath::new("metadata"),
    )
}

pub fn validate_network_status_update(new_network: &Network, old_network: &Network) -> ErrorList {
    let mut errors = validate_network_update(new_network, old_network);

    if let Some(status) = &new_network.status {
        errors.extend(validate_network_status(
            status,
            new_network.metadata.generation,
            &FieldPath::new("status"),
        ));
    }

    errors
}

pub fn validate_network_spec(spec: &NetworkSpec, path: &FieldPath) -> ErrorList {
    let mut errors = ErrorList::new();

    errors.extend(validate_plugin(&spec.plugin, &path.child("plugin")));

    for name in spec.args.keys() {
        let arg_path = path.child("args").key(name);
        if name.len() > ARG_NAME_MAX_LENGTH {
            errors.push(FieldError::too_long(arg_path, name, ARG_NAME_MAX_LENGTH));
        } else if !ARG_NAME.is_match(name) {
            errors.push(FieldError::invalid(
                arg_path,
                name,
                "argument names must start with a letter or '_' and consist of alphanumeric characters, '-', '_' or '.'",
            ));
        }
    }

    let cidr_path = path.child("cidrMask");
    let cidr = spec
        .cidr_mask
        .as_deref()
        .and_then(|raw| match validate_cidr_mask(raw, &cidr_path) {
            Ok(net) => Some(net),
            Err(error) => {
                errors.push(error);
                None
            }
        });

    if let Some(raw_gateway) = spec.gateway.as_deref() {
        errors.extend(validate_gateway(raw_gateway, cidr.as_ref(), &path.child("gateway")));
    }

    errors
}

fn validate_plugin(plugin: &str, path: &FieldPath) -> Option<FieldError> {
    if plugin.is_empty() {
        return Some(FieldError::required(path.clone(), "a plugin name is required"));
    }

    if plugin.len() > PLUGIN_NAME_MAX_LENGTH {
        return Some(FieldError::too_long(path.clone(), plugin, PLUGIN_NAME_MAX_LENGTH));
    }

    if !PLUGIN_NAME.is_match(plugin) {
        return Some(FieldError::invalid(
            path.clone(),
            plugin,
            "must consist of alphanumeric characters, '-', '_', '.' or '/'",
        ));
    }

    None
}

fn validate_cidr_mask(raw: &str, path: &FieldPath) -> Result<IpNet, FieldError> {
    if raw.is_empty() {
        return Err(FieldError::required(
            path.clone(),
            "must be omitted or a valid CIDR",
        ));
    }

    let net = raw.parse::<IpNet>().map_err(|_| {
        FieldError::invalid(path.clone(), raw, "must be a valid CIDR, e.g. 10.0.0.0/16")
    })?;

    if net != net.trunc() {
        return Err(FieldError::invalid(
            path.clone(),
            raw,
            format!("must be a network address, did you mean {}?", net.trunc()),
        ));
    }

    Ok(net)
}

fn validate_gateway(raw: &str, cidr: Option<&IpNet>, path: &FieldPath) -> Option<FieldError> {
    if raw.is_empty() {
        return Some(FieldError::required(
            path.clone(),
            "must be omitted or a valid IP address",
        ));
    }

    let gateway = match raw.parse::<IpAddr>() {
        Ok(gateway) => gateway,
        Err(_) => {
            return Some(FieldError::invalid(
                path.clone(),
                raw,
                "must be a valid IP address",
            ))
        }
    };

    let cidr = cidr?;

    if !cidr.contains(&gateway) {
        return Some(FieldError::invalid(
            path.clone(),
            raw,
            format!("must be part of the {cidr} network"),
        ));
    }

    if cidr.prefix_len() < cidr.max_prefix_len() && gateway == cidr.network() {
        return Some(FieldError::invalid(
            path.clone(),
            raw,
            "must not be the network address",
        ));
    }

    None
}

fn validate_network_status(
    status: &NetworkStatus,
    generation: Option<i64>,
    path: &FieldPath,
) -> ErrorList {
    let mut errors = ErrorList::new();

    if let Some(observed) = status.observed_generation {
        if observed < 0 || generation.map_or(false, |generation| observed > generation) {
            errors.push(FieldError::invalid(
                path.child("observedGeneration"),
                observed.to_string(),
                "must be between 0 and metadata.generation",
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::core::ObjectMeta;

    use crate::resources::crd::v1alpha1::network::{
        Network, NetworkSpec, NetworkState, NetworkStatus,
    };

    use super::{validate_network, validate_network_status_update, validate_network_update};

    fn valid_network() -> Network {
        Network {
            metadata: ObjectMeta {
                name: Some("net1".to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            spec: NetworkSpec {
                plugin: "vendorA".to_owned(),
                args: BTreeMap::from([("mtu".to_owned(), "1450".to_owned())]),
                cidr_mask: Some("11.22.192.0/18".to_owned()),
                gateway: Some("11.22.192.1".to_owned()),
            },
            status: None,
        }
    }

    fn errors_after(modify: impl FnOnce(&mut Network)) -> super::ErrorList {
        let mut network = valid_network();
        modify(&mut network);
        validate_network(&network)
    }

    #[test]
    fn well_formed_network_is_valid() {
        assert!(validate_network(&valid_network()).is_empty());
    }

    #[test]
    fn plugin_only_network_is_valid() {
        let network = Network {
            metadata: valid_network().metadata,
            spec: NetworkSpec {
                plugin: "xyz".to_owned(),
                ..Default::default()
            },
            status: None,
        };

        assert!(validate_network(&network).is_empty());
    }

    #[test]
    fn empty_plugin_is_required() {
        let errors = errors_after(|n| n.spec.plugin.clear());
        assert!(errors.contains_path("spec.plugin"));
    }

    #[test]
    fn malformed_plugin_is_invalid() {
        let errors = errors_after(|n| n.spec.plugin = "vendor A".to_owned());
        assert!(errors.contains_path("spec.plugin"));
    }

    #[test]
    fn malformed_cidr_mask_is_invalid() {
        assert!(errors_after(|n| n.spec.cidr_mask = Some("11.22.192.0/33".to_owned()))
            .contains_path("spec.cidrMask"));
        assert!(errors_after(|n| n.spec.cidr_mask = Some(String::new()))
            .contains_path("spec.cidrMask"));
    }

    #[test]
    fn cidr_mask_must_be_a_network_address() {
        let errors = errors_after(|n| n.spec.cidr_mask = Some("11.22.192.7/18".to_owned()));
        assert!(errors.contains_path("spec.cidrMask"));
    }

    #[test]
    fn malformed_gateway_is_invalid() {
        assert!(errors_after(|n| n.spec.gateway = Some("11.22.192".to_owned()))
            .contains_path("spec.gateway"));
        assert!(errors_after(|n| n.spec.gateway = Some(String::new()))
            .contains_path("spec.gateway"));
    }

    #[test]
    fn gateway_must_be_inside_the_cidr_mask() {
        let errors = errors_after(|n| n.spec.gateway = Some("10.0.0.1".to_owned()));
        assert!(errors.contains_path("spec.gateway"));

        let errors = errors_after(|n| n.spec.gateway = Some("11.22.192.0".to_owned()));
        assert!(errors.contains_path("spec.gateway"));
    }

    #[test]
    fn ipv6_networks_are_supported() {
        let errors = errors_after(|n| {
            n.spec.cidr_mask = Some("fd00:10::/64".to_owned());
            n.spec.gateway = Some("fd00:10::1".to_owned());
        });

        assert!(errors.is_empty());
    }

    #[test]
    fn malformed_args_are_invalid() {
        let errors = errors_after(|n| {
            n.spec.args.insert("1st".to_owned(), "value".to_owned());
        });

        assert!(errors.contains_path("spec.args[1st]"));
    }

    #[test]
    fn update_validation_rejects_renames() {
        let old = valid_network();
        let mut new = valid_network();
        new.metadata.name = Some("bar".to_owned());

        assert!(validate_network_update(&new, &old).contains_path("metadata.name"));
    }

    #[test]
    fn status_update_rejects_future_observed_generation() {
        let mut old = valid_network();
        old.metadata.generation = Some(2);
        let mut new = old.clone();
        new.status = Some(NetworkStatus {
            state: NetworkState::Ready,
            message: None,
            observed_generation: Some(3),
        });

        assert!(validate_network_status_update(&new, &old)
            .contains_path("status.observedGeneration"));
    }
}
