use kube::{core::DynamicObject, Resource};

use crate::resources::crd::v1alpha1::network::Network;

use super::{
    fields::{FieldSelector, Fields},
    labels::{LabelSelector, Labels},
    SelectionError, SelectionPredicate,
};

pub const FIELD_NAME: &str = "metadata.name";
pub const FIELD_NAMESPACE: &str = "metadata.namespace";
pub const FIELD_PLUGIN: &str = "spec.plugin";

/// Every field a Network field selector may name.
pub const SELECTABLE_FIELDS: &[&str] = &[FIELD_NAME, FIELD_NAMESPACE, FIELD_PLUGIN];

pub fn to_selectable_fields(network: &Network) -> Fields {
    object_meta_fields(
        network.metadata.name.as_deref(),
        network.metadata.namespace.as_deref(),
    )
    .into_iter()
    .chain([(FIELD_PLUGIN.to_owned(), network.spec.plugin.to_owned())])
    .collect()
}

pub fn get_attrs(network: &Network) -> (Labels, Fields) {
    (
        network.metadata.labels.clone().unwrap_or_default(),
        to_selectable_fields(network),
    )
}

/// Same projection as [`get_attrs`] for objects of unknown type, e.g. ones
/// read back through a dynamic client.
pub fn get_attrs_dynamic(object: &DynamicObject) -> Result<(Labels, Fields), SelectionError> {
    let expected_api_version = Network::api_version(&());
    let expected_kind = Network::kind(&());

    let (api_version, kind) = object
        .types
        .as_ref()
        .map(|types| (types.api_version.as_str(), types.kind.as_str()))
        .unwrap_or_default();

    if api_version != expected_api_version || kind != expected_kind {
        return Err(SelectionError::WrongKind {
            expected: format!("{expected_api_version}/{expected_kind}"),
            found: format!("{api_version}/{kind}"),
        });
    }

    let plugin = object
        .data
        .pointer("/spec/plugin")
        .and_then(|plugin| plugin.as_str())
        .unwrap_or_default();

    let fields = object_meta_fields(
        object.metadata.name.as_deref(),
        object.metadata.namespace.as_deref(),
    )
    .into_iter()
    .chain([(FIELD_PLUGIN.to_owned(), plugin.to_owned())])
    .collect();

    Ok((object.metadata.labels.clone().unwrap_or_default(), fields))
}

pub fn match_network(label: LabelSelector, field: FieldSelector) -> SelectionPredicate<Network> {
    SelectionPredicate::new(label, field, get_attrs)
}

fn object_meta_fields(name: Option<&str>, namespace: Option<&str>) -> Fields {
    Fields::from([
        (FIELD_NAME.to_owned(), name.unwrap_or_default().to_owned()),
        (
            FIELD_NAMESPACE.to_owned(),
            namespace.unwrap_or_default().to_owned(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::core::{DynamicObject, ObjectMeta, TypeMeta};

    use crate::{
        resources::crd::v1alpha1::network::{Network, NetworkSpec},
        selection::{
            fields::FieldSelector,
            labels::LabelSelector,
            SelectionError, SelectionPredicate,
        },
    };

    use super::{
        get_attrs, get_attrs_dynamic, match_network, to_selectable_fields, SELECTABLE_FIELDS,
    };

    fn network(name: &str, plugin: &str, tier: &str) -> Network {
        Network {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                labels: Some(BTreeMap::from([("tier".to_owned(), tier.to_owned())])),
                ..Default::default()
            },
            spec: NetworkSpec {
                plugin: plugin.to_owned(),
                ..Default::default()
            },
            status: None,
        }
    }

    fn dynamic(api_version: &str, kind: &str) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: api_version.to_owned(),
                kind: kind.to_owned(),
            }),
            metadata: ObjectMeta {
                name: Some("net1".to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            data: serde_json::json!({ "spec": { "plugin": "vendorA" } }),
        }
    }

    #[test]
    fn selectable_fields_cover_name_namespace_and_plugin() {
        let fields = to_selectable_fields(&network("net1", "vendorA", "edge"));

        assert_eq!(fields.len(), 3);
        assert!(fields.keys().all(|field| SELECTABLE_FIELDS.contains(&field.as_str())));
        assert_eq!(fields["metadata.name"], "net1");
        assert_eq!(fields["metadata.namespace"], "default");
        assert_eq!(fields["spec.plugin"], "vendorA");
    }

    #[test]
    fn attrs_carry_labels_verbatim() {
        let (labels, _) = get_attrs(&network("net1", "vendorA", "edge"));
        assert_eq!(labels["tier"], "edge");
    }

    #[test]
    fn dynamic_attrs_reject_other_kinds() {
        let result = get_attrs_dynamic(&dynamic("v1", "Pod"));
        assert!(matches!(result, Err(SelectionError::WrongKind { .. })));
    }

    #[test]
    fn dynamic_attrs_match_by_name() {
        let (labels, fields) = get_attrs_dynamic(&dynamic("netattach.dev/v1alpha1", "Network")).unwrap();
        let predicate = match_network(
            LabelSelector::everything(),
            FieldSelector::one_term_equal("metadata.name", "net1"),
        );

        assert!(predicate.matches_attrs(&labels, &fields));
        assert_eq!(fields["spec.plugin"], "vendorA");
    }

    #[test]
    fn predicate_requires_both_selectors() {
        let predicate: SelectionPredicate<Network> = match_network(
            "tier=edge".parse().unwrap(),
            "spec.plugin=vendorA".parse().unwrap(),
        );

        assert!(predicate.matches(&network("net1", "vendorA", "edge")));
        assert!(!predicate.matches(&network("net2", "vendorB", "edge")));
        assert!(!predicate.matches(&network("net3", "vendorA", "core")));
    }

    #[test]
    fn empty_predicate_matches_everything() {
        let predicate = match_network(LabelSelector::everything(), FieldSelector::everything());

        assert!(predicate.is_everything());
        assert!(predicate.matches(&network("net1", "vendorA", "edge")));
    }
}
