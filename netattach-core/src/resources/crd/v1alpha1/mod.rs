use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, CustomResourceExt,
};
use log::info;

use crate::error::ApiError;

use self::network::Network;

pub mod network;

pub async fn create_v1alpha1_crds(
    client: &Client,
    apply_params: &PatchParams,
) -> Result<(), ApiError> {
    apply_crd(client, &Network::crd(), apply_params).await
}

async fn apply_crd(
    client: &Client,
    crd: &CustomResourceDefinition,
    apply_params: &PatchParams,
) -> Result<(), ApiError> {
    let crd_name = crd
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("CRD is missing a name!"))?;
    let crd_apiversions = crd
        .spec
        .versions
        .iter()
        .map(|version| version.name.as_str())
        .collect::<Vec<&str>>()
        .join(", ");

    info!("Applying {crd_name} ({crd_apiversions}) CRD...");

    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    crd_api
        .patch(crd_name, apply_params, &Patch::Apply(crd))
        .await?;

    Ok(())
}
