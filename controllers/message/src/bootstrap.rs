//! Message CRD bootstrap.
//!
//! Registers the `Message` CustomResourceDefinition with the API server at
//! startup and waits until the API server serves it. An existing definition is
//! left untouched.

use crate::error::ControllerError;
use crds::Message;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::PostParams;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// How often the CRD is polled while waiting for it to be established
pub const ESTABLISHED_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long to wait for the CRD to be established
pub const ESTABLISHED_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of [`ensure_crd`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdInstall {
    /// The CRD was created by this call
    Registered,
    /// The CRD already existed
    Existed,
}

/// Create the Message CRD unless it already exists, then wait until it is
/// established.
///
/// # Errors
///
/// Any Kubernetes error other than AlreadyExists, or
/// [`ControllerError::Timeout`] if the CRD is not established within
/// [`ESTABLISHED_TIMEOUT`].
pub async fn ensure_crd(client: Client) -> Result<CrdInstall, ControllerError> {
    let api: Api<CustomResourceDefinition> = Api::all(client);
    let crd = Message::crd();
    let name = crd.name_any();
    let install = match api.create(&PostParams::default(), &crd).await {
        Ok(_) => {
            info!("CRD {} registered", name);
            CrdInstall::Registered
        }
        Err(kube::Error::Api(ref response)) if response.code == 409 => {
            info!("CRD {} existed", name);
            CrdInstall::Existed
        }
        Err(e) => return Err(ControllerError::Kube(e)),
    };

    wait_for_established(&api, &name, ESTABLISHED_POLL_INTERVAL, ESTABLISHED_TIMEOUT).await?;
    Ok(install)
}

/// Whether the CRD reports an `Established` condition with status `True`.
pub fn is_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        })
}

async fn wait_for_established(
    api: &Api<CustomResourceDefinition>,
    name: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<(), ControllerError> {
    let poll = async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match api.get_opt(name).await? {
                Some(crd) if is_established(&crd) => return Ok::<(), kube::Error>(()),
                Some(_) => debug!("CRD {} not established yet", name),
                None => debug!("CRD {} not visible yet", name),
            }
        }
    };
    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => {
            result?;
            info!("CRD {} established", name);
            Ok(())
        }
        Err(_) => Err(ControllerError::Timeout(format!(
            "CRD {name} not established within {}s",
            timeout.as_secs()
        ))),
    }
}
