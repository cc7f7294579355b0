//! Attribute-modification dispatch.
//!
//! `ModifyInstanceAttribute` has several request shapes and nothing in the
//! request says which one it is. Each shape has a handler; handlers are tried
//! in a fixed order and the first that reports [`HandlerOutcome::Handled`]
//! ends the search, even if a later handler would also match. When every
//! handler declines, the request is an [`Ec2Error::UnsupportedOperation`],
//! which callers can tell apart from a malformed request.

use serde::Serialize;
use tracing::{debug, warn};

use crate::decoder::{
    extract_block_device_overrides, extract_instance_ids, extract_scalar_attribute,
    BlockDeviceOverride,
};
use crate::error::{Ec2Error, Result};
use crate::params::RawParameters;
use crate::store::ResourceStore;

/// The mutation a handler applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeMutation {
    Scalar {
        instance_id: String,
        key: String,
        value: String,
    },
    BlockDevices {
        instance_id: String,
        overrides: Vec<BlockDeviceOverride>,
    },
}

/// What a single handler made of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled(AttributeMutation),
    Declined,
}

/// A candidate interpretation of a modify request.
pub type Handler<S> = fn(&RawParameters, &S) -> Result<HandlerOutcome>;

/// Handlers in priority order.
pub fn handlers<S: ResourceStore>() -> [(&'static str, Handler<S>); 2] {
    [
        ("scalar", scalar_attribute_handler::<S>),
        ("block-device", block_device_handler::<S>),
    ]
}

/// Resolve and apply a `ModifyInstanceAttribute` request.
pub fn modify_instance_attribute<S: ResourceStore>(
    raw: &RawParameters,
    store: &S,
) -> Result<AttributeMutation> {
    for (name, handler) in handlers::<S>() {
        match handler(raw, store)? {
            HandlerOutcome::Handled(mutation) => {
                debug!(handler = name, "attribute modification handled");
                return Ok(mutation);
            }
            HandlerOutcome::Declined => debug!(handler = name, "handler declined"),
        }
    }
    warn!(keys = raw.len(), "no handler claimed ModifyInstanceAttribute");
    Err(Ec2Error::UnsupportedOperation(
        "This specific call to ModifyInstanceAttribute has not been implemented".into(),
    ))
}

/// `<Attribute>.Value=...` on the first requested instance.
pub fn scalar_attribute_handler<S: ResourceStore>(
    raw: &RawParameters,
    store: &S,
) -> Result<HandlerOutcome> {
    let Some(attribute) = extract_scalar_attribute(raw)? else {
        return Ok(HandlerOutcome::Declined);
    };
    let instance_id = target_instance(raw)?;
    store.modify_instance_attribute(&instance_id, &attribute.key, &attribute.value)?;
    Ok(HandlerOutcome::Handled(AttributeMutation::Scalar {
        instance_id,
        key: attribute.key,
        value: attribute.value,
    }))
}

/// `BlockDeviceMapping.N.*` delete-on-termination overrides.
pub fn block_device_handler<S: ResourceStore>(
    raw: &RawParameters,
    store: &S,
) -> Result<HandlerOutcome> {
    let overrides = extract_block_device_overrides(raw)?;
    if overrides.is_empty() {
        return Ok(HandlerOutcome::Declined);
    }
    let instance_id = target_instance(raw)?;
    store.update_block_devices(&instance_id, &overrides)?;
    Ok(HandlerOutcome::Handled(AttributeMutation::BlockDevices {
        instance_id,
        overrides,
    }))
}

fn target_instance(raw: &RawParameters) -> Result<String> {
    extract_instance_ids(raw)
        .into_iter()
        .next()
        .ok_or_else(|| Ec2Error::malformed("ModifyInstanceAttribute requires an InstanceId"))
}
