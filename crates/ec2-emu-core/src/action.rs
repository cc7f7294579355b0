//! Action routing: the `Action` parameter selects an operation, which decodes
//! its own parameters, drives the store and assembles a [`Response`].

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::config::EmulatorConfig;
use crate::decoder::{camelcase_to_underscores, extract_filters, extract_instance_ids, RunInstancesRequest};
use crate::dispatch;
use crate::error::{Ec2Error, Result};
use crate::filter::{apply, filter_reservations};
use crate::params::RawParameters;
use crate::response::{
    AttributeView, InstanceStatusView, ReservationView, Response, StateChangeView,
};
use crate::store::ResourceStore;

/// The operations this emulator answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    DescribeInstances,
    RunInstances,
    TerminateInstances,
    RebootInstances,
    StopInstances,
    StartInstances,
    DescribeInstanceStatus,
    DescribeInstanceAttribute,
    ModifyInstanceAttribute,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::DescribeInstances,
        Action::RunInstances,
        Action::TerminateInstances,
        Action::RebootInstances,
        Action::StopInstances,
        Action::StartInstances,
        Action::DescribeInstanceStatus,
        Action::DescribeInstanceAttribute,
        Action::ModifyInstanceAttribute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::DescribeInstances => "DescribeInstances",
            Action::RunInstances => "RunInstances",
            Action::TerminateInstances => "TerminateInstances",
            Action::RebootInstances => "RebootInstances",
            Action::StopInstances => "StopInstances",
            Action::StartInstances => "StartInstances",
            Action::DescribeInstanceStatus => "DescribeInstanceStatus",
            Action::DescribeInstanceAttribute => "DescribeInstanceAttribute",
            Action::ModifyInstanceAttribute => "ModifyInstanceAttribute",
        }
    }

    /// Whether the action changes instance state.
    pub fn is_mutation(self) -> bool {
        !matches!(
            self,
            Action::DescribeInstances
                | Action::DescribeInstanceStatus
                | Action::DescribeInstanceAttribute
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Ec2Error;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Ec2Error::InvalidAction(s.to_string()))
    }
}

/// Read the `Action` parameter of a request.
pub fn action_of(raw: &RawParameters) -> Result<Action> {
    raw.first("Action")
        .ok_or_else(|| Ec2Error::MissingParameter("Action".into()))?
        .parse()
}

/// Route one decoded request to its operation.
pub fn handle_request<S: ResourceStore>(
    store: &S,
    config: &EmulatorConfig,
    raw: &RawParameters,
) -> Result<Response> {
    let action = action_of(raw)?;
    debug!(%action, keys = raw.len(), "routing request");

    let result = route(action, store, config, raw);
    match &result {
        Ok(_) if action.is_mutation() => info!(%action, "request applied"),
        Ok(_) => debug!(%action, "request answered"),
        Err(err) => warn!(%action, code = err.code(), error = %err, "request rejected"),
    }
    result
}

fn route<S: ResourceStore>(
    action: Action,
    store: &S,
    config: &EmulatorConfig,
    raw: &RawParameters,
) -> Result<Response> {
    let request_id = config.placeholders.request_id.clone();

    let response = match action {
        Action::DescribeInstances => {
            let ids = extract_instance_ids(raw);
            let filters = extract_filters(raw);
            let reservations = if ids.is_empty() {
                store.all_reservations()
            } else {
                store.reservations_by_instance_ids(&ids)?
            };
            let reservations = filter_reservations(reservations, &filters)?;
            Response::DescribeInstances {
                request_id,
                reservations: reservations
                    .iter()
                    .map(|r| ReservationView::assemble(r, config))
                    .collect(),
            }
        }
        Action::RunInstances => {
            let request = RunInstancesRequest::from_params(raw, &config.default_instance_type)?;
            let reservation = store.add_instances(&request)?;
            Response::RunInstances {
                request_id,
                reservation: ReservationView::launched(&reservation, config),
            }
        }
        Action::TerminateInstances => Response::TerminateInstances {
            request_id,
            instances: state_changes(store.terminate_instances(&required_ids(raw)?)?),
        },
        Action::StopInstances => Response::StopInstances {
            request_id,
            instances: state_changes(store.stop_instances(&required_ids(raw)?)?),
        },
        Action::StartInstances => Response::StartInstances {
            request_id,
            instances: state_changes(store.start_instances(&required_ids(raw)?)?),
        },
        Action::RebootInstances => {
            store.reboot_instances(&required_ids(raw)?)?;
            Response::RebootInstances { request_id }
        }
        Action::DescribeInstanceStatus => {
            let ids = extract_instance_ids(raw);
            let filters = extract_filters(raw);
            let instances = if ids.is_empty() {
                store.all_instances()
            } else {
                store.instances_by_ids(&ids)?
            };
            Response::DescribeInstanceStatus {
                request_id,
                statuses: apply(&instances, &filters)?
                    .iter()
                    .map(InstanceStatusView::from)
                    .collect(),
            }
        }
        Action::DescribeInstanceAttribute => {
            let attribute = raw
                .first("Attribute")
                .ok_or_else(|| Ec2Error::MissingParameter("Attribute".into()))?;
            if !is_attribute_name(attribute) {
                return Err(Ec2Error::invalid_value("Attribute", attribute));
            }
            let id = required_ids(raw)?.swap_remove(0);
            let key = camelcase_to_underscores(attribute);
            let (instance, value) = store.instance_attribute(&id, &key)?;
            Response::DescribeInstanceAttribute {
                request_id,
                attribute: AttributeView {
                    instance_id: instance.id,
                    attribute: attribute.to_string(),
                    value,
                },
            }
        }
        Action::ModifyInstanceAttribute => Response::ModifyInstanceAttribute {
            request_id,
            mutation: dispatch::modify_instance_attribute(raw, store)?,
        },
    };
    Ok(response)
}

/// Attribute names are echoed as element names, so only plain camel-case
/// identifiers are accepted.
fn is_attribute_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Instance ids for actions that cannot default to "all instances".
fn required_ids(raw: &RawParameters) -> Result<Vec<String>> {
    let ids = extract_instance_ids(raw);
    if ids.is_empty() {
        return Err(Ec2Error::MissingParameter("InstanceId".into()));
    }
    Ok(ids)
}

fn state_changes(changes: Vec<crate::model::StateChange>) -> Vec<StateChangeView> {
    changes.iter().map(StateChangeView::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn action_names_are_case_sensitive() {
        assert_eq!(
            "describeinstances".parse::<Action>(),
            Err(Ec2Error::InvalidAction("describeinstances".into()))
        );
    }

    #[test]
    fn missing_action_parameter() {
        let raw: RawParameters = [("InstanceId.1", "i-1")].into_iter().collect();
        assert_eq!(
            action_of(&raw),
            Err(Ec2Error::MissingParameter("Action".into()))
        );
    }
}
