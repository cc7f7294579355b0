//! Response assembly: store results → a stable, serializable field surface.
//!
//! The views here carry everything a renderer needs and nothing more. Fields
//! the store does not track (DNS names, MAC address, hypervisor, …) are filled
//! from [`Placeholders`] rather than computed.

use serde::Serialize;

use crate::config::{EmulatorConfig, Placeholders};
use crate::dispatch::AttributeMutation;
use crate::model::{
    BlockDevice, Instance, InstanceState, NetworkInterface, Reservation, SecurityGroup,
    StateChange,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateView {
    pub code: u16,
    pub name: &'static str,
}

impl From<InstanceState> for StateView {
    fn from(state: InstanceState) -> Self {
        Self {
            code: state.code(),
            name: state.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub group_id: String,
    pub group_name: String,
}

impl From<&SecurityGroup> for GroupView {
    fn from(group: &SecurityGroup) -> Self {
        Self {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagView {
    pub resource_id: String,
    pub resource_type: &'static str,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInterfaceView {
    pub network_interface_id: String,
    pub subnet_id: String,
    pub vpc_id: String,
    pub description: String,
    pub owner_id: String,
    pub status: &'static str,
    pub mac_address: String,
    pub private_ip_address: String,
    pub source_dest_check: bool,
    pub groups: Vec<GroupView>,
    pub attachment_id: String,
    pub device_index: u32,
    pub attachment_status: &'static str,
    pub delete_on_termination: bool,
    pub public_ip: Option<String>,
}

impl NetworkInterfaceView {
    fn assemble(nic: &NetworkInterface, source_dest_check: bool, config: &EmulatorConfig) -> Self {
        Self {
            network_interface_id: nic.id.clone(),
            subnet_id: nic.subnet_id.clone(),
            vpc_id: nic.vpc_id.clone(),
            description: nic
                .description
                .clone()
                .unwrap_or_else(|| "Primary network interface".into()),
            owner_id: config.owner_id.clone(),
            status: "in-use",
            mac_address: config.placeholders.mac_address.clone(),
            private_ip_address: nic.private_ip_address.clone(),
            source_dest_check,
            groups: nic.groups.iter().map(GroupView::from).collect(),
            attachment_id: nic.attachment_id.clone(),
            device_index: nic.device_index,
            attachment_status: "attached",
            delete_on_termination: nic.delete_on_termination,
            public_ip: nic.public_ip.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDeviceView {
    pub device_name: String,
    pub volume_id: String,
    pub status: String,
    pub attach_time: String,
    pub delete_on_termination: bool,
}

impl BlockDeviceView {
    fn assemble(device_name: &str, device: &BlockDevice) -> Self {
        Self {
            device_name: device_name.to_string(),
            volume_id: device.volume_id.clone(),
            status: device.status.clone(),
            attach_time: timestamp(&device.attach_time),
            delete_on_termination: device.delete_on_termination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceView {
    pub instance_id: String,
    pub image_id: String,
    pub state: StateView,
    pub private_dns_name: String,
    pub dns_name: String,
    pub key_name: Option<String>,
    pub ami_launch_index: usize,
    pub instance_type: String,
    pub launch_time: String,
    pub availability_zone: String,
    pub tenancy: String,
    pub platform: Option<String>,
    pub monitoring_state: String,
    pub subnet_id: Option<String>,
    pub vpc_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub ip_address: Option<String>,
    pub source_dest_check: bool,
    pub groups: Vec<GroupView>,
    pub architecture: String,
    pub kernel_id: String,
    pub root_device_type: &'static str,
    pub root_device_name: String,
    pub block_devices: Vec<BlockDeviceView>,
    pub virtualization_type: String,
    pub client_token: String,
    pub tags: Vec<TagView>,
    pub hypervisor: String,
    pub ebs_optimized: bool,
    pub network_interfaces: Vec<NetworkInterfaceView>,
}

impl InstanceView {
    /// `launch_index` is the instance's position within its reservation.
    pub fn assemble(instance: &Instance, launch_index: usize, config: &EmulatorConfig) -> Self {
        let Placeholders {
            private_dns_name,
            dns_name,
            tenancy,
            monitoring_state,
            client_token,
            hypervisor,
            ..
        } = &config.placeholders;

        Self {
            instance_id: instance.id.clone(),
            image_id: instance.image_id.clone(),
            state: instance.state.into(),
            private_dns_name: private_dns_name.clone(),
            dns_name: dns_name.clone(),
            key_name: instance.key_name.clone(),
            ami_launch_index: launch_index,
            instance_type: instance.instance_type.clone(),
            launch_time: timestamp(&instance.launch_time),
            availability_zone: instance.availability_zone.clone(),
            tenancy: tenancy.clone(),
            platform: instance.platform.clone(),
            monitoring_state: monitoring_state.clone(),
            subnet_id: instance
                .primary_nic()
                .map(|nic| nic.subnet_id.clone())
                .or_else(|| instance.subnet_id.clone()),
            vpc_id: instance.vpc_id().map(str::to_string),
            private_ip_address: instance.private_ip_address().map(str::to_string),
            ip_address: instance.public_ip().map(str::to_string),
            source_dest_check: instance.source_dest_check,
            groups: instance.groups.iter().map(GroupView::from).collect(),
            architecture: instance.architecture.clone(),
            kernel_id: instance.kernel.clone(),
            root_device_type: "ebs",
            root_device_name: instance.root_device_name.clone(),
            block_devices: instance
                .block_device_mapping
                .iter()
                .map(|(name, device)| BlockDeviceView::assemble(name, device))
                .collect(),
            virtualization_type: instance.virtualization_type.clone(),
            client_token: client_token.clone(),
            tags: instance
                .tags
                .iter()
                .map(|(key, value)| TagView {
                    resource_id: instance.id.clone(),
                    resource_type: "instance",
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect(),
            hypervisor: hypervisor.clone(),
            ebs_optimized: instance.ebs_optimized,
            network_interfaces: instance
                .nics
                .values()
                .map(|nic| NetworkInterfaceView::assemble(nic, instance.source_dest_check, config))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationView {
    pub reservation_id: String,
    pub owner_id: String,
    pub groups: Vec<GroupView>,
    pub instances: Vec<InstanceView>,
}

impl ReservationView {
    pub fn assemble(reservation: &Reservation, config: &EmulatorConfig) -> Self {
        Self {
            reservation_id: reservation.id.clone(),
            owner_id: reservation.owner_id.clone(),
            groups: reservation.groups().into_iter().map(GroupView::from).collect(),
            instances: reservation
                .instances
                .iter()
                .enumerate()
                .map(|(index, instance)| InstanceView::assemble(instance, index, config))
                .collect(),
        }
    }

    /// A freshly launched reservation: every instance reports `pending`, as
    /// the provider does in its launch response.
    pub fn launched(reservation: &Reservation, config: &EmulatorConfig) -> Self {
        let mut view = Self::assemble(reservation, config);
        for instance in &mut view.instances {
            instance.state = InstanceState::Pending.into();
        }
        view
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChangeView {
    pub instance_id: String,
    pub previous_state: StateView,
    pub current_state: StateView,
}

impl From<&StateChange> for StateChangeView {
    fn from(change: &StateChange) -> Self {
        Self {
            instance_id: change.instance_id.clone(),
            previous_state: change.previous.into(),
            current_state: change.current.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatusView {
    pub instance_id: String,
    pub availability_zone: String,
    pub state: StateView,
    pub system_status: &'static str,
    pub instance_status: &'static str,
}

impl From<&Instance> for InstanceStatusView {
    fn from(instance: &Instance) -> Self {
        let status = if instance.state == InstanceState::Running {
            "ok"
        } else {
            "not-applicable"
        };
        Self {
            instance_id: instance.id.clone(),
            availability_zone: instance.availability_zone.clone(),
            state: instance.state.into(),
            system_status: status,
            instance_status: status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeView {
    pub instance_id: String,
    /// Attribute name exactly as the request spelled it.
    pub attribute: String,
    pub value: String,
}

/// The assembled result of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action")]
pub enum Response {
    DescribeInstances {
        request_id: String,
        reservations: Vec<ReservationView>,
    },
    RunInstances {
        request_id: String,
        reservation: ReservationView,
    },
    TerminateInstances {
        request_id: String,
        instances: Vec<StateChangeView>,
    },
    StopInstances {
        request_id: String,
        instances: Vec<StateChangeView>,
    },
    StartInstances {
        request_id: String,
        instances: Vec<StateChangeView>,
    },
    RebootInstances {
        request_id: String,
    },
    DescribeInstanceStatus {
        request_id: String,
        statuses: Vec<InstanceStatusView>,
    },
    DescribeInstanceAttribute {
        request_id: String,
        attribute: AttributeView,
    },
    ModifyInstanceAttribute {
        request_id: String,
        mutation: AttributeMutation,
    },
}

impl Response {
    /// The action name this response answers.
    pub fn action(&self) -> &'static str {
        match self {
            Response::DescribeInstances { .. } => "DescribeInstances",
            Response::RunInstances { .. } => "RunInstances",
            Response::TerminateInstances { .. } => "TerminateInstances",
            Response::StopInstances { .. } => "StopInstances",
            Response::StartInstances { .. } => "StartInstances",
            Response::RebootInstances { .. } => "RebootInstances",
            Response::DescribeInstanceStatus { .. } => "DescribeInstanceStatus",
            Response::DescribeInstanceAttribute { .. } => "DescribeInstanceAttribute",
            Response::ModifyInstanceAttribute { .. } => "ModifyInstanceAttribute",
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Response::DescribeInstances { request_id, .. }
            | Response::RunInstances { request_id, .. }
            | Response::TerminateInstances { request_id, .. }
            | Response::StopInstances { request_id, .. }
            | Response::StartInstances { request_id, .. }
            | Response::RebootInstances { request_id }
            | Response::DescribeInstanceStatus { request_id, .. }
            | Response::DescribeInstanceAttribute { request_id, .. }
            | Response::ModifyInstanceAttribute { request_id, .. } => request_id,
        }
    }
}

fn timestamp(t: &chrono::DateTime<chrono::Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
