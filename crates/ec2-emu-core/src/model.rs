//! Resource model owned by the store: reservations, instances and their
//! attachments.
//!
//! Values handed out by a [`crate::store::ResourceStore`] are snapshots; the
//! store keeps the authoritative copies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Ec2Error, Result};

/// Instance lifecycle state, with the provider's numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    #[default]
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn code(self) -> u16 {
        match self {
            InstanceState::Pending => 0,
            InstanceState::Running => 16,
            InstanceState::ShuttingDown => 32,
            InstanceState::Terminated => 48,
            InstanceState::Stopping => 64,
            InstanceState::Stopped => 80,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub vpc_id: String,
    pub cidr_block: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub subnet_id: String,
    pub vpc_id: String,
    pub private_ip_address: String,
    pub public_ip: Option<String>,
    pub device_index: u32,
    pub attachment_id: String,
    pub description: Option<String>,
    pub groups: Vec<SecurityGroup>,
    pub delete_on_termination: bool,
}

/// An EBS volume attached under a device name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub volume_id: String,
    pub status: String,
    pub attach_time: DateTime<Utc>,
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub reservation_id: String,
    pub image_id: String,
    pub state: InstanceState,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub user_data: Option<String>,
    pub groups: Vec<SecurityGroup>,
    pub subnet_id: Option<String>,
    pub availability_zone: String,
    /// Attached interfaces keyed by device index.
    pub nics: BTreeMap<u32, NetworkInterface>,
    /// Attached volumes keyed by device name.
    pub block_device_mapping: BTreeMap<String, BlockDevice>,
    pub tags: BTreeMap<String, String>,
    pub kernel: String,
    pub ramdisk: Option<String>,
    pub architecture: String,
    pub virtualization_type: String,
    pub platform: Option<String>,
    pub root_device_name: String,
    pub source_dest_check: bool,
    pub disable_api_termination: bool,
    pub instance_initiated_shutdown_behavior: String,
    pub ebs_optimized: bool,
    pub launch_time: DateTime<Utc>,
}

/// Scalar attribute keys accepted by describe/modify.
pub const SCALAR_ATTRIBUTES: &[&str] = &[
    "instance_type",
    "kernel",
    "ramdisk",
    "user_data",
    "source_dest_check",
    "disable_api_termination",
    "instance_initiated_shutdown_behavior",
    "ebs_optimized",
    "root_device_name",
    "group_set",
];

impl Instance {
    /// The primary (lowest device index) network interface, if any.
    pub fn primary_nic(&self) -> Option<&NetworkInterface> {
        self.nics.values().next()
    }

    pub fn vpc_id(&self) -> Option<&str> {
        self.primary_nic().map(|nic| nic.vpc_id.as_str())
    }

    pub fn private_ip_address(&self) -> Option<&str> {
        self.primary_nic().map(|nic| nic.private_ip_address.as_str())
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.primary_nic().and_then(|nic| nic.public_ip.as_deref())
    }

    /// Read a scalar attribute by its normalized key.
    ///
    /// Unset optional attributes read as an empty string.
    pub fn attribute(&self, key: &str) -> Result<String> {
        let value = match key {
            "instance_type" => self.instance_type.clone(),
            "kernel" => self.kernel.clone(),
            "ramdisk" => self.ramdisk.clone().unwrap_or_default(),
            "user_data" => self.user_data.clone().unwrap_or_default(),
            "source_dest_check" => self.source_dest_check.to_string(),
            "disable_api_termination" => self.disable_api_termination.to_string(),
            "instance_initiated_shutdown_behavior" => {
                self.instance_initiated_shutdown_behavior.clone()
            }
            "ebs_optimized" => self.ebs_optimized.to_string(),
            "root_device_name" => self.root_device_name.clone(),
            "group_set" => self
                .groups
                .iter()
                .map(|g| g.id.as_str())
                .collect::<Vec<_>>()
                .join(","),
            other => return Err(Ec2Error::invalid_value("Attribute", other)),
        };
        Ok(value)
    }

    /// Write a scalar attribute by its normalized key.
    ///
    /// Boolean attributes accept `true`/`false` in any case. `group_set` is
    /// resolved by the store and is rejected here.
    pub fn set_attribute(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "instance_type" => self.instance_type = value.to_string(),
            "kernel" => self.kernel = value.to_string(),
            "ramdisk" => self.ramdisk = Some(value.to_string()),
            "user_data" => self.user_data = Some(value.to_string()),
            "source_dest_check" => self.source_dest_check = parse_flag(key, value)?,
            "disable_api_termination" => self.disable_api_termination = parse_flag(key, value)?,
            "instance_initiated_shutdown_behavior" => match value {
                "stop" | "terminate" => {
                    self.instance_initiated_shutdown_behavior = value.to_string()
                }
                _ => return Err(Ec2Error::invalid_value(key, value)),
            },
            "ebs_optimized" => self.ebs_optimized = parse_flag(key, value)?,
            "root_device_name" => self.root_device_name = value.to_string(),
            other => return Err(Ec2Error::invalid_value("Attribute", other)),
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Ec2Error::invalid_value(key, value)),
    }
}

/// Instances launched by one `RunInstances` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub owner_id: String,
    pub instances: Vec<Instance>,
}

impl Reservation {
    /// Distinct security groups across all instances, in first-seen order.
    pub fn groups(&self) -> Vec<&SecurityGroup> {
        let mut seen: Vec<&SecurityGroup> = Vec::new();
        for group in self.instances.iter().flat_map(|i| i.groups.iter()) {
            if !seen.iter().any(|g| g.id == group.id) {
                seen.push(group);
            }
        }
        seen
    }
}

/// Result of a lifecycle transition on one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub instance_id: String,
    pub previous: InstanceState,
    pub current: InstanceState,
}
