//! Emulator configuration: placement defaults, seeded resources and the
//! provider placeholders rendered for fields the store does not track.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::model::{SecurityGroup, Subnet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub availability_zone: String,
    /// Account id reported as the owner of every reservation and interface.
    pub owner_id: String,
    /// Used when `RunInstances` carries no `InstanceType`.
    pub default_instance_type: String,
    pub default_architecture: String,
    pub default_kernel: String,
    /// Security groups present before any request is handled.
    pub security_groups: Vec<SecurityGroup>,
    /// Subnets present before any request is handled.
    pub subnets: Vec<Subnet>,
    pub placeholders: Placeholders,
}

/// Values the provider always returns but this emulator does not model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placeholders {
    pub request_id: String,
    pub private_dns_name: String,
    pub dns_name: String,
    pub public_ip: String,
    pub mac_address: String,
    pub hypervisor: String,
    pub tenancy: String,
    pub monitoring_state: String,
    pub client_token: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            availability_zone: "us-east-1a".into(),
            owner_id: "111122223333".into(),
            default_instance_type: "m1.small".into(),
            default_architecture: "x86_64".into(),
            default_kernel: "None".into(),
            security_groups: vec![SecurityGroup {
                id: "sg-245f6a01".into(),
                name: "default".into(),
            }],
            subnets: vec![Subnet {
                id: "subnet-1a2b3c4d".into(),
                vpc_id: "vpc-1a2b3c4d".into(),
                cidr_block: "10.0.0.0/24".into(),
                availability_zone: "us-east-1a".into(),
            }],
            placeholders: Placeholders::default(),
        }
    }
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            request_id: "59dbff89-35bd-4eac-99ed-be587EXAMPLE".into(),
            private_dns_name: "ip-10-0-0-12.ec2.internal".into(),
            dns_name: "ec2-46-51-219-63.compute-1.amazonaws.com".into(),
            public_ip: "46.51.219.63".into(),
            mac_address: "1b:2b:3c:4d:5e:6f".into(),
            hypervisor: "xen".into(),
            tenancy: "default".into(),
            monitoring_state: "disabled".into(),
            client_token: "ABCDE1234567890123".into(),
        }
    }
}

impl EmulatorConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
