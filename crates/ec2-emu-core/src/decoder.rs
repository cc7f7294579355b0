//! Indexed-parameter decoder: flat request keys into typed nested structures.
//!
//! The query protocol flattens nested request shapes into dotted, 1-based
//! indexed keys:
//!
//! ```text
//! InstanceId.1=i-1
//! Filter.1.Name=instance-type
//! Filter.1.Value.1=m1.small
//! NetworkInterface.1.DeviceIndex=0
//! BlockDeviceMapping.1.DeviceName=/dev/sda1
//! ```
//!
//! Each shape has its own extraction function; there is no single pass over
//! the request. Indexed groups are discovered by probing a *marker* key at
//! index 1, 2, 3, … and enumeration stops at the first missing marker, so
//! groups past a gap are never seen.
//!
//! Typed values (counts, booleans, device indices) are parsed here, once.

use serde::Serialize;
use tracing::debug;

use crate::error::{Ec2Error, Result};
use crate::filter::FilterSet;
use crate::params::RawParameters;

/// One `NetworkInterface.N.*` group of a launch request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkInterfaceSpec {
    /// The `N` this group was found under.
    pub index: u32,
    pub device_index: u32,
    pub subnet_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub associate_public_ip_address: Option<bool>,
    /// Attach an existing interface instead of creating one.
    pub network_interface_id: Option<String>,
    pub description: Option<String>,
    pub security_group_ids: Vec<String>,
    pub delete_on_termination: Option<bool>,
}

/// One `BlockDeviceMapping.N.*` group of an attribute modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDeviceOverride {
    pub device_name: String,
    pub delete_on_termination: bool,
}

/// A `<CamelAttribute>.Value` pair with its key normalized to store form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalarAttribute {
    pub key: String,
    pub value: String,
}

/// Fully decoded `RunInstances` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInstancesRequest {
    pub image_id: String,
    pub min_count: u32,
    pub user_data: Option<String>,
    pub security_group_names: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub instance_type: String,
    pub subnet_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub associate_public_ip_address: Option<bool>,
    pub key_name: Option<String>,
    pub network_interfaces: Vec<NetworkInterfaceSpec>,
}

impl RunInstancesRequest {
    /// Decode a launch request. `default_instance_type` applies when the
    /// request carries no `InstanceType`.
    pub fn from_params(raw: &RawParameters, default_instance_type: &str) -> Result<Self> {
        let image_id = raw
            .first("ImageId")
            .ok_or_else(|| Ec2Error::MissingParameter("ImageId".into()))?
            .to_string();

        let min_count = match raw.first("MinCount") {
            Some(v) => parse_u32("MinCount", v)?,
            None => 1,
        };
        if min_count == 0 {
            return Err(Ec2Error::invalid_value("MinCount", "0"));
        }
        let max_count = match raw.first("MaxCount") {
            Some(v) => parse_u32("MaxCount", v)?,
            None => min_count,
        };
        if max_count < min_count {
            return Err(Ec2Error::invalid_value("MaxCount", max_count.to_string()));
        }

        let request = Self {
            image_id,
            min_count,
            user_data: owned(raw.first("UserData")),
            security_group_names: multi_param(raw, "SecurityGroup"),
            security_group_ids: multi_param(raw, "SecurityGroupId"),
            instance_type: raw
                .first("InstanceType")
                .unwrap_or(default_instance_type)
                .to_string(),
            subnet_id: owned(raw.first("SubnetId")),
            private_ip_address: owned(raw.first("PrivateIpAddress")),
            associate_public_ip_address: raw
                .first("AssociatePublicIpAddress")
                .map(|v| parse_bool("AssociatePublicIpAddress", v))
                .transpose()?,
            key_name: owned(raw.first("KeyName")),
            network_interfaces: extract_network_interfaces(raw)?,
        };
        if request.min_count > 1 && request.has_explicit_ip() {
            return Err(Ec2Error::InvalidParameterCombination(
                "Cannot specify a private IP address when launching more than one instance"
                    .into(),
            ));
        }
        debug!(
            image_id = %request.image_id,
            count = request.min_count,
            nics = request.network_interfaces.len(),
            "decoded RunInstances"
        );
        Ok(request)
    }

    fn has_explicit_ip(&self) -> bool {
        self.private_ip_address.is_some()
            || self
                .network_interfaces
                .iter()
                .any(|nic| nic.private_ip_address.is_some())
    }
}

/// All `InstanceId.N` values in ascending `N`. Duplicates are kept.
///
/// A bare `InstanceId` (the single-instance actions send one) sorts before
/// every indexed key. An empty result means the caller targets every
/// instance.
pub fn extract_instance_ids(raw: &RawParameters) -> Vec<String> {
    let mut indexed: Vec<(u32, &[String])> = raw
        .iter()
        .filter_map(|(key, values)| {
            let n = match key.strip_prefix("InstanceId") {
                Some("") => 0,
                Some(rest) => rest.strip_prefix('.')?.parse::<u32>().ok()?,
                None => return None,
            };
            Some((n, values))
        })
        .collect();
    indexed.sort_by_key(|&(n, _)| n);
    indexed
        .into_iter()
        .flat_map(|(_, values)| values.iter().cloned())
        .collect()
}

/// Build the filter set from `Filter.N.Name` / `Filter.N.Value.M`.
///
/// Both `N` and `M` are probed from 1 and stop at the first gap.
pub fn extract_filters(raw: &RawParameters) -> FilterSet {
    let mut filters = FilterSet::new();
    for (n, name) in probe(raw, |n| format!("Filter.{n}.Name")) {
        let values = probe(raw, move |m| format!("Filter.{n}.Value.{m}"))
            .map(|(_, v)| v.to_string())
            .collect();
        filters.insert(name, values);
    }
    filters
}

/// Decode the `NetworkInterface.N.*` groups, keyed on `DeviceIndex`.
pub fn extract_network_interfaces(raw: &RawParameters) -> Result<Vec<NetworkInterfaceSpec>> {
    probe(raw, |n| format!("NetworkInterface.{n}.DeviceIndex"))
        .map(|(n, device_index)| {
            let field = |name: &str| raw.first(&format!("NetworkInterface.{n}.{name}"));
            let flag = |name: &str| -> Result<Option<bool>> {
                field(name)
                    .map(|v| parse_bool(&format!("NetworkInterface.{n}.{name}"), v))
                    .transpose()
            };
            Ok(NetworkInterfaceSpec {
                index: n,
                device_index: parse_u32(&format!("NetworkInterface.{n}.DeviceIndex"), device_index)?,
                subnet_id: owned(field("SubnetId")),
                private_ip_address: owned(field("PrivateIpAddress")),
                associate_public_ip_address: flag("AssociatePublicIpAddress")?,
                network_interface_id: owned(field("NetworkInterfaceId")),
                description: owned(field("Description")),
                security_group_ids: probe(raw, move |m| format!("NetworkInterface.{n}.SecurityGroupId.{m}"))
                    .map(|(_, v)| v.to_string())
                    .collect(),
                delete_on_termination: flag("DeleteOnTermination")?,
            })
        })
        .collect()
}

/// Decode the `BlockDeviceMapping.N.*` groups, keyed on `DeviceName`.
///
/// The delete-on-termination flag is `true` only for the exact string
/// `"true"`; `"True"` and `"TRUE"` are `false`. A detected device without
/// the flag is a malformed request.
pub fn extract_block_device_overrides(raw: &RawParameters) -> Result<Vec<BlockDeviceOverride>> {
    probe(raw, |n| format!("BlockDeviceMapping.{n}.DeviceName"))
        .map(|(n, device_name)| {
            let flag_key = format!("BlockDeviceMapping.{n}.Ebs.DeleteOnTermination");
            let flag = raw.first(&flag_key).ok_or_else(|| {
                Ec2Error::malformed(format!("{flag_key} is required for device {device_name}"))
            })?;
            Ok(BlockDeviceOverride {
                device_name: device_name.to_string(),
                delete_on_termination: flag == "true",
            })
        })
        .collect()
}

/// The first `<Attribute>.Value` key in request order, normalized.
///
/// Returns `Ok(None)` when the request has no such key.
pub fn extract_scalar_attribute(raw: &RawParameters) -> Result<Option<ScalarAttribute>> {
    let Some((key, values)) = raw.iter().find(|(key, _)| key.contains(".Value")) else {
        return Ok(None);
    };
    let attribute = key.split('.').next().unwrap_or_default();
    if attribute.is_empty() {
        return Err(Ec2Error::malformed(format!("no attribute name in '{key}'")));
    }
    let value = values
        .first()
        .ok_or_else(|| Ec2Error::malformed(format!("{key} has no value")))?;
    Ok(Some(ScalarAttribute {
        key: camelcase_to_underscores(attribute),
        value: value.clone(),
    }))
}

/// Values for `prefix` itself followed by `prefix.1`, `prefix.2`, … up to the
/// first gap.
pub fn multi_param(raw: &RawParameters, prefix: &str) -> Vec<String> {
    raw.all(prefix)
        .iter()
        .cloned()
        .chain(probe(raw, |n| format!("{prefix}.{n}")).map(|(_, v)| v.to_string()))
        .collect()
}

/// Convert a provider-style attribute name to the store's key format.
///
/// An underscore is inserted before an uppercase letter only when the
/// previous character was not uppercase, so runs of capitals stay together:
/// `InstanceType` → `instance_type`, `EBSOptimized` → `ebsoptimized`.
pub fn camelcase_to_underscores(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_upper = true;
    for ch in name.chars() {
        let upper = ch.is_uppercase();
        if upper && !prev_upper {
            out.push('_');
        }
        prev_upper = upper;
        if !ch.is_whitespace() {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

/// `(n, value)` for `n = 1, 2, …` while `key(n)` is present.
fn probe<'a, F>(raw: &'a RawParameters, key: F) -> impl Iterator<Item = (u32, &'a str)> + 'a
where
    F: Fn(u32) -> String + 'a,
{
    (1u32..).map_while(move |n| raw.first(&key(n)).map(|v| (n, v)))
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn parse_u32(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Ec2Error::invalid_value(name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Ec2Error::invalid_value(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camelcase_conversion() {
        assert_eq!(camelcase_to_underscores("InstanceType"), "instance_type");
        assert_eq!(camelcase_to_underscores("SourceDestCheck"), "source_dest_check");
        assert_eq!(camelcase_to_underscores("Kernel"), "kernel");
        assert_eq!(camelcase_to_underscores("EBSOptimized"), "ebsoptimized");
        assert_eq!(camelcase_to_underscores("EbsOptimized"), "ebs_optimized");
    }

    #[test]
    fn probe_stops_at_gap() {
        let raw: RawParameters = [("K.1", "a"), ("K.2", "b"), ("K.4", "d")].into_iter().collect();
        let found: Vec<_> = probe(&raw, |n| format!("K.{n}")).collect();
        assert_eq!(found, vec![(1, "a"), (2, "b")]);
    }

    #[test]
    fn parse_bool_is_case_insensitive_for_typed_flags() {
        assert!(parse_bool("X", "TRUE").unwrap());
        assert!(!parse_bool("X", "false").unwrap());
        assert!(parse_bool("X", "yes").is_err());
    }
}
