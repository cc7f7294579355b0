//! Resource store: the interface the request layer drives, and an in-memory
//! implementation of it.
//!
//! [`ResourceStore`] is the only shared-state boundary. Decoding, filtering and
//! dispatch never hold state of their own; they call into a store and package
//! what comes back.
//!
//! [`InMemoryStore`] guards all state with a single `RwLock`, so each call is
//! atomic with respect to every other call: a `terminate` racing a `describe`
//! is observed either before or after, never half-applied. Multi-id operations
//! validate every id before mutating anything.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EmulatorConfig;
use crate::decoder::{BlockDeviceOverride, NetworkInterfaceSpec, RunInstancesRequest};
use crate::error::{Ec2Error, ResourceKind, Result};
use crate::model::{
    BlockDevice, Instance, InstanceState, NetworkInterface, Reservation, SecurityGroup,
    StateChange, Subnet,
};

/// Root device created for every launched instance.
pub const ROOT_DEVICE_NAME: &str = "/dev/sda1";

/// Operations the request layer needs from a resource store.
pub trait ResourceStore {
    /// Reservations holding any of `ids`, each narrowed to the requested
    /// instances. Fails if any id is unknown.
    fn reservations_by_instance_ids(&self, ids: &[String]) -> Result<Vec<Reservation>>;

    fn all_reservations(&self) -> Vec<Reservation>;

    /// Instances for `ids`, in request order. Fails if any id is unknown.
    fn instances_by_ids(&self, ids: &[String]) -> Result<Vec<Instance>>;

    fn all_instances(&self) -> Vec<Instance>;

    /// Launch `request.min_count` instances in a new reservation.
    fn add_instances(&self, request: &RunInstancesRequest) -> Result<Reservation>;

    fn terminate_instances(&self, ids: &[String]) -> Result<Vec<StateChange>>;
    fn reboot_instances(&self, ids: &[String]) -> Result<Vec<StateChange>>;
    fn stop_instances(&self, ids: &[String]) -> Result<Vec<StateChange>>;
    fn start_instances(&self, ids: &[String]) -> Result<Vec<StateChange>>;

    /// Read one scalar attribute by normalized key.
    fn instance_attribute(&self, id: &str, key: &str) -> Result<(Instance, String)>;

    /// Write one scalar attribute by normalized key.
    fn modify_instance_attribute(&self, id: &str, key: &str, value: &str) -> Result<()>;

    /// Set delete-on-termination on existing device mappings, addressed by
    /// device name. All-or-nothing: an unknown device fails the whole batch.
    fn update_block_devices(&self, id: &str, overrides: &[BlockDeviceOverride]) -> Result<()>;
}

/// Serializable state of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub reservations: Vec<Reservation>,
    pub security_groups: Vec<SecurityGroup>,
    pub subnets: Vec<Subnet>,
    /// Next sequence number per id prefix.
    pub next_ids: BTreeMap<String, u64>,
    /// Next host offset per subnet id.
    pub next_hosts: BTreeMap<String, u32>,
}

/// Thread-safe in-memory [`ResourceStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    config: EmulatorConfig,
    state: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    /// An empty store seeded with the configured security groups and subnets.
    pub fn new(config: EmulatorConfig) -> Self {
        let snapshot = StoreSnapshot {
            security_groups: config.security_groups.clone(),
            subnets: config.subnets.clone(),
            ..StoreSnapshot::default()
        };
        Self::from_snapshot(config, snapshot)
    }

    /// Restore a store from a previously taken snapshot.
    pub fn from_snapshot(config: EmulatorConfig, snapshot: StoreSnapshot) -> Self {
        Self {
            config,
            state: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.read().clone()
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Set tags on instances. Fails without changes if any id is unknown.
    pub fn create_tags(&self, ids: &[String], tags: &[(String, String)]) -> Result<()> {
        let mut state = self.write();
        ensure_known(&state, ids)?;
        for id in ids {
            if let Some(instance) = find_mut(&mut state, id) {
                for (key, value) in tags {
                    instance.tags.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `next` to every instance in `ids` after `allowed` has accepted
    /// all of them.
    fn transition(
        &self,
        ids: &[String],
        operation: &'static str,
        allowed: fn(&Instance, &'static str) -> Result<()>,
        next: fn(InstanceState) -> InstanceState,
    ) -> Result<Vec<StateChange>> {
        let mut state = self.write();
        ensure_known(&state, ids)?;
        for id in ids {
            if let Some(instance) = find(&state, id) {
                allowed(instance, operation)?;
            }
        }

        let mut changes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = find_mut(&mut state, id) {
                let previous = instance.state;
                instance.state = next(previous);
                changes.push(StateChange {
                    instance_id: id.clone(),
                    previous,
                    current: instance.state,
                });
            }
        }
        info!(operation, count = changes.len(), "instance state transition");
        Ok(changes)
    }
}

impl ResourceStore for InMemoryStore {
    fn reservations_by_instance_ids(&self, ids: &[String]) -> Result<Vec<Reservation>> {
        let state = self.read();
        ensure_known(&state, ids)?;
        Ok(state
            .reservations
            .iter()
            .filter_map(|reservation| {
                let instances: Vec<Instance> = reservation
                    .instances
                    .iter()
                    .filter(|i| ids.contains(&i.id))
                    .cloned()
                    .collect();
                (!instances.is_empty()).then(|| Reservation {
                    instances,
                    ..reservation.clone()
                })
            })
            .collect())
    }

    fn all_reservations(&self) -> Vec<Reservation> {
        self.read().reservations.clone()
    }

    fn instances_by_ids(&self, ids: &[String]) -> Result<Vec<Instance>> {
        let state = self.read();
        ids.iter()
            .map(|id| {
                find(&state, id)
                    .cloned()
                    .ok_or_else(|| Ec2Error::not_found(ResourceKind::Instance, id.clone()))
            })
            .collect()
    }

    fn all_instances(&self) -> Vec<Instance> {
        self.read()
            .reservations
            .iter()
            .flat_map(|r| r.instances.iter().cloned())
            .collect()
    }

    fn add_instances(&self, request: &RunInstancesRequest) -> Result<Reservation> {
        if let Some(spec) = request
            .network_interfaces
            .iter()
            .find(|spec| spec.network_interface_id.is_some())
        {
            return Err(Ec2Error::UnsupportedOperation(format!(
                "attaching existing network interface in NetworkInterface.{}",
                spec.index
            )));
        }

        let mut guard = self.write();
        let mut state = guard.clone();
        let groups = resolve_groups(&state, request)?;
        let request_subnet = request
            .subnet_id
            .as_deref()
            .map(|id| find_subnet(&state, id).cloned())
            .transpose()?;

        let reservation_id = next_id(&mut state, "r");
        let now = Utc::now();
        let mut instances = Vec::with_capacity(request.min_count as usize);

        for _ in 0..request.min_count {
            let instance_id = next_id(&mut state, "i");

            let mut nics = BTreeMap::new();
            if request.network_interfaces.is_empty() {
                if let Some(subnet) = &request_subnet {
                    let primary = NetworkInterfaceSpec {
                        private_ip_address: request.private_ip_address.clone(),
                        associate_public_ip_address: request.associate_public_ip_address,
                        ..NetworkInterfaceSpec::default()
                    };
                    let nic = build_nic(&mut state, &self.config, &primary, subnet, &groups)?;
                    nics.insert(nic.device_index, nic);
                }
            } else {
                for spec in &request.network_interfaces {
                    let subnet_id = spec
                        .subnet_id
                        .as_deref()
                        .or(request.subnet_id.as_deref())
                        .ok_or_else(|| {
                            Ec2Error::MissingParameter(format!(
                                "NetworkInterface.{}.SubnetId",
                                spec.index
                            ))
                        })?;
                    let subnet = find_subnet(&state, subnet_id)?.clone();
                    let nic_groups = if spec.security_group_ids.is_empty() {
                        groups.clone()
                    } else {
                        spec.security_group_ids
                            .iter()
                            .map(|id| find_group_by_id(&state, id).cloned())
                            .collect::<Result<Vec<_>>>()?
                    };
                    let nic = build_nic(&mut state, &self.config, spec, &subnet, &nic_groups)?;
                    nics.insert(nic.device_index, nic);
                }
            }

            let subnet_id = request
                .subnet_id
                .clone()
                .or_else(|| nics.values().next().map(|n| n.subnet_id.clone()));
            let availability_zone = subnet_id
                .as_deref()
                .and_then(|id| state.subnets.iter().find(|s| s.id == id))
                .map(|s| s.availability_zone.clone())
                .unwrap_or_else(|| self.config.availability_zone.clone());

            let mut block_device_mapping = BTreeMap::new();
            block_device_mapping.insert(
                ROOT_DEVICE_NAME.to_string(),
                BlockDevice {
                    volume_id: next_id(&mut state, "vol"),
                    status: "attached".into(),
                    attach_time: now,
                    delete_on_termination: true,
                },
            );

            instances.push(Instance {
                id: instance_id,
                reservation_id: reservation_id.clone(),
                image_id: request.image_id.clone(),
                state: InstanceState::Running,
                instance_type: request.instance_type.clone(),
                key_name: request.key_name.clone(),
                user_data: request.user_data.clone(),
                groups: groups.clone(),
                subnet_id,
                availability_zone,
                nics,
                block_device_mapping,
                tags: BTreeMap::new(),
                kernel: self.config.default_kernel.clone(),
                ramdisk: None,
                architecture: self.config.default_architecture.clone(),
                virtualization_type: "paravirtual".into(),
                platform: None,
                root_device_name: ROOT_DEVICE_NAME.into(),
                source_dest_check: true,
                disable_api_termination: false,
                instance_initiated_shutdown_behavior: "stop".into(),
                ebs_optimized: false,
                launch_time: now,
            });
        }

        let reservation = Reservation {
            id: reservation_id,
            owner_id: self.config.owner_id.clone(),
            instances,
        };
        state.reservations.push(reservation.clone());
        *guard = state;
        info!(
            reservation_id = %reservation.id,
            count = reservation.instances.len(),
            image_id = %request.image_id,
            "launched instances"
        );
        Ok(reservation)
    }

    fn terminate_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        self.transition(
            ids,
            "terminated",
            |instance, _| {
                if instance.disable_api_termination {
                    return Err(Ec2Error::OperationNotPermitted(format!(
                        "The instance '{}' may not be terminated. Modify its \
                         'disableApiTermination' instance attribute and try again.",
                        instance.id
                    )));
                }
                Ok(())
            },
            |_| InstanceState::Terminated,
        )
    }

    fn reboot_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        self.transition(ids, "rebooted", refuse_terminated, |s| s)
    }

    fn stop_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        self.transition(ids, "stopped", refuse_terminated, |_| InstanceState::Stopped)
    }

    fn start_instances(&self, ids: &[String]) -> Result<Vec<StateChange>> {
        self.transition(ids, "started", refuse_terminated, |_| InstanceState::Running)
    }

    fn instance_attribute(&self, id: &str, key: &str) -> Result<(Instance, String)> {
        let state = self.read();
        let instance = find(&state, id)
            .ok_or_else(|| Ec2Error::not_found(ResourceKind::Instance, id))?;
        let value = instance.attribute(key)?;
        Ok((instance.clone(), value))
    }

    fn modify_instance_attribute(&self, id: &str, key: &str, value: &str) -> Result<()> {
        let mut state = self.write();
        if key == "group_set" {
            let groups = value
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(|g| find_group_by_id(&state, g).cloned())
                .collect::<Result<Vec<_>>>()?;
            let instance = find_mut(&mut state, id)
                .ok_or_else(|| Ec2Error::not_found(ResourceKind::Instance, id))?;
            instance.groups = groups;
        } else {
            let instance = find_mut(&mut state, id)
                .ok_or_else(|| Ec2Error::not_found(ResourceKind::Instance, id))?;
            instance.set_attribute(key, value)?;
        }
        info!(instance_id = id, key, "modified instance attribute");
        Ok(())
    }

    fn update_block_devices(&self, id: &str, overrides: &[BlockDeviceOverride]) -> Result<()> {
        let mut state = self.write();
        let instance = find_mut(&mut state, id)
            .ok_or_else(|| Ec2Error::not_found(ResourceKind::Instance, id))?;

        if let Some(missing) = overrides
            .iter()
            .find(|o| !instance.block_device_mapping.contains_key(&o.device_name))
        {
            return Err(Ec2Error::not_found(
                ResourceKind::BlockDeviceMapping,
                missing.device_name.clone(),
            ));
        }
        for o in overrides {
            if let Some(device) = instance.block_device_mapping.get_mut(&o.device_name) {
                device.delete_on_termination = o.delete_on_termination;
            }
        }
        info!(instance_id = id, devices = overrides.len(), "updated block device mapping");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers over the locked state
// ─────────────────────────────────────────────────────────────────────────────

fn find<'s>(state: &'s StoreSnapshot, id: &str) -> Option<&'s Instance> {
    state
        .reservations
        .iter()
        .flat_map(|r| r.instances.iter())
        .find(|i| i.id == id)
}

fn find_mut<'s>(state: &'s mut StoreSnapshot, id: &str) -> Option<&'s mut Instance> {
    state
        .reservations
        .iter_mut()
        .flat_map(|r| r.instances.iter_mut())
        .find(|i| i.id == id)
}

fn ensure_known(state: &StoreSnapshot, ids: &[String]) -> Result<()> {
    match ids.iter().find(|id| find(state, id).is_none()) {
        Some(id) => Err(Ec2Error::not_found(ResourceKind::Instance, id.clone())),
        None => Ok(()),
    }
}

fn refuse_terminated(instance: &Instance, operation: &'static str) -> Result<()> {
    if instance.state == InstanceState::Terminated {
        return Err(Ec2Error::IncorrectInstanceState {
            id: instance.id.clone(),
            operation,
        });
    }
    Ok(())
}

fn find_subnet<'s>(state: &'s StoreSnapshot, id: &str) -> Result<&'s Subnet> {
    state
        .subnets
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| Ec2Error::not_found(ResourceKind::Subnet, id))
}

fn find_group_by_id<'s>(state: &'s StoreSnapshot, id: &str) -> Result<&'s SecurityGroup> {
    state
        .security_groups
        .iter()
        .find(|g| g.id == id)
        .ok_or_else(|| Ec2Error::not_found(ResourceKind::SecurityGroup, id))
}

/// Groups named by the request, or the `default` group when none are.
fn resolve_groups(state: &StoreSnapshot, request: &RunInstancesRequest) -> Result<Vec<SecurityGroup>> {
    let mut groups = Vec::new();
    for name in &request.security_group_names {
        let group = state
            .security_groups
            .iter()
            .find(|g| &g.name == name)
            .ok_or_else(|| Ec2Error::not_found(ResourceKind::SecurityGroup, name.clone()))?;
        groups.push(group.clone());
    }
    for id in &request.security_group_ids {
        groups.push(find_group_by_id(state, id)?.clone());
    }
    if groups.is_empty() {
        groups.extend(
            state
                .security_groups
                .iter()
                .find(|g| g.name == "default")
                .cloned(),
        );
    }
    Ok(groups)
}

fn next_id(state: &mut StoreSnapshot, prefix: &str) -> String {
    let counter = state.next_ids.entry(prefix.to_string()).or_insert(1);
    let id = format!("{prefix}-{:08x}", *counter);
    *counter += 1;
    id
}

/// Network address and prefix length of `subnet`'s CIDR block.
fn subnet_range(subnet: &Subnet) -> (u32, u32) {
    let (addr, prefix) = subnet
        .cidr_block
        .split_once('/')
        .unwrap_or((subnet.cidr_block.as_str(), "32"));
    let base = addr
        .parse::<Ipv4Addr>()
        .map(u32::from)
        .unwrap_or(u32::from(Ipv4Addr::new(10, 0, 0, 0)));
    let prefix = prefix.parse::<u32>().unwrap_or(32).min(32);
    (base, prefix)
}

fn in_subnet(ip: Ipv4Addr, subnet: &Subnet) -> bool {
    let (base, prefix) = subnet_range(subnet);
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    u32::from(ip) & mask == base & mask
}

/// Next free host address in `subnet`. Offsets 0-3 are reserved.
fn allocate_ip(state: &mut StoreSnapshot, subnet: &Subnet) -> String {
    let (base, _) = subnet_range(subnet);
    let offset = state.next_hosts.entry(subnet.id.clone()).or_insert(4);
    let addr = Ipv4Addr::from(base.wrapping_add(*offset));
    *offset += 1;
    addr.to_string()
}

fn build_nic(
    state: &mut StoreSnapshot,
    config: &EmulatorConfig,
    spec: &NetworkInterfaceSpec,
    subnet: &Subnet,
    groups: &[SecurityGroup],
) -> Result<NetworkInterface> {
    let private_ip_address = match &spec.private_ip_address {
        Some(ip) => {
            let addr = ip
                .parse::<Ipv4Addr>()
                .map_err(|_| Ec2Error::invalid_value("PrivateIpAddress", ip.clone()))?;
            if !in_subnet(addr, subnet) {
                return Err(Ec2Error::invalid_value("PrivateIpAddress", ip.clone()));
            }
            ip.clone()
        }
        None => allocate_ip(state, subnet),
    };
    let public_ip = spec
        .associate_public_ip_address
        .unwrap_or(false)
        .then(|| config.placeholders.public_ip.clone());
    let nic = NetworkInterface {
        id: next_id(state, "eni"),
        subnet_id: subnet.id.clone(),
        vpc_id: subnet.vpc_id.clone(),
        private_ip_address,
        public_ip,
        device_index: spec.device_index,
        attachment_id: next_id(state, "eni-attach"),
        description: spec.description.clone(),
        groups: groups.to_vec(),
        delete_on_termination: spec.delete_on_termination.unwrap_or(true),
    };
    debug!(nic_id = %nic.id, subnet_id = %nic.subnet_id, ip = %nic.private_ip_address, "created network interface");
    Ok(nic)
}
