//! Filter predicate evaluation -- narrow resource listings by named filters.
//!
//! A [`FilterSet`] maps filter names to the values a resource may match:
//!
//! - values under one name are OR'ed
//! - distinct names are AND'ed
//! - matching is exact string equality
//!
//! Each filter name resolves to an accessor over the resource through a static
//! table (see [`INSTANCE_FILTERS`]). A resource can yield several values for one
//! name (e.g. every security group it belongs to) and passes that name when any
//! of them is in the accepted set.
//!
//! # Unknown names
//!
//! A name with no accessor is an [`Ec2Error::UnsupportedFilter`]. Names are
//! resolved before any resource is inspected, so the error does not depend on
//! what the store happens to hold.

use serde::Serialize;
use tracing::debug;

use crate::error::{Ec2Error, Result};
use crate::model::{Instance, Reservation};

/// Filter name → accepted values, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSet {
    entries: Vec<(String, Vec<String>)>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add values under `name`. A repeated name extends its existing entry.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.extend(values),
            None => self.entries.push((name, values)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Vec<String>)> for FilterSet {
    fn from_iter<I: IntoIterator<Item = (N, Vec<String>)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, values) in iter {
            set.insert(name, values);
        }
        set
    }
}

/// A resource that can be narrowed by a [`FilterSet`].
pub trait Filterable {
    /// Resolved accessor for one filter name.
    type Accessor;

    /// Map a filter name to its accessor, or `None` if the name is unknown.
    fn resolve(name: &str) -> Option<Self::Accessor>;

    /// Every value this resource yields for `accessor`.
    fn extract(&self, accessor: &Self::Accessor) -> Vec<String>;
}

/// Keep the resources that pass every filter in `filters`.
///
/// Input order is preserved and the result is idempotent: applying the same
/// set again returns the same resources.
pub fn apply<T>(resources: &[T], filters: &FilterSet) -> Result<Vec<T>>
where
    T: Filterable + Clone,
{
    let compiled = compile::<T>(filters)?;
    Ok(resources
        .iter()
        .filter(|resource| matches_all(*resource, &compiled))
        .cloned()
        .collect())
}

/// Narrow each reservation to its matching instances, dropping reservations
/// left with none.
pub fn filter_reservations(
    reservations: Vec<Reservation>,
    filters: &FilterSet,
) -> Result<Vec<Reservation>> {
    if filters.is_empty() {
        return Ok(reservations);
    }
    let compiled = compile::<Instance>(filters)?;
    let before = reservations.len();
    let kept: Vec<Reservation> = reservations
        .into_iter()
        .filter_map(|mut reservation| {
            reservation
                .instances
                .retain(|instance| matches_all(instance, &compiled));
            (!reservation.instances.is_empty()).then_some(reservation)
        })
        .collect();
    debug!(filters = filters.len(), before, after = kept.len(), "filtered reservations");
    Ok(kept)
}

fn compile<'f, T: Filterable>(filters: &'f FilterSet) -> Result<Vec<(T::Accessor, &'f [String])>> {
    filters
        .iter()
        .map(|(name, values)| {
            T::resolve(name)
                .map(|accessor| (accessor, values))
                .ok_or_else(|| Ec2Error::UnsupportedFilter(name.to_string()))
        })
        .collect()
}

fn matches_all<T: Filterable>(resource: &T, compiled: &[(T::Accessor, &[String])]) -> bool {
    compiled.iter().all(|(accessor, accepted)| {
        resource
            .extract(accessor)
            .iter()
            .any(|value| accepted.contains(value))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance accessors
// ─────────────────────────────────────────────────────────────────────────────

type InstanceField = fn(&Instance) -> Vec<String>;

/// Filter names understood for instances, with their field extractors.
pub const INSTANCE_FILTERS: &[(&str, InstanceField)] = &[
    ("instance-id", |i| vec![i.id.clone()]),
    ("instance-type", |i| vec![i.instance_type.clone()]),
    ("instance-state-name", |i| vec![i.state.name().to_string()]),
    ("instance-state-code", |i| vec![i.state.code().to_string()]),
    ("image-id", |i| vec![i.image_id.clone()]),
    ("key-name", |i| i.key_name.iter().cloned().collect()),
    ("reservation-id", |i| vec![i.reservation_id.clone()]),
    ("subnet-id", |i| {
        i.subnet_id
            .iter()
            .cloned()
            .chain(i.nics.values().map(|n| n.subnet_id.clone()))
            .collect()
    }),
    ("vpc-id", |i| i.nics.values().map(|n| n.vpc_id.clone()).collect()),
    ("private-ip-address", |i| {
        i.nics.values().map(|n| n.private_ip_address.clone()).collect()
    }),
    ("ip-address", |i| {
        i.nics.values().filter_map(|n| n.public_ip.clone()).collect()
    }),
    ("availability-zone", |i| vec![i.availability_zone.clone()]),
    ("group-id", |i| i.groups.iter().map(|g| g.id.clone()).collect()),
    ("group-name", |i| i.groups.iter().map(|g| g.name.clone()).collect()),
    ("instance.group-id", |i| i.groups.iter().map(|g| g.id.clone()).collect()),
    ("instance.group-name", |i| i.groups.iter().map(|g| g.name.clone()).collect()),
    ("network-interface.network-interface-id", |i| {
        i.nics.values().map(|n| n.id.clone()).collect()
    }),
    ("block-device-mapping.device-name", |i| {
        i.block_device_mapping.keys().cloned().collect()
    }),
    ("source-dest-check", |i| vec![i.source_dest_check.to_string()]),
    ("architecture", |i| vec![i.architecture.clone()]),
    ("tag-key", |i| i.tags.keys().cloned().collect()),
    ("tag-value", |i| i.tags.values().cloned().collect()),
];

/// How an instance filter name was resolved.
#[derive(Debug, Clone)]
pub enum InstanceAccessor {
    Field(InstanceField),
    /// `tag:<Key>` -- the value of one tag.
    Tag(String),
}

impl Filterable for Instance {
    type Accessor = InstanceAccessor;

    fn resolve(name: &str) -> Option<InstanceAccessor> {
        if let Some(key) = name.strip_prefix("tag:") {
            return Some(InstanceAccessor::Tag(key.to_string()));
        }
        INSTANCE_FILTERS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, field)| InstanceAccessor::Field(field))
    }

    fn extract(&self, accessor: &InstanceAccessor) -> Vec<String> {
        match accessor {
            InstanceAccessor::Field(field) => field(self),
            InstanceAccessor::Tag(key) => self.tags.get(key).cloned().into_iter().collect(),
        }
    }
}
