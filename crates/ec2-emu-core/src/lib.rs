//! # ec2-emu-core
//!
//! Request handling for an emulated EC2 instance control plane: query-protocol
//! requests in, provider-shaped XML (or the same views as JSON) out, against an
//! in-memory resource store.
//!
//! ## Quick start
//!
//! ```rust
//! use ec2_emu_core::{handle_request, render_response, EmulatorConfig, InMemoryStore, RawParameters};
//!
//! let config = EmulatorConfig::default();
//! let store = InMemoryStore::new(config.clone());
//!
//! let raw: RawParameters = "Action=RunInstances&ImageId=ami-1234abcd&MinCount=1&MaxCount=1"
//!     .parse()
//!     .unwrap();
//! let response = handle_request(&store, &config, &raw).unwrap();
//! let xml = render_response(&response);
//! assert!(xml.contains("<name>pending</name>"));
//!
//! let raw: RawParameters = "Action=DescribeInstances&Filter.1.Name=instance-state-name&Filter.1.Value.1=running"
//!     .parse()
//!     .unwrap();
//! let response = handle_request(&store, &config, &raw).unwrap();
//! assert!(render_response(&response).contains("<instanceId>i-00000001</instanceId>"));
//! ```
//!
//! ## Modules
//!
//! - [`params`]: form-encoded body → ordered `RawParameters`
//! - [`decoder`]: indexed keys (`Filter.N.Value.M`, …) → typed requests
//! - [`filter`]: filter sets and the instance filter table
//! - [`dispatch`]: `ModifyInstanceAttribute` handler chain
//! - [`store`]: `ResourceStore` trait and `InMemoryStore`
//! - [`action`]: `Action` routing (`handle_request`)
//! - [`response`]: serializable response views
//! - [`render`]: views → provider XML, errors → XML envelope
//! - [`model`]: instances, reservations, interfaces, devices
//! - [`config`]: `EmulatorConfig` and placeholder values
//! - [`error`]: `Ec2Error` and provider error codes

pub mod action;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod model;
pub mod params;
pub mod render;
pub mod response;
pub mod store;

pub use action::{handle_request, Action};
pub use config::EmulatorConfig;
pub use decoder::{camelcase_to_underscores, RunInstancesRequest};
pub use dispatch::{AttributeMutation, HandlerOutcome};
pub use error::{Ec2Error, ResourceKind, Result};
pub use filter::{FilterSet, Filterable};
pub use model::{Instance, InstanceState, Reservation};
pub use params::RawParameters;
pub use render::{render_error, render_response};
pub use response::Response;
pub use store::{InMemoryStore, ResourceStore, StoreSnapshot};
