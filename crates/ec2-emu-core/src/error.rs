//! Error types for request decoding, dispatch and store operations.

use thiserror::Error;

/// Errors surfaced to a caller of the emulated instance API.
///
/// Every variant maps to a provider error code via [`Ec2Error::code`], which is
/// what ends up in the `<Code>` element of a rendered error response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Ec2Error {
    /// A required field of an otherwise-detected request group is missing,
    /// or the request body itself could not be parsed.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The request decoded cleanly but nothing claims to implement it.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A referenced resource does not exist in the store.
    /// `kind` selects the provider error code.
    #[error("The {kind} '{id}' does not exist")]
    ResourceNotFound { kind: ResourceKind, id: String },

    /// A filter name with no known accessor.
    #[error("The filter '{0}' is not supported")]
    UnsupportedFilter(String),

    /// A required top-level parameter is absent.
    #[error("The request must contain the parameter {0}")]
    MissingParameter(String),

    /// A parameter was present but its value could not be interpreted.
    #[error("Value ({value}) for parameter {name} is invalid")]
    InvalidParameterValue { name: String, value: String },

    /// Parameters that are individually valid but cannot be combined.
    #[error("{0}")]
    InvalidParameterCombination(String),

    /// The `Action` parameter named an operation this emulator does not know.
    #[error("The action {0} is not valid for this web service")]
    InvalidAction(String),

    /// The store refused a state transition.
    #[error("{0}")]
    OperationNotPermitted(String),

    /// The instance is in a state that does not allow the operation.
    #[error("The instance '{id}' is not in a state from which it can be {operation}")]
    IncorrectInstanceState { id: String, operation: &'static str },
}

/// Resource families that can be reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Instance,
    SecurityGroup,
    Subnet,
    BlockDeviceMapping,
}

impl ResourceKind {
    /// Provider error code for a missing resource of this kind.
    pub fn not_found_code(self) -> &'static str {
        match self {
            ResourceKind::Instance => "InvalidInstanceID.NotFound",
            ResourceKind::SecurityGroup => "InvalidGroup.NotFound",
            ResourceKind::Subnet => "InvalidSubnetID.NotFound",
            ResourceKind::BlockDeviceMapping => "InvalidBlockDeviceMapping.NotFound",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ResourceKind::Instance => "instance ID",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::Subnet => "subnet ID",
            ResourceKind::BlockDeviceMapping => "block device mapping",
        };
        f.write_str(label)
    }
}

impl Ec2Error {
    pub fn malformed(message: impl Into<String>) -> Self {
        Ec2Error::MalformedRequest(message.into())
    }

    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Ec2Error::ResourceNotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Ec2Error::InvalidParameterValue {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Provider error code rendered into the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Ec2Error::MalformedRequest(_) => "MalformedQueryString",
            Ec2Error::UnsupportedOperation(_) => "NotImplemented",
            Ec2Error::ResourceNotFound { kind, .. } => kind.not_found_code(),
            Ec2Error::UnsupportedFilter(_) => "InvalidParameterValue",
            Ec2Error::MissingParameter(_) => "MissingParameter",
            Ec2Error::InvalidParameterValue { .. } => "InvalidParameterValue",
            Ec2Error::InvalidParameterCombination(_) => "InvalidParameterCombination",
            Ec2Error::InvalidAction(_) => "InvalidAction",
            Ec2Error::OperationNotPermitted(_) => "OperationNotPermitted",
            Ec2Error::IncorrectInstanceState { .. } => "IncorrectInstanceState",
        }
    }

    /// `true` for errors caused by the request itself (HTTP 400 class),
    /// `false` for "understood, but not implemented here".
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Ec2Error::UnsupportedOperation(_))
    }
}

/// Convenience alias used throughout ec2-emu-core.
pub type Result<T> = std::result::Result<T, Ec2Error>;
