//! CLI-specific error types and exit code mapping

use testbed_core::error::{ContainerError, TestbedError};
use testbed_provisioner::ProvisionError;

/// CLI-specific error type.
///
/// `exit_code()` maps each variant to the process exit status.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from testbed-core.
    #[error("{0}")]
    Core(#[from] TestbedError),

    /// Provisioning failure.
    #[error("{0}")]
    Provision(#[from] ProvisionError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | General / command error          |
    /// | 2    | Configuration error              |
    /// | 3    | Container runtime unreachable    |
    /// | 4    | Service not ready within timeout |
    /// | 10   | IO error                         |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Core(e) => core_exit_code(e),
            Self::Provision(e) => match e {
                ProvisionError::RuntimeConnection(_) => 3,
                ProvisionError::StartupTimeout { .. } => 4,
                ProvisionError::Config { .. } => 2,
                ProvisionError::Archive(_) => 10,
                _ => 1,
            },
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

fn core_exit_code(err: &TestbedError) -> u8 {
    match err {
        TestbedError::Config(_) | TestbedError::InvalidName { .. } => 2,
        TestbedError::Container(ContainerError::Unreachable(_)) => 3,
        TestbedError::Container(ContainerError::StartupTimeout { .. }) => 4,
        TestbedError::Io(_) => 10,
        TestbedError::Container(_) => 1,
    }
}
