//! Command handlers -- one module per subcommand

pub mod config;
pub mod down;
pub mod render_lb;
pub mod status;
pub mod up;

use std::sync::Arc;

use testbed_core::config::TestbedConfig;
use testbed_core::types::ProjectName;
use testbed_provisioner::{BollardRuntime, ContainerRuntime, Provisioner, ProvisionerConfig};
use tracing::debug;

use crate::error::CliError;

/// Connect to the container runtime and build a provisioner from the config.
pub(crate) async fn connect(config: &TestbedConfig) -> Result<Provisioner<BollardRuntime>, CliError> {
    let runtime = BollardRuntime::connect(&config.docker)?;
    runtime.ping().await?;
    debug!(socket = %config.docker.socket, "container runtime reachable");
    let provisioner = Provisioner::new(Arc::new(runtime), ProvisionerConfig::from_core(config))?;
    Ok(provisioner)
}

/// Project name from the flag or the config file. Commands that act on an
/// existing project cannot fall back to a generated name.
pub(crate) fn existing_project(
    flag: Option<String>,
    config: &TestbedConfig,
) -> Result<ProjectName, CliError> {
    let name = flag.unwrap_or_else(|| config.project.name.clone());
    if name.is_empty() {
        return Err(CliError::Config(
            "project name required (--project or [project].name)".to_owned(),
        ));
    }
    Ok(ProjectName::new(name)?)
}
