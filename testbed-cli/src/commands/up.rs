//! `testbed up` command handler

use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use testbed_core::config::TestbedConfig;
use testbed_core::types::ServiceHandle;
use testbed_provisioner::{Stack, StackSpec};

use crate::cli::UpArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, short_id};

/// Execute the `up` command.
pub async fn execute(
    args: UpArgs,
    mut config: TestbedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    let spec = StackSpec::from_config(&config)?;
    let provisioner = super::connect(&config).await?;

    info!(project = %spec.project, replicas = spec.main_replicas, "bringing stack up");
    let stack = match provisioner.provision_stack(&spec).await {
        Ok(stack) => stack,
        Err(e) => {
            warn!(
                project = %spec.project,
                "stack failed, started instances are kept; run `testbed down --project {}`",
                spec.project
            );
            return Err(e.into());
        }
    };

    writer.render(&UpReport::from(&stack))?;
    Ok(())
}

/// CLI flags take precedence over file and environment values.
fn apply_overrides(config: &mut TestbedConfig, args: &UpArgs) {
    if let Some(project) = &args.project {
        config.project.name = project.clone();
    }
    if let Some(replicas) = args.replicas {
        config.project.main_replicas = replicas;
    }
    if args.no_reuse {
        config.project.reuse = false;
    }
    if let Some(port) = args.lb_port {
        config.project.lb_host_port = port;
    }
    if args.browser {
        config.services.browser = true;
    }
    if args.ollama {
        config.services.ollama = true;
    }
    if let Some(model) = &args.model {
        config.services.ollama_model = model.clone();
    }
}

#[derive(Serialize)]
pub struct UpReport {
    pub project: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelStatus>,
    pub services: Vec<ServiceRow>,
}

#[derive(Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub ready: bool,
}

#[derive(Serialize)]
pub struct ServiceRow {
    pub name: String,
    pub alias: String,
    pub container_id: String,
    /// `container->host` 포트 쌍
    pub ports: Vec<String>,
    pub reused: bool,
}

impl From<&ServiceHandle> for ServiceRow {
    fn from(handle: &ServiceHandle) -> Self {
        Self {
            name: handle.name.clone(),
            alias: handle.alias.clone(),
            container_id: handle.container_id.clone(),
            ports: handle
                .ports
                .iter()
                .map(|p| format!("{}->{}", p.container, p.host))
                .collect(),
            reused: handle.reused,
        }
    }
}

impl From<&Stack> for UpReport {
    fn from(stack: &Stack) -> Self {
        Self {
            project: stack.project.to_string(),
            network: stack.network.name.clone(),
            entry_url: stack.entry_url(),
            database_url: stack.database.connection_url(),
            model: stack.inference.as_ref().map(|i| ModelStatus {
                name: i.model.clone(),
                ready: i.model_ready,
            }),
            services: stack.handles().into_iter().map(ServiceRow::from).collect(),
        }
    }
}

impl Render for UpReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Stack {} is {}", self.project.bold(), "ready".green().bold())?;
        if let Some(url) = &self.entry_url {
            writeln!(w, "  Entry:    {}", url.cyan())?;
        }
        if let Some(url) = &self.database_url {
            writeln!(w, "  Database: {url}")?;
        }
        if let Some(model) = &self.model {
            let state = if model.ready {
                "ready".green()
            } else {
                "unavailable".yellow()
            };
            writeln!(w, "  Model:    {} ({state})", model.name)?;
        }

        writeln!(w)?;
        writeln!(w, "{:<32} {:<12} {:<22} Origin", "Service", "ID", "Ports")?;
        writeln!(w, "{}", "-".repeat(80))?;
        for s in &self.services {
            let origin = if s.reused {
                "reused".dimmed()
            } else {
                "created".green()
            };
            writeln!(
                w,
                "{:<32} {:<12} {:<22} {origin}",
                s.name,
                short_id(&s.container_id),
                s.ports.join(",")
            )?;
        }
        Ok(())
    }
}
