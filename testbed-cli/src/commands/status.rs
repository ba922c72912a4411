//! `testbed status` command handler

use std::io::Write;

use serde::Serialize;

use testbed_core::config::TestbedConfig;
use testbed_core::types::ContainerSummary;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, short_id};

/// Execute the `status` command.
pub async fn execute(
    args: StatusArgs,
    config: &TestbedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let project = super::existing_project(args.project, config)?;
    let provisioner = super::connect(config).await?;

    let containers = provisioner.project_status(&project).await?;
    let report = StatusReport::new(project.to_string(), containers, args.verbose);
    writer.render(&report)?;
    Ok(())
}

#[derive(Serialize)]
pub struct StatusReport {
    pub project: String,
    pub instances: Vec<InstanceStatus>,
    #[serde(skip)]
    pub verbose: bool,
}

#[derive(Serialize)]
pub struct InstanceStatus {
    pub name: String,
    pub service: String,
    pub state: String,
    pub image: String,
    pub id: String,
}

impl StatusReport {
    fn new(project: String, containers: Vec<ContainerSummary>, verbose: bool) -> Self {
        let mut instances: Vec<InstanceStatus> = containers
            .into_iter()
            .map(|c| InstanceStatus {
                service: c.service().unwrap_or("-").to_owned(),
                name: c.name,
                state: c.state,
                image: c.image,
                id: c.id,
            })
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            project,
            instances,
            verbose,
        }
    }
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.instances.is_empty() {
            writeln!(w, "Project {}: {}", self.project.bold(), "no instances".yellow())?;
            return Ok(());
        }

        writeln!(w, "Project {}", self.project.bold())?;
        writeln!(w)?;
        writeln!(w, "{:<32} {:<18} State", "Instance", "Service")?;
        writeln!(w, "{}", "-".repeat(64))?;
        for i in &self.instances {
            let state = match i.state.as_str() {
                "running" => i.state.green(),
                "exited" | "dead" => i.state.red(),
                _ => i.state.yellow(),
            };
            writeln!(w, "{:<32} {:<18} {state}", i.name, i.service)?;
            if self.verbose {
                writeln!(
                    w,
                    "  {}",
                    format!("id={} image={}", short_id(&i.id), i.image).dimmed()
                )?;
            }
        }
        Ok(())
    }
}
