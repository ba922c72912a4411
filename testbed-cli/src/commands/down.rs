//! `testbed down` command handler

use std::io::Write;

use tracing::info;

use testbed_core::config::TestbedConfig;
use testbed_provisioner::TeardownReport;

use crate::cli::DownArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `down` command.
pub async fn execute(
    args: DownArgs,
    config: &TestbedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let project = super::existing_project(args.project, config)?;
    let provisioner = super::connect(config).await?;

    info!(project = %project, keep = args.keep, "tearing down project");
    let report = provisioner.teardown_project(&project, args.keep).await?;
    writer.render(&report)?;
    if !report.is_complete() {
        return Err(CliError::Command(format!(
            "teardown of '{project}' left {} resource(s) behind: {}",
            report.failed.len(),
            report.failed.join(", ")
        )));
    }
    Ok(())
}

impl Render for TeardownReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if !self.kept.is_empty() {
            writeln!(
                w,
                "Project {}: {} instance(s) kept",
                self.project.bold(),
                self.kept.len()
            )?;
            for name in &self.kept {
                writeln!(w, "  {} {name}", "kept".yellow())?;
            }
            return Ok(());
        }

        writeln!(
            w,
            "Project {}: {} instance(s) removed",
            self.project.bold(),
            self.removed.len()
        )?;
        for name in &self.removed {
            writeln!(w, "  {} {name}", "removed".red())?;
        }
        if self.network_removed {
            writeln!(w, "  {} {}-network", "removed".red(), self.project)?;
        }
        for name in &self.failed {
            writeln!(w, "  {} {name}", "failed".yellow().bold())?;
        }
        Ok(())
    }
}
