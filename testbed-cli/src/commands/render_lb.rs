//! `testbed render-lb` command handler
//!
//! Prints the load balancer configuration without touching the runtime.

use std::io::Write;

use serde::Serialize;

use testbed_core::config::TestbedConfig;
use testbed_provisioner::render_nginx_config;

use crate::cli::RenderLbArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `render-lb` command.
pub fn execute(
    args: RenderLbArgs,
    config: &TestbedConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let upstreams = resolve_upstreams(args, config)?;
    let report = RenderReport {
        config: render_nginx_config(&upstreams),
        upstreams,
    };
    writer.render(&report)?;
    Ok(())
}

fn resolve_upstreams(args: RenderLbArgs, config: &TestbedConfig) -> Result<Vec<String>, CliError> {
    if !args.upstreams.is_empty() {
        return Ok(args.upstreams);
    }

    let replicas = args.replicas.unwrap_or(config.project.main_replicas);
    if replicas == 0 {
        return Err(CliError::Config(
            "at least one replica is required".to_owned(),
        ));
    }
    let project = super::existing_project(args.project, config)?;
    Ok((1..=replicas).map(|k| project.replica_alias(k)).collect())
}

#[derive(Serialize)]
pub struct RenderReport {
    pub upstreams: Vec<String>,
    pub config: String,
}

impl Render for RenderReport {
    /// 리다이렉트해서 그대로 쓸 수 있도록 설정 본문만 출력
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        write!(w, "{}", self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(project: Option<&str>, replicas: Option<usize>, upstreams: &[&str]) -> RenderLbArgs {
        RenderLbArgs {
            project: project.map(str::to_owned),
            replicas,
            upstreams: upstreams.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn test_explicit_upstreams_win() {
        let upstreams =
            resolve_upstreams(args(Some("demo"), Some(5), &["b", "a"]), &TestbedConfig::default())
                .expect("valid");
        assert_eq!(upstreams, ["b", "a"]);
    }

    #[test]
    fn test_replica_aliases_follow_project() {
        let upstreams = resolve_upstreams(args(Some("demo"), Some(3), &[]), &TestbedConfig::default())
            .expect("valid");
        assert_eq!(
            upstreams,
            ["demo-n8n-main-1", "demo-n8n-main-2", "demo-n8n-main-3"]
        );
    }

    #[test]
    fn test_replica_count_defaults_to_config() {
        let mut config = TestbedConfig::default();
        config.project.name = "cfg".to_owned();
        config.project.main_replicas = 1;
        let upstreams = resolve_upstreams(args(None, None, &[]), &config).expect("valid");
        assert_eq!(upstreams, ["cfg-n8n-main-1"]);
    }

    #[test]
    fn test_zero_replicas_rejected() {
        let err = resolve_upstreams(args(Some("demo"), Some(0), &[]), &TestbedConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_text_output_is_raw_config() {
        let report = RenderReport {
            upstreams: vec!["a".to_owned()],
            config: render_nginx_config(&["a"]),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        assert_eq!(String::from_utf8(buffer).expect("utf-8"), report.config);
    }
}
