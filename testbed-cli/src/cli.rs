//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// testbed -- ephemeral integration-test environment provisioner.
///
/// Use `testbed <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "testbed", version, about, long_about = None)]
pub struct Cli {
    /// Path to the testbed.toml configuration file.
    #[arg(short, long, default_value = "testbed.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the full stack and wait until every service is ready.
    Up(UpArgs),

    /// Remove every instance and the network of a project.
    Down(DownArgs),

    /// List instances labelled with a project.
    Status(StatusArgs),

    /// Print the load balancer configuration for N replicas.
    RenderLb(RenderLbArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- up ----

#[derive(Args, Debug, Default)]
pub struct UpArgs {
    /// Project name (default: config value, or a generated one).
    #[arg(short, long)]
    pub project: Option<String>,

    /// Number of main replicas behind the load balancer.
    #[arg(short, long)]
    pub replicas: Option<usize>,

    /// Always create fresh instances instead of reusing existing ones.
    #[arg(long)]
    pub no_reuse: bool,

    /// Also start the browser automation server.
    #[arg(long)]
    pub browser: bool,

    /// Also start the local inference server.
    #[arg(long)]
    pub ollama: bool,

    /// Model to pull into the inference server.
    #[arg(long)]
    pub model: Option<String>,

    /// Fixed host port for the load balancer.
    #[arg(long)]
    pub lb_port: Option<u16>,
}

// ---- down ----

#[derive(Args, Debug)]
pub struct DownArgs {
    /// Project name (default: config value).
    #[arg(short, long)]
    pub project: Option<String>,

    /// Report instances without removing them.
    #[arg(long)]
    pub keep: bool,
}

// ---- status ----

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Project name (default: config value).
    #[arg(short, long)]
    pub project: Option<String>,

    /// Show image and id per instance.
    #[arg(short, long)]
    pub verbose: bool,
}

// ---- render-lb ----

#[derive(Args, Debug)]
pub struct RenderLbArgs {
    /// Project name used to derive replica aliases.
    #[arg(short, long)]
    pub project: Option<String>,

    /// Number of replicas (ignored when --upstream is given).
    #[arg(short, long)]
    pub replicas: Option<usize>,

    /// Explicit upstream host names, in order.
    #[arg(long = "upstream")]
    pub upstreams: Vec<String>,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, docker, project, images, timeouts, services).
        #[arg(long)]
        section: Option<String>,
    },
}
