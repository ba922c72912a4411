#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 (`ProvisionError`)
//! - [`config`]: 프로비저너 설정 (`ProvisionerConfig`, builder)
//! - [`docker`]: 런타임 추상화 (`ContainerRuntime` trait, `BollardRuntime`)
//! - [`archive`]: 파일 복사용 tar 생성
//! - [`readiness`]: 준비 상태 게이트 (`ReadinessGate`)
//! - [`proxy`]: nginx 설정 생성 (`render_nginx_config`)
//! - [`provisioner`]: 공통 프로비저닝 흐름 (`Provisioner`, `ProjectScope`)
//! - [`services`]: 서비스별 규칙 (cache, database, replica, load balancer, browser, inference)
//! - [`topology`]: 스택 오케스트레이션과 teardown (`StackSpec`, `Stack`)
//!
//! # Architecture
//!
//! ```text
//! StackSpec --provision_stack--> Provisioner
//!                                    |
//!                          services::*_descriptor()
//!                                    |
//!                          Provisioner::provision()
//!                                    |
//!                  ContainerRuntime (find/create/copy/start)
//!                                    |
//!                             ReadinessGate.wait()
//!                                    |
//!                              ServiceHandle
//! ```

pub mod archive;
pub mod config;
pub mod docker;
pub mod error;
pub mod provisioner;
pub mod proxy;
pub mod readiness;
pub mod services;
pub mod topology;

// --- Public API Re-exports ---

// Provisioner
pub use provisioner::{ProjectScope, Provisioner, spec_fingerprint};

// Configuration
pub use config::{ProvisionerConfig, ProvisionerConfigBuilder};

// Error
pub use error::ProvisionError;

// Runtime
pub use docker::{BollardRuntime, ContainerRuntime};

// Readiness
pub use readiness::{ProbeTarget, ReadinessGate, wait_until_ready};

// Load balancer config
pub use proxy::{NGINX_CONFIG_PATH, render_nginx_config};

// Services
pub use services::{
    BrowserParams, CacheParams, DatabaseLink, DatabaseParams, InferenceHandle, InferenceParams,
    LoadBalancerParams, PostgresHandle, ReplicaParams,
};

// Topology
pub use topology::{Stack, StackSpec, TeardownReport};
