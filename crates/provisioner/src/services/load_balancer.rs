//! 로드 밸런서 (nginx)
//!
//! 모든 레플리카 핸들이 준비된 뒤에만 요청을 만들 수 있습니다.
//! 생성된 nginx.conf는 시작 전에 컨테이너로 복사됩니다.

use std::time::Duration;

use testbed_core::config::DEFAULT_NGINX_IMAGE;
use testbed_core::types::{
    FileCopy, PortSpec, ProjectName, ServiceDescriptor, ServiceHandle, ServiceKind, WaitStrategy,
};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::{ProjectScope, Provisioner};
use crate::proxy::{NGINX_CONFIG_PATH, render_nginx_config};

/// 로드 밸런서 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerParams {
    pub image: String,
    /// upstream 레플리카 별칭 (순서 유지)
    pub upstreams: Vec<String>,
    /// 고정 호스트 포트 (`None`이면 임의 포트)
    pub host_port: Option<u16>,
    pub startup_timeout: Duration,
}

impl Default for LoadBalancerParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_NGINX_IMAGE.to_owned(),
            upstreams: Vec::new(),
            host_port: None,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

impl LoadBalancerParams {
    /// 레플리카 핸들의 별칭으로 upstream 목록을 채웁니다.
    pub fn for_replicas(replicas: &[ServiceHandle]) -> Self {
        Self {
            upstreams: replicas.iter().map(|h| h.alias.clone()).collect(),
            ..Self::default()
        }
    }
}

pub fn load_balancer_descriptor(
    project: &ProjectName,
    params: &LoadBalancerParams,
) -> Result<ServiceDescriptor, ProvisionError> {
    if params.upstreams.is_empty() {
        return Err(ProvisionError::InvalidSpec(
            "load balancer needs at least one upstream replica".to_owned(),
        ));
    }

    let kind = ServiceKind::LoadBalancer;
    let port = kind.default_port();
    Ok(ServiceDescriptor {
        ports: vec![match params.host_port {
            Some(host) => PortSpec::fixed(port, host),
            None => PortSpec::ephemeral(port),
        }],
        files: vec![FileCopy {
            path: NGINX_CONFIG_PATH.to_owned(),
            content: render_nginx_config(&params.upstreams),
            mode: 0o644,
        }],
        startup_timeout: params.startup_timeout,
        ..ServiceDescriptor::base(
            project,
            kind,
            kind.tag(),
            &params.image,
            WaitStrategy::ListeningPort { port },
        )
    })
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 로드 밸런서를 시작합니다. 외부 진입점은 `handle.external_url(80)`입니다.
    pub async fn start_load_balancer(
        &self,
        scope: &ProjectScope,
        params: &LoadBalancerParams,
    ) -> Result<ServiceHandle, ProvisionError> {
        let descriptor = load_balancer_descriptor(&scope.project, params)?;
        self.provision(scope, descriptor).await
    }
}
