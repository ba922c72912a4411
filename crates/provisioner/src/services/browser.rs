//! 브라우저 자동화 서버 (playwright MCP)

use std::time::Duration;

use testbed_core::config::DEFAULT_BROWSER_IMAGE;
use testbed_core::types::{ProjectName, ServiceDescriptor, ServiceHandle, ServiceKind, WaitStrategy};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::{ProjectScope, Provisioner};

/// 준비 검사에 쓰는 기본 엔드포인트
pub const DEFAULT_BROWSER_READY_PATH: &str = "/sse";

/// 브라우저 자동화 서버 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserParams {
    pub image: String,
    pub headless: bool,
    /// `GET` 200을 기대하는 경로
    pub ready_path: String,
    pub startup_timeout: Duration,
}

impl Default for BrowserParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_BROWSER_IMAGE.to_owned(),
            headless: true,
            ready_path: DEFAULT_BROWSER_READY_PATH.to_owned(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

pub fn browser_descriptor(
    project: &ProjectName,
    params: &BrowserParams,
) -> Result<ServiceDescriptor, ProvisionError> {
    if !params.ready_path.starts_with('/') {
        return Err(ProvisionError::InvalidSpec(format!(
            "browser ready path '{}' must start with '/'",
            params.ready_path
        )));
    }

    let kind = ServiceKind::Browser;
    let port = kind.default_port();
    // 네트워크 밖(호스트 포트 매핑)에서 접근하므로 모든 인터페이스에 bind
    let mut command = vec![
        "--port".to_owned(),
        port.to_string(),
        "--host".to_owned(),
        "0.0.0.0".to_owned(),
    ];
    if params.headless {
        command.push("--headless".to_owned());
    }

    Ok(ServiceDescriptor {
        command,
        startup_timeout: params.startup_timeout,
        ..ServiceDescriptor::base(
            project,
            kind,
            kind.tag(),
            &params.image,
            WaitStrategy::Http {
                port,
                path: params.ready_path.clone(),
                status: 200,
            },
        )
    })
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 브라우저 자동화 서버를 시작합니다.
    pub async fn start_browser(
        &self,
        scope: &ProjectScope,
        params: &BrowserParams,
    ) -> Result<ServiceHandle, ProvisionError> {
        let descriptor = browser_descriptor(&scope.project, params)?;
        self.provision(scope, descriptor).await
    }
}
