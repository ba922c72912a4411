//! 캐시 스토어 (redis)

use std::time::Duration;

use testbed_core::config::DEFAULT_REDIS_IMAGE;
use testbed_core::types::{ProjectName, ServiceDescriptor, ServiceHandle, ServiceKind, WaitStrategy};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::{ProjectScope, Provisioner};

/// 캐시 스토어 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheParams {
    pub image: String,
    pub startup_timeout: Duration,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_REDIS_IMAGE.to_owned(),
            startup_timeout: Duration::from_secs(10),
        }
    }
}

/// `redis-cli ping`이 `PONG`을 돌려주면 준비된 것으로 봅니다.
pub fn cache_descriptor(project: &ProjectName, params: &CacheParams) -> ServiceDescriptor {
    let kind = ServiceKind::Cache;
    ServiceDescriptor {
        startup_timeout: params.startup_timeout,
        ..ServiceDescriptor::base(
            project,
            kind,
            kind.tag(),
            &params.image,
            WaitStrategy::Exec {
                command: vec!["redis-cli".to_owned(), "ping".to_owned()],
                expect_stdout: Some("PONG".to_owned()),
            },
        )
    }
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 캐시 스토어를 시작합니다.
    pub async fn start_cache(
        &self,
        scope: &ProjectScope,
        params: &CacheParams,
    ) -> Result<ServiceHandle, ProvisionError> {
        self.provision(scope, cache_descriptor(&scope.project, params))
            .await
    }
}
