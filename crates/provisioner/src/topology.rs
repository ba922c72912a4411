//! 스택 오케스트레이션
//!
//! [`StackSpec`]은 한 프로젝트의 전체 토폴로지를 기술하고,
//! [`Provisioner::provision_stack`]이 의존 순서대로 띄웁니다.
//!
//! ```text
//! network ─► { postgres, redis } ─► { n8n-main-1 .. n8n-main-N } ─► nginx-lb
//!        └─► { playwright-mcp, ollama }   (선택, 애플리케이션 계층과 동시에)
//! ```
//!
//! 로드 밸런서 요청은 모든 레플리카 핸들이 준비된 뒤에만 만들어집니다.

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use testbed_core::config::TestbedConfig;
use testbed_core::error::TestbedError;
use testbed_core::metrics as m;
use testbed_core::types::{ContainerSummary, NetworkHandle, ProjectName, ServiceHandle, ServiceKind};
use tracing::{info, warn};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::Provisioner;
use crate::services::{
    BrowserParams, CacheParams, DatabaseParams, InferenceHandle, InferenceParams,
    LoadBalancerParams, PostgresHandle, ReplicaParams,
};

/// 프로젝트 하나의 전체 토폴로지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSpec {
    pub project: ProjectName,
    pub reuse: bool,
    pub main_replicas: usize,
    pub database: DatabaseParams,
    pub cache: CacheParams,
    /// 레플리카 공통 파라미터 (번호와 배선은 스택이 채움)
    pub replica: ReplicaParams,
    /// 로드 밸런서 파라미터 (upstream은 스택이 채움)
    pub load_balancer: LoadBalancerParams,
    pub browser: Option<BrowserParams>,
    pub inference: Option<InferenceParams>,
}

impl StackSpec {
    /// 기본 파라미터로 스택을 구성합니다.
    pub fn new(project: ProjectName) -> Self {
        Self {
            project,
            reuse: true,
            main_replicas: 2,
            database: DatabaseParams::default(),
            cache: CacheParams::default(),
            replica: ReplicaParams::default(),
            load_balancer: LoadBalancerParams::default(),
            browser: None,
            inference: None,
        }
    }

    /// 설정 파일 값으로 스택을 구성합니다.
    pub fn from_config(config: &TestbedConfig) -> Result<Self, TestbedError> {
        let project = config.project_name()?;
        let images = &config.images;
        let timeouts = &config.timeouts;
        let services = &config.services;

        Ok(Self {
            project,
            reuse: config.project.reuse,
            main_replicas: config.project.main_replicas,
            database: DatabaseParams {
                image: images.postgres.clone(),
                database: services.postgres_database.clone(),
                username: services.postgres_user.clone(),
                password: services.postgres_password.clone(),
                startup_timeout: timeouts.database_timeout(),
            },
            cache: CacheParams {
                image: images.redis.clone(),
                startup_timeout: timeouts.default_timeout(),
            },
            replica: ReplicaParams {
                image: images.n8n.clone(),
                startup_timeout: timeouts.http_timeout(),
                ..ReplicaParams::default()
            },
            load_balancer: LoadBalancerParams {
                image: images.nginx.clone(),
                host_port: (config.project.lb_host_port != 0)
                    .then_some(config.project.lb_host_port),
                startup_timeout: timeouts.default_timeout(),
                upstreams: Vec::new(),
            },
            browser: services.browser.then(|| BrowserParams {
                image: images.browser.clone(),
                headless: services.headless,
                startup_timeout: timeouts.http_timeout(),
                ..BrowserParams::default()
            }),
            inference: services.ollama.then(|| InferenceParams {
                image: images.ollama.clone(),
                model: services.ollama_model.clone(),
                startup_timeout: timeouts.http_timeout(),
                ..InferenceParams::default()
            }),
        })
    }

    /// k번째 레플리카 파라미터를 데이터베이스/캐시 핸들에 배선합니다.
    pub fn replica_params(
        &self,
        index: usize,
        database: &PostgresHandle,
        cache: &ServiceHandle,
    ) -> ReplicaParams {
        ReplicaParams {
            index,
            database: Some(database.into()),
            cache_alias: Some(cache.alias.clone()),
            ..self.replica.clone()
        }
    }
}

/// 프로비저닝된 스택
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    pub project: ProjectName,
    pub network: NetworkHandle,
    pub database: PostgresHandle,
    pub cache: ServiceHandle,
    pub replicas: Vec<ServiceHandle>,
    pub load_balancer: ServiceHandle,
    pub browser: Option<ServiceHandle>,
    pub inference: Option<InferenceHandle>,
}

impl Stack {
    /// 외부에서 접근하는 진입 URL (로드 밸런서)
    pub fn entry_url(&self) -> Option<String> {
        self.load_balancer
            .external_url(ServiceKind::LoadBalancer.default_port())
    }

    /// 모든 서비스 핸들 (시작 순서)
    pub fn handles(&self) -> Vec<&ServiceHandle> {
        let mut handles = vec![&self.database.handle, &self.cache];
        handles.extend(self.replicas.iter());
        handles.push(&self.load_balancer);
        handles.extend(self.browser.iter());
        handles.extend(self.inference.iter().map(|i| &i.handle));
        handles
    }
}

/// teardown 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub project: String,
    /// 제거된 인스턴스 이름
    pub removed: Vec<String>,
    /// keep 모드로 남겨 둔 인스턴스 이름
    pub kept: Vec<String>,
    /// 제거에 실패해 남아 있는 인스턴스와 네트워크 이름
    #[serde(default)]
    pub failed: Vec<String>,
    pub network_removed: bool,
}

impl TeardownReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 전체 스택을 의존 순서대로 프로비저닝합니다.
    ///
    /// 한 서비스라도 실패하면 에러를 반환합니다. 이미 시작된 인스턴스는
    /// 남겨 두므로 [`teardown_project`](Self::teardown_project)로 정리합니다.
    pub async fn provision_stack(&self, spec: &StackSpec) -> Result<Stack, ProvisionError> {
        if spec.main_replicas == 0 {
            return Err(ProvisionError::InvalidSpec(
                "stack needs at least one main replica".to_owned(),
            ));
        }

        let scope = self.create_network(spec.project.clone(), spec.reuse).await?;
        info!(
            project = %spec.project,
            replicas = spec.main_replicas,
            browser = spec.browser.is_some(),
            inference = spec.inference.is_some(),
            "provisioning stack"
        );

        let app_tier = async {
            let (database, cache) = tokio::try_join!(
                self.start_database(&scope, &spec.database),
                self.start_cache(&scope, &spec.cache),
            )?;

            let replica_params: Vec<ReplicaParams> = (1..=spec.main_replicas)
                .map(|k| spec.replica_params(k, &database, &cache))
                .collect();
            let replicas = try_join_all(
                replica_params
                    .iter()
                    .map(|params| self.start_replica(&scope, params)),
            )
            .await?;

            let lb_params = LoadBalancerParams {
                upstreams: replicas.iter().map(|h| h.alias.clone()).collect(),
                ..spec.load_balancer.clone()
            };
            let load_balancer = self.start_load_balancer(&scope, &lb_params).await?;
            Ok::<_, ProvisionError>((database, cache, replicas, load_balancer))
        };

        let browser = async {
            match &spec.browser {
                Some(params) => self.start_browser(&scope, params).await.map(Some),
                None => Ok(None),
            }
        };

        let inference = async {
            match &spec.inference {
                Some(params) => self.start_inference(&scope, params).await.map(Some),
                None => Ok(None),
            }
        };

        let ((database, cache, replicas, load_balancer), browser, inference) =
            tokio::try_join!(app_tier, browser, inference)?;

        let stack = Stack {
            project: scope.project.clone(),
            network: scope.network.clone(),
            database,
            cache,
            replicas,
            load_balancer,
            browser,
            inference,
        };
        info!(
            project = %stack.project,
            entry_url = stack.entry_url().as_deref().unwrap_or("-"),
            "stack ready"
        );
        Ok(stack)
    }

    /// 프로젝트 라벨이 붙은 모든 인스턴스와 네트워크를 제거합니다.
    ///
    /// `keep`이면 아무것도 제거하지 않고 남아 있는 인스턴스만 보고합니다.
    /// 개별 제거 실패는 [`TeardownReport::failed`]에 모으고 나머지 정리를 계속합니다.
    pub async fn teardown_project(
        &self,
        project: &ProjectName,
        keep: bool,
    ) -> Result<TeardownReport, ProvisionError> {
        let containers = self.runtime().list_project_containers(project).await?;
        let mut report = TeardownReport {
            project: project.to_string(),
            ..TeardownReport::default()
        };

        if keep {
            report.kept = containers.into_iter().map(|c| c.name).collect();
            info!(project = %project, kept = report.kept.len(), "teardown skipped (keep)");
            return Ok(report);
        }

        // 한 인스턴스의 실패가 나머지 정리를 막지 않도록 끝까지 진행한다
        for container in containers {
            if let Err(e) = self.runtime().stop_container(&container.id).await {
                warn!(container = %container.name, error = %e, "stop failed, forcing removal");
            }
            match self.runtime().remove_container(&container.id).await {
                Ok(()) => {
                    metrics::counter!(m::TEARDOWN_REMOVED_TOTAL).increment(1);
                    info!(container = %container.name, "instance removed");
                    report.removed.push(container.name);
                }
                Err(e) => {
                    warn!(container = %container.name, error = %e, "instance removal failed");
                    report.failed.push(container.name);
                }
            }
        }

        let network = project.network_name();
        match self.runtime().remove_network(&network).await {
            Ok(()) => report.network_removed = true,
            Err(e) => {
                warn!(network = %network, error = %e, "network removal failed");
                report.failed.push(network);
            }
        }

        if report.is_complete() {
            info!(
                project = %project,
                removed = report.removed.len(),
                "project torn down"
            );
        } else {
            warn!(
                project = %project,
                removed = report.removed.len(),
                failed = report.failed.len(),
                network_removed = report.network_removed,
                "project partially torn down"
            );
        }
        Ok(report)
    }

    /// 프로젝트 라벨이 붙은 인스턴스 목록
    pub async fn project_status(
        &self,
        project: &ProjectName,
    ) -> Result<Vec<ContainerSummary>, ProvisionError> {
        self.runtime().list_project_containers(project).await
    }
}
