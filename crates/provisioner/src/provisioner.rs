//! 서비스 프로비저닝 공통 흐름
//!
//! [`Provisioner::provision`]은 모든 서비스 규칙이 공유하는 절차를 구현합니다.
//!
//! ```text
//! validate → find(name) ─┬─ 재사용 가능 ──────────────────────┐
//!                        ├─ 내용 불일치/재사용 끔 → remove ─┐  │
//!                        └─ 없음 ───────────────────────────┤  │
//!                             ensure_image → create → copy → start
//!                                    │ 409                     │
//!                                    └─ 승자 인스턴스 채택 ────┤
//!                                                              ▼
//!                                          port_mappings → readiness gate → handle
//! ```
//!
//! 같은 이름의 인스턴스는 런타임에 하나만 존재하므로(이름 고유성) 프로세스 안에는
//! 별도 캐시나 잠금이 없습니다.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use testbed_core::metrics as m;
use testbed_core::types::{
    ContainerSummary, LABEL_PROJECT, LABEL_SPEC_HASH, NetworkHandle, ProjectName,
    ServiceDescriptor, ServiceHandle,
};
use tracing::{debug, info, warn};

use crate::config::ProvisionerConfig;
use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::readiness::{ProbeTarget, ReadinessGate};

/// 생성됐지만 아직 시작되지 않은 인스턴스 상태
const STATE_CREATED: &str = "created";

/// 한 프로젝트의 식별자와 격리 네트워크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectScope {
    pub project: ProjectName,
    pub network: NetworkHandle,
    /// 기존 인스턴스 재사용 허용 여부
    pub reuse: bool,
}

/// 컨테이너를 어떻게 확보했는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquired {
    Created,
    Reused,
}

impl Acquired {
    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Reused => "reused",
        }
    }
}

/// 서비스 프로비저너
///
/// 런타임 하나를 공유하며 여러 서비스를 동시에 프로비저닝할 수 있습니다.
pub struct Provisioner<R: ContainerRuntime> {
    runtime: Arc<R>,
    http: reqwest::Client,
    config: ProvisionerConfig,
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 설정을 검증하고 프로비저너를 생성합니다.
    pub fn new(runtime: Arc<R>, config: ProvisionerConfig) -> Result<Self, ProvisionError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.http_probe_timeout())
            .build()
            .map_err(|e| ProvisionError::Config {
                field: "http_probe_timeout_ms".to_owned(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self {
            runtime,
            http,
            config,
        })
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// 프로젝트 전용 네트워크를 만들거나 재사용합니다.
    pub async fn create_network(
        &self,
        project: ProjectName,
        reuse: bool,
    ) -> Result<ProjectScope, ProvisionError> {
        let name = project.network_name();
        let labels = project.labels("network");
        let id = self.runtime.ensure_network(&name, &labels).await?;
        info!(project = %project, network = %name, "project network ready");
        Ok(ProjectScope {
            network: NetworkHandle {
                id,
                name,
                project: project.clone(),
            },
            project,
            reuse,
        })
    }

    /// 요청 하나를 프로비저닝하고 준비된 핸들을 반환합니다.
    ///
    /// # Errors
    ///
    /// - 요청 불일치: [`ProvisionError::InvalidSpec`]
    /// - 준비 제한 시간 초과: [`ProvisionError::StartupTimeout`]
    /// - 런타임 실패: [`ProvisionError::Runtime`] / [`ProvisionError::RuntimeConnection`]
    pub async fn provision(
        &self,
        scope: &ProjectScope,
        descriptor: ServiceDescriptor,
    ) -> Result<ServiceHandle, ProvisionError> {
        let service = descriptor.kind.tag();
        match self.provision_inner(scope, descriptor).await {
            Ok((handle, acquired)) => {
                metrics::counter!(
                    m::PROVISION_TOTAL,
                    m::LABEL_SERVICE => service,
                    m::LABEL_RESULT => acquired.label()
                )
                .increment(1);
                if acquired == Acquired::Reused {
                    metrics::counter!(m::PROVISION_REUSE_TOTAL, m::LABEL_SERVICE => service)
                        .increment(1);
                }
                Ok(handle)
            }
            Err(e) => {
                metrics::counter!(
                    m::PROVISION_TOTAL,
                    m::LABEL_SERVICE => service,
                    m::LABEL_RESULT => "failure"
                )
                .increment(1);
                Err(e)
            }
        }
    }

    async fn provision_inner(
        &self,
        scope: &ProjectScope,
        mut descriptor: ServiceDescriptor,
    ) -> Result<(ServiceHandle, Acquired), ProvisionError> {
        descriptor.validate().map_err(ProvisionError::InvalidSpec)?;
        if descriptor.labels.get(LABEL_PROJECT).map(String::as_str) != Some(scope.project.as_str())
        {
            return Err(ProvisionError::InvalidSpec(format!(
                "{}: not labelled with project '{}'",
                descriptor.name, scope.project
            )));
        }

        let fingerprint = spec_fingerprint(&descriptor);
        descriptor
            .labels
            .insert(LABEL_SPEC_HASH.to_owned(), fingerprint.clone());
        let reuse = scope.reuse && descriptor.reuse;

        let (container_id, acquired) = match self.runtime.find_container(&descriptor.name).await? {
            Some(existing)
                if reuse && existing.label(LABEL_SPEC_HASH) == Some(fingerprint.as_str()) =>
            {
                let id = self.adopt(existing, descriptor.startup_timeout).await?;
                (id, Acquired::Reused)
            }
            Some(existing) => {
                info!(
                    container = %descriptor.name,
                    reuse,
                    "replacing existing instance"
                );
                self.runtime.remove_container(&existing.id).await?;
                self.create_and_start(scope, &descriptor).await?
            }
            None => self.create_and_start(scope, &descriptor).await?,
        };

        let ports = self.runtime.port_mappings(&container_id).await?;
        let gate = ReadinessGate::new(
            self.runtime.as_ref(),
            &self.http,
            self.config.poll_interval(),
        );
        let target = ProbeTarget {
            service: descriptor.kind.tag(),
            name: &descriptor.name,
            container_id: &container_id,
            host: &self.config.probe_host,
            ports: &ports,
        };
        gate.wait(target, &descriptor.wait, descriptor.startup_timeout)
            .await?;

        let handle = ServiceHandle {
            kind: descriptor.kind,
            container_id,
            alias: descriptor.primary_alias().to_owned(),
            name: descriptor.name,
            network: scope.network.name.clone(),
            host: self.config.probe_host.clone(),
            ports,
            reused: acquired == Acquired::Reused,
        };
        info!(
            container = %handle.name,
            alias = %handle.alias,
            reused = handle.reused,
            "service provisioned"
        );
        Ok((handle, acquired))
    }

    /// 기존 인스턴스를 채택합니다.
    ///
    /// `created` 상태는 다른 호출이 파일을 복사하는 중이므로 시작하지 않고 상태가
    /// 바뀔 때까지 기다립니다. 정지된 인스턴스만 다시 시작합니다.
    async fn adopt(
        &self,
        existing: ContainerSummary,
        timeout: Duration,
    ) -> Result<String, ProvisionError> {
        let current = if existing.state == STATE_CREATED {
            self.wait_until_started(&existing.name, timeout).await?
        } else {
            existing
        };
        if current.is_running() {
            debug!(container = %current.name, "reusing running instance");
        } else {
            info!(
                container = %current.name,
                state = %current.state,
                "restarting stopped instance"
            );
            self.runtime.start_container(&current.id).await?;
        }
        Ok(current.id)
    }

    /// 인스턴스가 `created` 상태를 벗어날 때까지 폴링합니다.
    ///
    /// # Errors
    ///
    /// - 기다리는 중 인스턴스가 제거됨: [`ProvisionError::ContainerNotFound`]
    /// - `timeout` 안에 시작되지 않음: [`ProvisionError::StartupTimeout`]
    async fn wait_until_started(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<ContainerSummary, ProvisionError> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self
                .runtime
                .find_container(name)
                .await?
                .ok_or_else(|| ProvisionError::ContainerNotFound(name.to_owned()))?;
            if current.state != STATE_CREATED {
                return Ok(current);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ProvisionError::StartupTimeout {
                    service: name.to_owned(),
                    timeout,
                    last_observation: "instance never left created state".to_owned(),
                });
            }
            debug!(container = %name, "waiting for concurrent start");
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }

    async fn create_and_start(
        &self,
        scope: &ProjectScope,
        descriptor: &ServiceDescriptor,
    ) -> Result<(String, Acquired), ProvisionError> {
        self.runtime.ensure_image(&descriptor.image).await?;

        let id = match self
            .runtime
            .create_container(descriptor, &scope.network.name)
            .await
        {
            Ok(id) => id,
            Err(ProvisionError::NameConflict(name)) => {
                let winner = self
                    .runtime
                    .find_container(&name)
                    .await?
                    .ok_or_else(|| ProvisionError::ContainerNotFound(name.clone()))?;
                let fingerprint = spec_fingerprint(descriptor);
                if winner.label(LABEL_SPEC_HASH) != Some(fingerprint.as_str()) {
                    warn!(container = %name, id = %winner.id, "name taken by a different request");
                    return Err(ProvisionError::NameConflict(name));
                }
                info!(container = %name, id = %winner.id, "name conflict, adopting winner");
                let id = self.adopt(winner, descriptor.startup_timeout).await?;
                return Ok((id, Acquired::Reused));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.prepare_and_start(&id, descriptor).await {
            warn!(container = %descriptor.name, error = %e, "start failed, removing instance");
            if let Err(cleanup) = self.runtime.remove_container(&id).await {
                warn!(container = %descriptor.name, error = %cleanup, "cleanup failed");
            }
            return Err(e);
        }
        info!(
            container = %descriptor.name,
            image = %descriptor.image,
            "instance started"
        );
        Ok((id, Acquired::Created))
    }

    async fn prepare_and_start(
        &self,
        id: &str,
        descriptor: &ServiceDescriptor,
    ) -> Result<(), ProvisionError> {
        for file in &descriptor.files {
            self.runtime.copy_file(id, file).await?;
            debug!(container = %descriptor.name, path = %file.path, "file copied");
        }
        self.runtime.start_container(id).await
    }
}

/// 컨테이너 구성에 영향을 주는 필드의 SHA-256 지문
///
/// 재사용 후보가 같은 내용으로 만들어졌는지 판정하는 데 씁니다.
/// 준비 조건과 제한 시간은 컨테이너 자체를 바꾸지 않으므로 제외합니다.
pub fn spec_fingerprint(descriptor: &ServiceDescriptor) -> String {
    let mut labels = descriptor.labels.clone();
    labels.remove(LABEL_SPEC_HASH);
    let canonical = serde_json::json!({
        "image": descriptor.image,
        "aliases": descriptor.aliases,
        "ports": descriptor.ports,
        "env": descriptor.env,
        "command": descriptor.command,
        "labels": labels,
        "files": descriptor.files,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
