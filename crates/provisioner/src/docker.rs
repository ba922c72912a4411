//! 컨테이너 런타임 추상화
//!
//! [`ContainerRuntime`] 트레이트가 bollard Docker API를 감싸므로
//! 프로덕션 코드는 [`BollardRuntime`]을, 테스트는 `MockRuntime`을 사용합니다.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ Provisioner  │
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ ContainerRuntime │ (trait)
//! └──────────────────┘
//!      │        │
//!      ▼        ▼
//! ┌────────┐ ┌──────┐
//! │Bollard │ │ Mock │
//! └───┬────┘ └──────┘
//!     │
//!     ▼
//! Docker Daemon
//! ```
//!
//! # 컨테이너 참조 검증
//!
//! 이름 또는 ID를 받는 모든 메서드는 API 호출 전에 참조를 검증합니다.
//! 빈 문자열, 128자 초과, `[A-Za-z0-9_.-]` 밖의 문자는 거부됩니다.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use bollard::errors::Error as BollardError;
use futures_util::{StreamExt, TryStreamExt};
use testbed_core::config::DockerConfig;
use testbed_core::types::{
    ContainerSummary, ExecOutput, FileCopy, PortMapping, ProjectName, ServiceDescriptor,
};
use tracing::{debug, info};

use crate::archive;
use crate::error::ProvisionError;

/// 컨테이너 참조 최대 길이
const MAX_CONTAINER_REF_LEN: usize = 128;

/// 정지 시 SIGKILL 전 유예 시간 (초)
const STOP_GRACE_SECS: i64 = 10;

/// 컨테이너 이름/ID를 검증합니다.
fn validate_container_ref(value: &str) -> Result<(), ProvisionError> {
    if value.is_empty() || value.len() > MAX_CONTAINER_REF_LEN {
        return Err(ProvisionError::InvalidSpec(format!(
            "invalid container reference: length {} (must be 1-{MAX_CONTAINER_REF_LEN})",
            value.len()
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ProvisionError::InvalidSpec(format!(
            "invalid container reference '{value}': only [A-Za-z0-9_.-] allowed"
        )));
    }
    Ok(())
}

/// 이미지 참조를 (저장소, 태그)로 나눕니다. 태그가 없으면 `latest`.
///
/// 레지스트리 포트(`host:5000/app`)의 콜론은 태그로 취급하지 않습니다.
pub(crate) fn split_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

/// Docker의 `ports` 맵(`"5678/tcp" -> [{HostPort: "49153"}]`)을 해석합니다.
pub(crate) fn parse_port_map(
    ports: &HashMap<String, Option<Vec<bollard::models::PortBinding>>>,
) -> Vec<PortMapping> {
    let mut mappings: Vec<PortMapping> = ports
        .iter()
        .filter_map(|(key, bindings)| {
            let container = key.split('/').next()?.parse::<u16>().ok()?;
            let host = bindings
                .as_deref()?
                .iter()
                .find_map(|b| b.host_port.as_deref()?.parse::<u16>().ok())?;
            Some(PortMapping { container, host })
        })
        .collect();
    mappings.sort_by_key(|m| m.container);
    mappings
}

fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// 컨테이너 런타임 연산 추상화
///
/// 모든 런타임 호출은 이 트레이트를 거칩니다.
/// `Send + Sync + 'static`이므로 여러 비동기 작업에서 공유할 수 있습니다.
///
/// # Error Handling
///
/// - **404**: `find_container`는 `None`, `remove_*`는 성공으로 처리
/// - **409** (create): `ProvisionError::NameConflict`
/// - **304** (start/stop): 이미 원하는 상태이므로 성공
/// - 연결 실패: `ProvisionError::RuntimeConnection`
pub trait ContainerRuntime: Send + Sync + 'static {
    /// 런타임 데몬 연결을 확인합니다.
    fn ping(&self) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// 이름으로 네트워크를 찾고, 없으면 라벨을 붙여 생성합니다. 네트워크 ID를 반환합니다.
    fn ensure_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<String, ProvisionError>> + Send;

    /// 네트워크를 제거합니다. 없으면 성공으로 처리합니다.
    fn remove_network(&self, name: &str) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// 이미지가 로컬에 없으면 pull 합니다.
    fn ensure_image(&self, image: &str)
    -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// 이름 또는 ID로 컨테이너를 찾습니다.
    fn find_container(
        &self,
        name_or_id: &str,
    ) -> impl Future<Output = Result<Option<ContainerSummary>, ProvisionError>> + Send;

    /// 요청대로 컨테이너를 생성하고(시작하지 않음) ID를 반환합니다.
    fn create_container(
        &self,
        descriptor: &ServiceDescriptor,
        network: &str,
    ) -> impl Future<Output = Result<String, ProvisionError>> + Send;

    /// 생성된 컨테이너에 파일을 복사합니다.
    fn copy_file(
        &self,
        id: &str,
        file: &FileCopy,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    fn start_container(&self, id: &str)
    -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// 컨테이너 포트에 할당된 호스트 포트를 조회합니다.
    fn port_mappings(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<PortMapping>, ProvisionError>> + Send;

    /// 컨테이너 안에서 명령을 실행하고 종료 코드와 출력을 반환합니다.
    fn exec(
        &self,
        id: &str,
        command: &[String],
    ) -> impl Future<Output = Result<ExecOutput, ProvisionError>> + Send;

    /// 프로젝트 라벨이 붙은 모든 컨테이너(정지 포함)를 나열합니다.
    fn list_project_containers(
        &self,
        project: &ProjectName,
    ) -> impl Future<Output = Result<Vec<ContainerSummary>, ProvisionError>> + Send;

    fn stop_container(&self, id: &str) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// 컨테이너와 익명 볼륨을 강제로 제거합니다.
    fn remove_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

/// bollard 기반 프로덕션 런타임
///
/// 내부적으로 `Arc<bollard::Docker>`를 사용하므로 복제 비용이 작습니다.
#[derive(Clone)]
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
}

impl BollardRuntime {
    /// 플랫폼 기본 소켓(`DOCKER_HOST` 포함)으로 연결합니다.
    pub fn connect_local() -> Result<Self, ProvisionError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ProvisionError::RuntimeConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// 지정한 유닉스 소켓으로 연결합니다.
    pub fn connect_with_socket(
        socket_path: &str,
        timeout_secs: u64,
    ) -> Result<Self, ProvisionError> {
        let docker = bollard::Docker::connect_with_socket(
            socket_path,
            timeout_secs,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            ProvisionError::RuntimeConnection(format!(
                "failed to connect to docker at {socket_path}: {e}"
            ))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// 설정에 따라 연결합니다. 소켓이 비어 있으면 로컬 기본값을 씁니다.
    pub fn connect(config: &DockerConfig) -> Result<Self, ProvisionError> {
        if config.socket.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(&config.socket, config.connect_timeout_secs)
        }
    }

    async fn network_id(&self, name: &str) -> Result<Option<String>, ProvisionError> {
        use bollard::network::InspectNetworkOptions;

        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => Ok(Some(network.id.unwrap_or_else(|| name.to_owned()))),
            Err(e) if status_code(&e) == Some(404) => Ok(None),
            Err(e) => Err(api_error("inspect network", e)),
        }
    }
}

/// bollard 에러를 도메인 에러로 변환합니다.
fn api_error(op: &str, err: BollardError) -> ProvisionError {
    match err {
        BollardError::DockerResponseServerError { .. } => {
            ProvisionError::Runtime(format!("{op} failed: {err}"))
        }
        other => ProvisionError::RuntimeConnection(format!("{op} failed: {other}")),
    }
}

impl ContainerRuntime for BollardRuntime {
    async fn ping(&self) -> Result<(), ProvisionError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ProvisionError::RuntimeConnection(format!("ping failed: {e}")))?;
        Ok(())
    }

    async fn ensure_network(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, ProvisionError> {
        use bollard::network::CreateNetworkOptions;

        if let Some(id) = self.network_id(name).await? {
            debug!(network = name, "reusing existing network");
            return Ok(id);
        }

        let options = CreateNetworkOptions {
            name: name.to_owned(),
            driver: "bridge".to_owned(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        };
        match self.docker.create_network(options).await {
            Ok(_) => {}
            // 동시에 같은 이름으로 생성된 경우
            Err(e) if status_code(&e) == Some(409) => {}
            Err(e) => return Err(api_error("create network", e)),
        }
        info!(network = name, "network created");

        self.network_id(name)
            .await?
            .ok_or_else(|| ProvisionError::Runtime(format!("network '{name}' vanished after create")))
    }

    async fn remove_network(&self, name: &str) -> Result<(), ProvisionError> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(api_error("remove network", e)),
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<(), ProvisionError> {
        use bollard::image::CreateImageOptions;

        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(e) if status_code(&e) == Some(404) => {}
            Err(e) => return Err(api_error("inspect image", e)),
        }

        let (repo, tag) = split_image_ref(image);
        info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| api_error(&format!("pull image {image}"), e))?;
        Ok(())
    }

    async fn find_container(
        &self,
        name_or_id: &str,
    ) -> Result<Option<ContainerSummary>, ProvisionError> {
        validate_container_ref(name_or_id)?;

        let details = match self.docker.inspect_container(name_or_id, None).await {
            Ok(details) => details,
            Err(e) if status_code(&e) == Some(404) => return Ok(None),
            Err(e) => return Err(api_error("inspect container", e)),
        };

        let (image, labels) = details
            .config
            .map(|c| (c.image.unwrap_or_default(), c.labels.unwrap_or_default()))
            .unwrap_or_default();
        let state = details
            .state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_owned());

        Ok(Some(ContainerSummary {
            id: details.id.unwrap_or_default(),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default(),
            image,
            state,
            labels: labels.into_iter().collect(),
        }))
    }

    async fn create_container(
        &self,
        descriptor: &ServiceDescriptor,
        network: &str,
    ) -> Result<String, ProvisionError> {
        use bollard::container::{Config, CreateContainerOptions, NetworkingConfig};
        use bollard::models::{EndpointSettings, HostConfig, PortBinding};

        validate_container_ref(&descriptor.name)?;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for port in &descriptor.ports {
            let key = format!("{}/tcp", port.container);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    // 빈 문자열이면 런타임이 임의 포트를 할당
                    host_port: Some(port.host.map(|p| p.to_string()).unwrap_or_default()),
                }]),
            );
        }

        let endpoint = EndpointSettings {
            aliases: Some(descriptor.aliases.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(descriptor.image.clone()),
            env: Some(
                descriptor
                    .env
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect(),
            ),
            cmd: (!descriptor.command.is_empty()).then(|| descriptor.command.clone()),
            labels: Some(
                descriptor
                    .labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            networking_config: Some(NetworkingConfig {
                endpoints_config: HashMap::from([(network.to_owned(), endpoint)]),
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: descriptor.name.clone(),
            platform: None,
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(response) => {
                debug!(container = %descriptor.name, id = %response.id, "container created");
                Ok(response.id)
            }
            Err(e) if status_code(&e) == Some(409) => {
                Err(ProvisionError::NameConflict(descriptor.name.clone()))
            }
            Err(e) => Err(api_error(&format!("create container {}", descriptor.name), e)),
        }
    }

    async fn copy_file(&self, id: &str, file: &FileCopy) -> Result<(), ProvisionError> {
        use bollard::container::UploadToContainerOptions;

        validate_container_ref(id)?;
        let tarball = archive::single_file_tar(file)?;
        let options = UploadToContainerOptions {
            path: "/".to_owned(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), tarball.into())
            .await
            .map_err(|e| api_error(&format!("copy {} into {id}", file.path), e))
    }

    async fn start_container(&self, id: &str) -> Result<(), ProvisionError> {
        use bollard::container::StartContainerOptions;

        validate_container_ref(id)?;
        match self
            .docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => {
                Err(ProvisionError::ContainerNotFound(id.to_owned()))
            }
            Err(e) => Err(api_error(&format!("start container {id}"), e)),
        }
    }

    async fn port_mappings(&self, id: &str) -> Result<Vec<PortMapping>, ProvisionError> {
        validate_container_ref(id)?;
        let details = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => ProvisionError::ContainerNotFound(id.to_owned()),
                _ => api_error("inspect container", e),
            })?;
        Ok(details
            .network_settings
            .and_then(|s| s.ports)
            .map(|ports| parse_port_map(&ports))
            .unwrap_or_default())
    }

    async fn exec(&self, id: &str, command: &[String]) -> Result<ExecOutput, ProvisionError> {
        use bollard::container::LogOutput;
        use bollard::exec::{CreateExecOptions, StartExecResults};

        validate_container_ref(id)?;
        let created = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => ProvisionError::ContainerNotFound(id.to_owned()),
                _ => api_error("create exec", e),
            })?;

        let mut result = ExecOutput::default();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&created.id, None)
            .await
            .map_err(|e| api_error("start exec", e))?
        {
            while let Some(chunk) = output.next().await {
                match chunk.map_err(|e| api_error("read exec output", e))? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        result.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        result.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&created.id)
            .await
            .map_err(|e| api_error("inspect exec", e))?;
        // 종료 코드를 알 수 없으면 실패로 간주
        result.exit_code = inspected.exit_code.unwrap_or(-1);
        Ok(result)
    }

    async fn list_project_containers(
        &self,
        project: &ProjectName,
    ) -> Result<Vec<ContainerSummary>, ProvisionError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("label".to_owned(), vec![project.label_filter()])]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| api_error("list containers", e))?;

        let mut result = Vec::with_capacity(containers.len());
        for container in containers {
            let name = container
                .names
                .unwrap_or_default()
                .first()
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_default();
            result.push(ContainerSummary {
                id: container.id.unwrap_or_default(),
                name,
                image: container.image.unwrap_or_default(),
                state: container.state.unwrap_or_default(),
                labels: container.labels.unwrap_or_default().into_iter().collect(),
            });
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn stop_container(&self, id: &str) -> Result<(), ProvisionError> {
        use bollard::container::StopContainerOptions;

        validate_container_ref(id)?;
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => Ok(()),
            Err(e) => Err(api_error(&format!("stop container {id}"), e)),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), ProvisionError> {
        use bollard::container::RemoveContainerOptions;

        validate_container_ref(id)?;
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(api_error(&format!("remove container {id}"), e)),
        }
    }
}

/// 테스트용 Mock 런타임
///
/// 컨테이너를 메모리에만 기록합니다. exec 결과와 호스트 포트는 미리 지정할 수 있습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockRuntime {
    state: std::sync::Mutex<MockState>,
}

#[cfg(test)]
#[derive(Default)]
struct MockState {
    networks: BTreeMap<String, String>,
    containers: Vec<ContainerSummary>,
    descriptors: BTreeMap<String, ServiceDescriptor>,
    files: Vec<(String, FileCopy)>,
    exec_results: Vec<(String, ExecOutput)>,
    exec_calls: Vec<Vec<String>>,
    host_ports: HashMap<u16, u16>,
    next_id: u64,
    fail_ping: bool,
}

#[cfg(test)]
impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 명령 줄이 `prefix`로 시작하면 돌려줄 결과를 등록합니다. 먼저 등록한 것이 우선합니다.
    pub fn with_exec_result(self, prefix: &str, output: ExecOutput) -> Self {
        self.lock().exec_results.push((prefix.to_owned(), output));
        self
    }

    /// `prefix`의 exec 결과를 바꿉니다. 없으면 새로 등록합니다.
    pub fn set_exec_result(&self, prefix: &str, output: ExecOutput) {
        let mut guard = self.lock();
        match guard.exec_results.iter_mut().find(|(p, _)| p == prefix) {
            Some(entry) => entry.1 = output,
            None => guard.exec_results.push((prefix.to_owned(), output)),
        }
    }

    /// 컨테이너 포트를 고정 호스트 포트로 매핑합니다.
    pub fn with_host_port(self, container: u16, host: u16) -> Self {
        self.lock().host_ports.insert(container, host);
        self
    }

    pub fn with_failing_ping(self) -> Self {
        self.lock().fail_ping = true;
        self
    }

    /// 컨테이너를 직접 추가합니다.
    pub fn insert_container(&self, summary: ContainerSummary) {
        self.lock().containers.push(summary);
    }

    pub fn containers(&self) -> Vec<ContainerSummary> {
        self.lock().containers.clone()
    }

    pub fn descriptor(&self, name: &str) -> Option<ServiceDescriptor> {
        self.lock().descriptors.get(name).cloned()
    }

    pub fn copied_files(&self) -> Vec<(String, FileCopy)> {
        self.lock().files.clone()
    }

    pub fn exec_calls(&self) -> Vec<Vec<String>> {
        self.lock().exec_calls.clone()
    }

    pub fn networks(&self) -> Vec<String> {
        self.lock().networks.keys().cloned().collect()
    }

    pub fn set_state(&self, name: &str, state: &str) {
        let mut guard = self.lock();
        if let Some(c) = guard.containers.iter_mut().find(|c| c.name == name) {
            c.state = state.to_owned();
        }
    }
}

#[cfg(test)]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<(), ProvisionError> {
        if self.lock().fail_ping {
            return Err(ProvisionError::RuntimeConnection("mock ping failure".to_owned()));
        }
        Ok(())
    }

    async fn ensure_network(
        &self,
        name: &str,
        _labels: &BTreeMap<String, String>,
    ) -> Result<String, ProvisionError> {
        let mut guard = self.lock();
        let next = guard.networks.len();
        Ok(guard
            .networks
            .entry(name.to_owned())
            .or_insert_with(|| format!("net{next}"))
            .clone())
    }

    async fn remove_network(&self, name: &str) -> Result<(), ProvisionError> {
        self.lock().networks.remove(name);
        Ok(())
    }

    async fn ensure_image(&self, _image: &str) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn find_container(
        &self,
        name_or_id: &str,
    ) -> Result<Option<ContainerSummary>, ProvisionError> {
        validate_container_ref(name_or_id)?;
        Ok(self
            .lock()
            .containers
            .iter()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
            .cloned())
    }

    async fn create_container(
        &self,
        descriptor: &ServiceDescriptor,
        _network: &str,
    ) -> Result<String, ProvisionError> {
        let mut guard = self.lock();
        if guard.containers.iter().any(|c| c.name == descriptor.name) {
            return Err(ProvisionError::NameConflict(descriptor.name.clone()));
        }
        guard.next_id += 1;
        let id = format!("{:012x}", guard.next_id);
        guard.containers.push(ContainerSummary {
            id: id.clone(),
            name: descriptor.name.clone(),
            image: descriptor.image.clone(),
            state: "created".to_owned(),
            labels: descriptor.labels.clone(),
        });
        guard
            .descriptors
            .insert(descriptor.name.clone(), descriptor.clone());
        Ok(id)
    }

    async fn copy_file(&self, id: &str, file: &FileCopy) -> Result<(), ProvisionError> {
        self.lock().files.push((id.to_owned(), file.clone()));
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), ProvisionError> {
        let mut guard = self.lock();
        let container = guard
            .containers
            .iter_mut()
            .find(|c| c.id == id || c.name == id)
            .ok_or_else(|| ProvisionError::ContainerNotFound(id.to_owned()))?;
        container.state = "running".to_owned();
        Ok(())
    }

    async fn port_mappings(&self, id: &str) -> Result<Vec<PortMapping>, ProvisionError> {
        let guard = self.lock();
        let name = guard
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .ok_or_else(|| ProvisionError::ContainerNotFound(id.to_owned()))?;
        let Some(descriptor) = guard.descriptors.get(&name) else {
            return Ok(Vec::new());
        };
        Ok(descriptor
            .ports
            .iter()
            .map(|p| PortMapping {
                container: p.container,
                host: p
                    .host
                    .or_else(|| guard.host_ports.get(&p.container).copied())
                    .unwrap_or(40_000 + p.container % 1000),
            })
            .collect())
    }

    async fn exec(&self, _id: &str, command: &[String]) -> Result<ExecOutput, ProvisionError> {
        let mut guard = self.lock();
        guard.exec_calls.push(command.to_vec());
        let line = command.join(" ");
        Ok(guard
            .exec_results
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }

    async fn list_project_containers(
        &self,
        project: &ProjectName,
    ) -> Result<Vec<ContainerSummary>, ProvisionError> {
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|c| c.label(testbed_core::types::LABEL_PROJECT) == Some(project.as_str()))
            .cloned()
            .collect())
    }

    async fn stop_container(&self, id: &str) -> Result<(), ProvisionError> {
        if let Some(c) = self.lock().containers.iter_mut().find(|c| c.id == id) {
            c.state = "exited".to_owned();
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), ProvisionError> {
        let mut guard = self.lock();
        if let Some(pos) = guard.containers.iter().position(|c| c.id == id) {
            let removed = guard.containers.remove(pos);
            guard.descriptors.remove(&removed.name);
        }
        Ok(())
    }
}
