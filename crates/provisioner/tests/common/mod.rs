//! 통합 테스트 공용 헬퍼
//!
//! - [`FakeRuntime`]: 메모리 기반 `ContainerRuntime`
//! - [`http_server`] / [`tcp_listener`]: 매핑된 호스트 포트 역할을 하는 로컬 서버

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use testbed_core::types::{
    ContainerSummary, ExecOutput, FileCopy, LABEL_PROJECT, PortMapping, PortSpec, ProjectName,
    ServiceDescriptor,
};
use testbed_provisioner::{ContainerRuntime, ProvisionError, Provisioner, ProvisionerConfigBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub summary: ContainerSummary,
    pub network: String,
    pub descriptor: ServiceDescriptor,
    pub files: Vec<FileCopy>,
    pub started_at_create: bool,
}

#[derive(Default)]
struct FakeState {
    networks: BTreeSet<String>,
    containers: Vec<FakeContainer>,
    exec_results: Vec<(String, ExecOutput)>,
    exec_log: Vec<Vec<String>>,
    host_ports: HashMap<u16, u16>,
    pulled_images: Vec<String>,
    next_id: u64,
    copy_delay: Option<Duration>,
    stalled_exec: Vec<String>,
    failing_removes: BTreeSet<String>,
}

/// 메모리 기반 런타임. 컨테이너 이름 고유성은 런타임처럼 create 시점에 보장합니다.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// 컨테이너 포트를 로컬 테스트 서버 포트로 매핑합니다.
    pub async fn map_port(&self, container: u16, host: u16) {
        self.state.lock().await.host_ports.insert(container, host);
    }

    /// 명령 줄이 `prefix`로 시작하면 돌려줄 결과를 등록합니다.
    pub async fn exec_result(&self, prefix: &str, output: ExecOutput) {
        self.state
            .lock()
            .await
            .exec_results
            .push((prefix.to_owned(), output));
    }

    pub async fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state
            .lock()
            .await
            .containers
            .iter()
            .find(|c| c.summary.name == name)
            .cloned()
    }

    pub async fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .await
            .containers
            .iter()
            .map(|c| c.summary.name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn networks(&self) -> Vec<String> {
        self.state.lock().await.networks.iter().cloned().collect()
    }

    pub async fn exec_log(&self) -> Vec<Vec<String>> {
        self.state.lock().await.exec_log.clone()
    }

    pub async fn pulled_images(&self) -> Vec<String> {
        self.state.lock().await.pulled_images.clone()
    }

    /// 파일 복사마다 `delay`만큼 양보합니다. 동시 시작 경쟁을 재현할 때 씁니다.
    pub async fn delay_copies(&self, delay: Duration) {
        self.state.lock().await.copy_delay = Some(delay);
    }

    /// 명령 줄이 `prefix`로 시작하는 exec는 끝나지 않습니다.
    pub async fn stall_exec(&self, prefix: &str) {
        self.state.lock().await.stalled_exec.push(prefix.to_owned());
    }

    /// 이 이름의 컨테이너 제거는 런타임 오류로 실패합니다.
    pub async fn fail_remove(&self, name: &str) {
        self.state.lock().await.failing_removes.insert(name.to_owned());
    }

    pub async fn set_state(&self, name: &str, state: &str) {
        if let Some(c) = self
            .state
            .lock()
            .await
            .containers
            .iter_mut()
            .find(|c| c.summary.name == name)
        {
            c.summary.state = state.to_owned();
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn ensure_network(
        &self,
        name: &str,
        _labels: &BTreeMap<String, String>,
    ) -> Result<String, ProvisionError> {
        self.state.lock().await.networks.insert(name.to_owned());
        Ok(format!("net-{name}"))
    }

    async fn remove_network(&self, name: &str) -> Result<(), ProvisionError> {
        self.state.lock().await.networks.remove(name);
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().await;
        if !state.pulled_images.iter().any(|i| i == image) {
            state.pulled_images.push(image.to_owned());
        }
        Ok(())
    }

    async fn find_container(
        &self,
        name_or_id: &str,
    ) -> Result<Option<ContainerSummary>, ProvisionError> {
        Ok(self
            .state
            .lock()
            .await
            .containers
            .iter()
            .find(|c| c.summary.name == name_or_id || c.summary.id == name_or_id)
            .map(|c| c.summary.clone()))
    }

    async fn create_container(
        &self,
        descriptor: &ServiceDescriptor,
        network: &str,
    ) -> Result<String, ProvisionError> {
        let mut state = self.state.lock().await;
        if state
            .containers
            .iter()
            .any(|c| c.summary.name == descriptor.name)
        {
            return Err(ProvisionError::NameConflict(descriptor.name.clone()));
        }
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        state.containers.push(FakeContainer {
            summary: ContainerSummary {
                id: id.clone(),
                name: descriptor.name.clone(),
                image: descriptor.image.clone(),
                state: "created".to_owned(),
                labels: descriptor.labels.clone(),
            },
            network: network.to_owned(),
            descriptor: descriptor.clone(),
            files: Vec::new(),
            started_at_create: false,
        });
        Ok(id)
    }

    async fn copy_file(&self, id: &str, file: &FileCopy) -> Result<(), ProvisionError> {
        let delay = self.state.lock().await.copy_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.summary.id == id)
            .ok_or_else(|| ProvisionError::ContainerNotFound(id.to_owned()))?;
        if container.summary.state != "created" {
            return Err(ProvisionError::Runtime(
                "files must be copied before start".to_owned(),
            ));
        }
        container.files.push(file.clone());
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.summary.id == id)
            .ok_or_else(|| ProvisionError::ContainerNotFound(id.to_owned()))?;
        container.summary.state = "running".to_owned();
        Ok(())
    }

    async fn port_mappings(&self, id: &str) -> Result<Vec<PortMapping>, ProvisionError> {
        let state = self.state.lock().await;
        let container = state
            .containers
            .iter()
            .find(|c| c.summary.id == id)
            .ok_or_else(|| ProvisionError::ContainerNotFound(id.to_owned()))?;
        Ok(container
            .descriptor
            .ports
            .iter()
            .filter_map(|p: &PortSpec| {
                let host = p.host.or_else(|| state.host_ports.get(&p.container).copied())?;
                Some(PortMapping {
                    container: p.container,
                    host,
                })
            })
            .collect())
    }

    async fn exec(&self, _id: &str, command: &[String]) -> Result<ExecOutput, ProvisionError> {
        let mut state = self.state.lock().await;
        state.exec_log.push(command.to_vec());
        let line = command.join(" ");
        if state
            .stalled_exec
            .iter()
            .any(|prefix| line.starts_with(prefix.as_str()))
        {
            drop(state);
            return std::future::pending().await;
        }
        Ok(state
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
            .state
            .lock()
            .await
            .containers
            .iter()
            .filter(|c| c.summary.label(LABEL_PROJECT) == Some(project.as_str()))
            .map(|c| c.summary.clone())
            .collect())
    }

    async fn stop_container(&self, id: &str) -> Result<(), ProvisionError> {
        if let Some(c) = self
            .state
            .lock()
            .await
            .containers
            .iter_mut()
            .find(|c| c.summary.id == id)
        {
            c.summary.state = "exited".to_owned();
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().await;
        let name = state
            .containers
            .iter()
            .find(|c| c.summary.id == id)
            .map(|c| c.summary.name.clone());
        if let Some(name) = name.filter(|n| state.failing_removes.contains(n)) {
            return Err(ProvisionError::Runtime(format!(
                "removal of container {name} is already in progress"
            )));
        }
        state.containers.retain(|c| c.summary.id != id);
        Ok(())
    }
}

/// 모든 요청에 `status`로 응답하는 로컬 HTTP 서버를 띄우고 포트를 반환합니다.
pub async fn http_server(status: u16) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    port
}

/// 연결만 받아 주는 TCP 리스너를 띄우고 포트를 반환합니다.
pub async fn tcp_listener() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move { while listener.accept().await.is_ok() {} });
    port
}

pub fn pong() -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: "PONG\n".to_owned(),
        stderr: String::new(),
    }
}

/// 빠른 폴링 설정의 프로비저너
pub fn provisioner(runtime: Arc<FakeRuntime>) -> Provisioner<FakeRuntime> {
    let config = ProvisionerConfigBuilder::new()
        .poll_interval_ms(20)
        .http_probe_timeout_ms(500)
        .model_pull_timeout_secs(2)
        .model_verify_timeout_secs(1)
        .build()
        .unwrap();
    Provisioner::new(runtime, config).unwrap()
}

/// 모든 기본 서비스의 준비 조건을 만족시키는 런타임
pub async fn healthy_runtime() -> Arc<FakeRuntime> {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.exec_result("redis-cli", pong()).await;
    let app = http_server(200).await;
    runtime.map_port(5678, app).await;
    runtime.map_port(80, tcp_listener().await).await;
    runtime.map_port(8931, http_server(200).await).await;
    runtime.map_port(11434, http_server(200).await).await;
    runtime
}

pub fn project(name: &str) -> ProjectName {
    ProjectName::new(name).unwrap()
}
