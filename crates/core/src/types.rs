//! 도메인 타입: 프로젝트 식별자, 서비스 요청, 실행 중인 서비스 핸들
//!
//! 모든 이름과 별칭은 [`ProjectName`]에서 결정적으로 파생됩니다.
//! 같은 프로젝트의 서비스는 같은 라벨 쌍을 가지므로 외부 도구(compose 등)가
//! 한 번에 묶어서 정리할 수 있습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TestbedError;

/// compose 호환 프로젝트 라벨 키
pub const LABEL_PROJECT: &str = "com.docker.compose.project";

/// compose 호환 서비스 라벨 키
pub const LABEL_SERVICE: &str = "com.docker.compose.service";

/// 요청 내용 지문 라벨 키 (재사용 시 동등성 판정)
pub const LABEL_SPEC_HASH: &str = "io.testbed.spec-hash";

/// 애플리케이션(main) 레플리카가 listen 하는 포트
pub const APP_PORT: u16 = 5678;

/// 프로젝트명 최대 길이 (DNS 라벨 제한)
pub const MAX_PROJECT_NAME_LEN: usize = 63;

/// 테스트 프로젝트 식별자
///
/// 컨테이너 이름, 네트워크 별칭, 라벨, 네트워크 이름이 모두 이 값에서
/// 파생됩니다. 소문자 영숫자로 시작하고 `[a-z0-9_-]` 만 허용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectName(String);

impl ProjectName {
    /// 검증 후 프로젝트명을 생성합니다.
    pub fn new(value: impl Into<String>) -> Result<Self, TestbedError> {
        let value = value.into();
        validate_project_name(&value)?;
        Ok(Self(value))
    }

    /// 실행마다 고유한 프로젝트명(`testbed-<8 hex>`)을 생성합니다.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("testbed-{}", &id[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<project>-<service>` 형식의 인스턴스 이름
    pub fn instance_name(&self, service: &str) -> String {
        format!("{}-{}", self.0, service)
    }

    /// k번째(1부터) main 레플리카의 네트워크 별칭
    pub fn replica_alias(&self, index: usize) -> String {
        self.instance_name(&format!("{}-{index}", ServiceKind::MainReplica.tag()))
    }

    /// 프로젝트 전용 격리 네트워크 이름
    pub fn network_name(&self) -> String {
        self.instance_name("network")
    }

    /// 인스턴스에 붙일 프로젝트/서비스 라벨 쌍
    pub fn labels(&self, service: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_PROJECT.to_owned(), self.0.clone()),
            (LABEL_SERVICE.to_owned(), service.to_owned()),
        ])
    }

    /// 프로젝트 라벨 필터 값 (`key=value`)
    pub fn label_filter(&self) -> String {
        format!("{LABEL_PROJECT}={}", self.0)
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProjectName {
    type Error = TestbedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectName> for String {
    fn from(name: ProjectName) -> Self {
        name.0
    }
}

fn validate_project_name(value: &str) -> Result<(), TestbedError> {
    let invalid = |reason: &str| TestbedError::InvalidName {
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    if value.is_empty() || value.len() > MAX_PROJECT_NAME_LEN {
        return Err(invalid(&format!(
            "length must be 1-{MAX_PROJECT_NAME_LEN}"
        )));
    }
    let mut chars = value.chars();
    if !chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid("must start with a lowercase letter or digit"));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_') {
        return Err(invalid("only [a-z0-9_-] allowed"));
    }
    Ok(())
}

/// 프로비저닝 대상 서비스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// 캐시 스토어 (redis)
    Cache,
    /// 관계형 데이터베이스 (postgres)
    Database,
    /// 애플리케이션 main 레플리카
    MainReplica,
    /// 로드 밸런서 (nginx)
    LoadBalancer,
    /// 브라우저 자동화 서버 (playwright MCP)
    Browser,
    /// 로컬 모델 추론 서버 (ollama)
    Inference,
}

impl ServiceKind {
    /// 이름/라벨에 쓰이는 고정 서비스 태그
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Cache => "redis",
            Self::Database => "postgres",
            Self::MainReplica => "n8n-main",
            Self::LoadBalancer => "nginx-lb",
            Self::Browser => "playwright-mcp",
            Self::Inference => "ollama",
        }
    }

    /// 서비스가 listen 하는 컨테이너 포트
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Cache => 6379,
            Self::Database => 5432,
            Self::MainReplica => APP_PORT,
            Self::LoadBalancer => 80,
            Self::Browser => 8931,
            Self::Inference => 11434,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 노출할 포트
///
/// `host`가 `None`이면 런타임이 임의의 호스트 포트를 할당합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub container: u16,
    pub host: Option<u16>,
}

impl PortSpec {
    pub fn ephemeral(container: u16) -> Self {
        Self {
            container,
            host: None,
        }
    }

    pub fn fixed(container: u16, host: u16) -> Self {
        Self {
            container,
            host: Some(host),
        }
    }
}

/// 시작 전에 컨테이너 파일시스템에 복사할 파일
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCopy {
    /// 컨테이너 내부 절대 경로
    pub path: String,
    /// 파일 내용
    pub content: String,
    /// 파일 권한
    pub mode: u32,
}

/// 준비 상태 판정 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitStrategy {
    /// 매핑된 호스트 포트로 TCP 연결이 성립하면 준비 완료
    ListeningPort { port: u16 },
    /// `GET path` 응답 코드가 `status`이면 준비 완료
    Http { port: u16, path: String, status: u16 },
    /// 컨테이너 내부 명령이 exit 0 (및 기대 출력 포함)이면 준비 완료
    Exec {
        command: Vec<String>,
        expect_stdout: Option<String>,
    },
}

impl WaitStrategy {
    /// 로그/메트릭용 고정 이름
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ListeningPort { .. } => "listening_port",
            Self::Http { .. } => "http",
            Self::Exec { .. } => "exec",
        }
    }
}

/// 서비스 하나에 대한 선언적 요청
///
/// 제출 이후에는 변경하지 않습니다. 서비스별 규칙은
/// [`ServiceDescriptor::base`]에 struct update 문법으로 필드를 덮어써 만듭니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// 결정적 인스턴스 이름 (`<project>-<service>`)
    pub name: String,
    pub kind: ServiceKind,
    /// 서비스 태그 (레플리카는 `n8n-main-<k>`)
    pub service: String,
    pub image: String,
    /// 네트워크 별칭 (첫 번째가 대표 별칭)
    pub aliases: Vec<String>,
    pub ports: Vec<PortSpec>,
    pub env: BTreeMap<String, String>,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub files: Vec<FileCopy>,
    pub wait: WaitStrategy,
    #[serde(with = "duration_secs")]
    pub startup_timeout: Duration,
    pub reuse: bool,
}

impl ServiceDescriptor {
    /// 이름, 별칭, 라벨이 채워진 기본 요청을 만듭니다.
    pub fn base(
        project: &ProjectName,
        kind: ServiceKind,
        service: &str,
        image: &str,
        wait: WaitStrategy,
    ) -> Self {
        let name = project.instance_name(service);
        Self {
            aliases: vec![name.clone()],
            name,
            kind,
            service: service.to_owned(),
            image: image.to_owned(),
            ports: vec![PortSpec::ephemeral(kind.default_port())],
            env: BTreeMap::new(),
            command: Vec::new(),
            labels: project.labels(service),
            files: Vec::new(),
            wait,
            startup_timeout: Duration::from_secs(10),
            reuse: true,
        }
    }

    /// 대표 네트워크 별칭
    pub fn primary_alias(&self) -> &str {
        self.aliases.first().map_or(self.name.as_str(), String::as_str)
    }

    /// 요청이 일관된지 검증합니다.
    pub fn validate(&self) -> Result<(), String> {
        if self.image.trim().is_empty() {
            return Err(format!("{}: image must not be empty", self.name));
        }
        if self.aliases.is_empty() {
            return Err(format!("{}: at least one network alias required", self.name));
        }
        if self.startup_timeout.is_zero() {
            return Err(format!("{}: startup timeout must be > 0", self.name));
        }
        for (i, port) in self.ports.iter().enumerate() {
            if self.ports[..i].iter().any(|p| p.container == port.container) {
                return Err(format!(
                    "{}: container port {} exposed twice",
                    self.name, port.container
                ));
            }
        }
        if let Some(file) = self.files.iter().find(|f| !f.path.starts_with('/')) {
            return Err(format!(
                "{}: file path '{}' must be absolute",
                self.name, file.path
            ));
        }
        match &self.wait {
            WaitStrategy::ListeningPort { port } | WaitStrategy::Http { port, .. } => {
                if !self.ports.iter().any(|p| p.container == *port) {
                    return Err(format!(
                        "{}: readiness port {port} is not exposed",
                        self.name
                    ));
                }
            }
            WaitStrategy::Exec { command, .. } => {
                if command.is_empty() {
                    return Err(format!("{}: readiness command is empty", self.name));
                }
            }
        }
        Ok(())
    }
}

/// 컨테이너 포트 ↔ 호스트 포트 매핑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container: u16,
    pub host: u16,
}

/// 격리 네트워크 핸들
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
    pub project: ProjectName,
}

/// 프로비저닝된 실행 중 서비스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHandle {
    pub kind: ServiceKind,
    pub container_id: String,
    pub name: String,
    /// 피어가 사용하는 네트워크 별칭
    pub alias: String,
    pub network: String,
    /// 호스트 측 접속 주소
    pub host: String,
    pub ports: Vec<PortMapping>,
    /// 기존 인스턴스를 재사용했는지 여부
    pub reused: bool,
}

impl ServiceHandle {
    /// 컨테이너 포트에 매핑된 호스트 포트
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container == container_port)
            .map(|p| p.host)
    }

    /// 네트워크 내부에서 피어가 쓰는 주소 (`alias:port`)
    pub fn internal_address(&self, container_port: u16) -> String {
        format!("{}:{container_port}", self.alias)
    }

    /// 호스트에서 접근하는 HTTP URL
    pub fn external_url(&self, container_port: u16) -> Option<String> {
        self.host_port(container_port)
            .map(|port| format!("http://{}:{port}", self.host))
    }
}

/// 런타임이 보고하는 컨테이너 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    /// `running`, `exited`, `created` 등
    pub state: String,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    /// compose 서비스 라벨 값
    pub fn service(&self) -> Option<&str> {
        self.labels.get(LABEL_SERVICE).map(String::as_str)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// 컨테이너 내부 명령 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
