//! 설정 관리: testbed.toml 파싱 및 런타임 설정
//!
//! [`TestbedConfig`]는 프로비저너와 CLI가 쓰는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TESTBED_PROJECT_NAME=e2e` 형식)
//! 3. 설정 파일 (`testbed.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), testbed_core::error::TestbedError> {
//! use testbed_core::config::TestbedConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TestbedConfig::load("testbed.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TestbedConfig::parse("[project]\nmain_replicas = 3")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TestbedError};
use crate::types::ProjectName;

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_POLL_INTERVAL_MS: u64 = 10_000;
const MAX_MAIN_REPLICAS: usize = 16;

/// 서비스별 기본 이미지
pub const DEFAULT_REDIS_IMAGE: &str = "redis:7-alpine";
pub const DEFAULT_POSTGRES_IMAGE: &str = "postgres:16-alpine";
pub const DEFAULT_N8N_IMAGE: &str = "n8nio/n8n:latest";
pub const DEFAULT_NGINX_IMAGE: &str = "nginx:stable-alpine";
pub const DEFAULT_BROWSER_IMAGE: &str = "mcr.microsoft.com/playwright/mcp:latest";
pub const DEFAULT_OLLAMA_IMAGE: &str = "ollama/ollama:latest";

/// 추론 서버 기본 모델
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen3:0.6b";

/// 데이터베이스 기본 자격 증명
pub const DEFAULT_POSTGRES_DATABASE: &str = "n8n_db";
pub const DEFAULT_POSTGRES_USER: &str = "n8n_user";
pub const DEFAULT_POSTGRES_PASSWORD: &str = "test_password";

/// testbed 통합 설정
///
/// `testbed.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestbedConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 프로젝트(토폴로지) 설정
    #[serde(default)]
    pub project: ProjectConfig,
    /// 서비스별 이미지
    #[serde(default)]
    pub images: ImageConfig,
    /// 준비 상태 대기 시간
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// 선택 서비스 설정
    #[serde(default)]
    pub services: ServicesConfig,
}

impl TestbedConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TestbedError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에서 시작해 환경변수 오버라이드를 적용합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, TestbedError> {
        match Self::load(path.as_ref()).await {
            Err(TestbedError::Config(ConfigError::FileNotFound { path })) => {
                warn!(path = %path, "config file not found, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TestbedError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TestbedError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TestbedError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TestbedError> {
        toml::from_str(toml_str).map_err(|e| {
            TestbedError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TESTBED_{SECTION}_{FIELD}`
    /// 예: `TESTBED_IMAGES_POSTGRES=postgres:17`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TESTBED_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TESTBED_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "TESTBED_DOCKER_SOCKET");
        override_u64(
            &mut self.docker.connect_timeout_secs,
            "TESTBED_DOCKER_CONNECT_TIMEOUT_SECS",
        );
        override_string(&mut self.docker.probe_host, "TESTBED_DOCKER_PROBE_HOST");

        // Project
        override_string(&mut self.project.name, "TESTBED_PROJECT_NAME");
        override_bool(&mut self.project.reuse, "TESTBED_PROJECT_REUSE");
        override_usize(
            &mut self.project.main_replicas,
            "TESTBED_PROJECT_MAIN_REPLICAS",
        );
        override_u16(
            &mut self.project.lb_host_port,
            "TESTBED_PROJECT_LB_HOST_PORT",
        );

        // Images
        override_string(&mut self.images.redis, "TESTBED_IMAGES_REDIS");
        override_string(&mut self.images.postgres, "TESTBED_IMAGES_POSTGRES");
        override_string(&mut self.images.n8n, "TESTBED_IMAGES_N8N");
        override_string(&mut self.images.nginx, "TESTBED_IMAGES_NGINX");
        override_string(&mut self.images.browser, "TESTBED_IMAGES_BROWSER");
        override_string(&mut self.images.ollama, "TESTBED_IMAGES_OLLAMA");

        // Timeouts
        override_u64(
            &mut self.timeouts.default_secs,
            "TESTBED_TIMEOUTS_DEFAULT_SECS",
        );
        override_u64(
            &mut self.timeouts.database_secs,
            "TESTBED_TIMEOUTS_DATABASE_SECS",
        );
        override_u64(&mut self.timeouts.http_secs, "TESTBED_TIMEOUTS_HTTP_SECS");
        override_u64(
            &mut self.timeouts.poll_interval_ms,
            "TESTBED_TIMEOUTS_POLL_INTERVAL_MS",
        );

        // Services
        override_bool(&mut self.services.browser, "TESTBED_SERVICES_BROWSER");
        override_bool(&mut self.services.headless, "TESTBED_SERVICES_HEADLESS");
        override_bool(&mut self.services.ollama, "TESTBED_SERVICES_OLLAMA");
        override_string(&mut self.services.ollama_model, "TESTBED_SERVICES_OLLAMA_MODEL");
        override_string(
            &mut self.services.postgres_database,
            "TESTBED_SERVICES_POSTGRES_DATABASE",
        );
        override_string(
            &mut self.services.postgres_user,
            "TESTBED_SERVICES_POSTGRES_USER",
        );
        override_string(
            &mut self.services.postgres_password,
            "TESTBED_SERVICES_POSTGRES_PASSWORD",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TestbedError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.docker.connect_timeout_secs == 0
            || self.docker.connect_timeout_secs > MAX_TIMEOUT_SECS
        {
            return Err(invalid(
                "docker.connect_timeout_secs",
                format!("must be 1-{MAX_TIMEOUT_SECS}"),
            ));
        }

        if self.docker.probe_host.is_empty() {
            return Err(invalid("docker.probe_host", "must not be empty".to_owned()));
        }

        // 빈 문자열은 실행마다 새 이름 생성
        if !self.project.name.is_empty() {
            ProjectName::new(self.project.name.as_str())
                .map_err(|e| invalid("project.name", e.to_string()))?;
        }

        if self.project.main_replicas == 0 || self.project.main_replicas > MAX_MAIN_REPLICAS {
            return Err(invalid(
                "project.main_replicas",
                format!("must be 1-{MAX_MAIN_REPLICAS}"),
            ));
        }

        for (field, image) in self.images.entries() {
            if image.trim().is_empty() {
                return Err(invalid(field, "image must not be empty".to_owned()));
            }
        }

        for (field, secs) in [
            ("timeouts.default_secs", self.timeouts.default_secs),
            ("timeouts.database_secs", self.timeouts.database_secs),
            ("timeouts.http_secs", self.timeouts.http_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(invalid(field, format!("must be 1-{MAX_TIMEOUT_SECS}")));
            }
        }

        if self.timeouts.poll_interval_ms == 0
            || self.timeouts.poll_interval_ms > MAX_POLL_INTERVAL_MS
        {
            return Err(invalid(
                "timeouts.poll_interval_ms",
                format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            ));
        }

        if self.services.ollama && self.services.ollama_model.trim().is_empty() {
            return Err(invalid(
                "services.ollama_model",
                "model must not be empty when ollama is enabled".to_owned(),
            ));
        }

        if self.services.postgres_database.is_empty()
            || self.services.postgres_user.is_empty()
            || self.services.postgres_password.is_empty()
        {
            return Err(invalid(
                "services.postgres_*",
                "database, user and password must not be empty".to_owned(),
            ));
        }

        Ok(())
    }

    /// 설정된 프로젝트명, 비어 있으면 새로 생성한 이름
    pub fn project_name(&self) -> Result<ProjectName, TestbedError> {
        if self.project.name.is_empty() {
            Ok(ProjectName::generate())
        } else {
            ProjectName::new(self.project.name.as_str())
        }
    }
}

fn invalid(field: &str, reason: String) -> TestbedError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (빈 문자열이면 플랫폼 기본값)
    pub socket: String,
    /// API 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
    /// 준비 상태 검사 시 매핑된 포트에 접속할 호스트
    pub probe_host: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: String::new(),
            connect_timeout_secs: 120,
            probe_host: "127.0.0.1".to_owned(),
        }
    }
}

/// 프로젝트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// 프로젝트명 (빈 값이면 실행마다 생성)
    pub name: String,
    /// 같은 이름의 인스턴스 재사용 여부
    pub reuse: bool,
    /// main 레플리카 수
    pub main_replicas: usize,
    /// 로드 밸런서 호스트 포트 (0이면 임의 할당)
    pub lb_host_port: u16,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            reuse: true,
            main_replicas: 2,
            lb_host_port: 0,
        }
    }
}

/// 서비스별 이미지 레퍼런스
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub redis: String,
    pub postgres: String,
    pub n8n: String,
    pub nginx: String,
    pub browser: String,
    pub ollama: String,
}

impl ImageConfig {
    fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("images.redis", self.redis.as_str()),
            ("images.postgres", self.postgres.as_str()),
            ("images.n8n", self.n8n.as_str()),
            ("images.nginx", self.nginx.as_str()),
            ("images.browser", self.browser.as_str()),
            ("images.ollama", self.ollama.as_str()),
        ]
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            redis: DEFAULT_REDIS_IMAGE.to_owned(),
            postgres: DEFAULT_POSTGRES_IMAGE.to_owned(),
            n8n: DEFAULT_N8N_IMAGE.to_owned(),
            nginx: DEFAULT_NGINX_IMAGE.to_owned(),
            browser: DEFAULT_BROWSER_IMAGE.to_owned(),
            ollama: DEFAULT_OLLAMA_IMAGE.to_owned(),
        }
    }
}

/// 준비 상태 대기 시간 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 단순 프로토콜 검사 기본 타임아웃 (초)
    pub default_secs: u64,
    /// 데이터베이스 타임아웃 (초)
    pub database_secs: u64,
    /// HTTP 준비 검사 타임아웃 (초)
    pub http_secs: u64,
    /// 준비 검사 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }

    pub fn database_timeout(&self) -> Duration {
        Duration::from_secs(self.database_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 10,
            database_secs: 30,
            http_secs: 60,
            poll_interval_ms: 250,
        }
    }
}

/// 선택 서비스 및 자격 증명 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// 브라우저 자동화 서버 활성화
    pub browser: bool,
    /// 브라우저 headless 모드
    pub headless: bool,
    /// 추론 서버 활성화
    pub ollama: bool,
    /// 추론 서버에 pull 할 모델
    pub ollama_model: String,
    pub postgres_database: String,
    pub postgres_user: String,
    pub postgres_password: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            browser: false,
            headless: true,
            ollama: false,
            ollama_model: DEFAULT_OLLAMA_MODEL.to_owned(),
            postgres_database: DEFAULT_POSTGRES_DATABASE.to_owned(),
            postgres_user: DEFAULT_POSTGRES_USER.to_owned(),
            postgres_password: DEFAULT_POSTGRES_PASSWORD.to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key);
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = std::any::type_name::<T>(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = TestbedConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert!(config.project.reuse);
        assert_eq!(config.project.main_replicas, 2);
        assert_eq!(config.timeouts.database_secs, 30);
        assert_eq!(config.timeouts.http_secs, 60);
        assert!(!config.services.ollama);
    }

    #[test]
    fn default_config_passes_validation() {
        TestbedConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = TestbedConfig::parse("").unwrap();
        assert_eq!(config.images.postgres, "postgres:16-alpine");
        assert_eq!(config.docker.probe_host, "127.0.0.1");
    }

    #[test]
    fn partial_toml_merges_with_defaults() {
        let toml = r#"
[project]
name = "e2e"
main_replicas = 3

[images]
n8n = "n8nio/n8n:1.100.0"
"#;
        let config = TestbedConfig::parse(toml).unwrap();
        assert_eq!(config.project.name, "e2e");
        assert_eq!(config.project.main_replicas, 3);
        assert!(config.project.reuse);
        assert_eq!(config.images.n8n, "n8nio/n8n:1.100.0");
        assert_eq!(config.images.redis, "redis:7-alpine");
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let err = TestbedConfig::parse("project = [[[").unwrap_err();
        assert!(matches!(
            err,
            TestbedError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = TestbedConfig::default();
        config.general.log_format = "xml".to_owned();
        assert!(config.validate().unwrap_err().to_string().contains("log_format"));

        let mut config = TestbedConfig::default();
        config.project.main_replicas = 0;
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("main_replicas")
        );

        let mut config = TestbedConfig::default();
        config.timeouts.http_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("http_secs"));

        let mut config = TestbedConfig::default();
        config.project.name = "Bad Name".to_owned();
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("project.name")
        );

        let mut config = TestbedConfig::default();
        config.images.nginx = String::new();
        assert!(config.validate().unwrap_err().to_string().contains("images.nginx"));
    }

    #[test]
    fn validate_requires_model_when_ollama_enabled() {
        let mut config = TestbedConfig::default();
        config.services.ollama = true;
        config.services.ollama_model = String::new();
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("ollama_model")
        );
    }

    #[test]
    fn project_name_generated_when_empty() {
        let config = TestbedConfig::default();
        let name = config.project_name().unwrap();
        assert!(name.as_str().starts_with("testbed-"));

        let mut config = TestbedConfig::default();
        config.project.name = "e2e".to_owned();
        assert_eq!(config.project_name().unwrap().as_str(), "e2e");
    }

    #[test]
    #[serial]
    fn env_override_applies_typed_values() {
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe {
            std::env::set_var("TESTBED_PROJECT_MAIN_REPLICAS", "4");
            std::env::set_var("TESTBED_PROJECT_REUSE", "false");
            std::env::set_var("TESTBED_IMAGES_POSTGRES", "postgres:17");
        }
        let mut config = TestbedConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("TESTBED_PROJECT_MAIN_REPLICAS");
            std::env::remove_var("TESTBED_PROJECT_REUSE");
            std::env::remove_var("TESTBED_IMAGES_POSTGRES");
        }
        assert_eq!(config.project.main_replicas, 4);
        assert!(!config.project.reuse);
        assert_eq!(config.images.postgres, "postgres:17");
    }

    #[test]
    #[serial]
    fn env_override_invalid_value_keeps_original() {
        // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
        unsafe { std::env::set_var("TESTBED_TIMEOUTS_HTTP_SECS", "soon") };
        let mut config = TestbedConfig::default();
        config.apply_env_overrides();
        unsafe { std::env::remove_var("TESTBED_TIMEOUTS_HTTP_SECS") };
        assert_eq!(config.timeouts.http_secs, 60);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = TestbedConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = TestbedConfig::parse(&toml_str).unwrap();
        assert_eq!(config.images.ollama, parsed.images.ollama);
        assert_eq!(config.timeouts.poll_interval_ms, parsed.timeouts.poll_interval_ms);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = TestbedConfig::from_file("/nonexistent/testbed.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TestbedError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    #[serial]
    async fn load_or_default_falls_back_when_missing() {
        let config = TestbedConfig::load_or_default("/nonexistent/testbed.toml")
            .await
            .unwrap();
        assert_eq!(config.project.main_replicas, 2);
    }
}
