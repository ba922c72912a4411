//! 프로비저너 에러 타입
//!
//! [`ProvisionError`]는 프로비저닝 중 발생하는 모든 에러를 표현합니다.
//! `From<ProvisionError> for TestbedError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::time::Duration;

use testbed_core::error::{ConfigError, ContainerError, TestbedError};

/// 프로비저너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    Runtime(String),

    /// 런타임(Docker 소켓) 연결 실패
    #[error("runtime connection error: {0}")]
    RuntimeConnection(String),

    /// 준비 상태가 제한 시간 안에 성립하지 않음
    #[error("service '{service}' not ready within {timeout:?}: {last_observation}")]
    StartupTimeout {
        /// 인스턴스 이름
        service: String,
        /// 적용된 제한 시간
        timeout: Duration,
        /// 마지막 검사에서 관찰된 상태
        last_observation: String,
    },

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// 같은 이름의 컨테이너가 이미 존재함 (동시 생성 경쟁)
    #[error("container name already in use: {0}")]
    NameConflict(String),

    /// 서비스 요청이 잘못됨
    #[error("invalid service spec: {0}")]
    InvalidSpec(String),

    /// 컨테이너가 준비 전에 종료됨
    #[error("container '{name}' exited before becoming ready (state: {state})")]
    ContainerExited {
        /// 인스턴스 이름
        name: String,
        /// 마지막으로 관찰된 상태
        state: String,
    },

    /// 프로비저너 설정 값이 잘못됨
    #[error("config error: {field}: {reason}")]
    Config {
        /// 필드 이름
        field: String,
        /// 거부 사유
        reason: String,
    },

    /// 파일 아카이브 생성 실패
    #[error("archive error: {0}")]
    Archive(#[from] std::io::Error),
}

impl From<ProvisionError> for TestbedError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::RuntimeConnection(msg) => {
                TestbedError::Container(ContainerError::Unreachable(msg))
            }
            ProvisionError::StartupTimeout {
                service, timeout, ..
            } => TestbedError::Container(ContainerError::StartupTimeout {
                service,
                timeout_secs: timeout.as_secs(),
            }),
            ProvisionError::ContainerNotFound(name) => {
                TestbedError::Container(ContainerError::NotFound(name))
            }
            ProvisionError::InvalidSpec(msg) => {
                TestbedError::Container(ContainerError::InvalidSpec(msg))
            }
            ProvisionError::Config { field, reason } => {
                TestbedError::Config(ConfigError::InvalidValue { field, reason })
            }
            ProvisionError::Archive(e) => TestbedError::Io(e),
            other @ (ProvisionError::Runtime(_)
            | ProvisionError::NameConflict(_)
            | ProvisionError::ContainerExited { .. }) => {
                TestbedError::Container(ContainerError::Api(other.to_string()))
            }
        }
    }
}
