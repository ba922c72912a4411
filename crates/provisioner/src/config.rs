//! 프로비저너 설정
//!
//! [`ProvisionerConfig`]는 core의 [`TestbedConfig`](testbed_core::config::TestbedConfig)에서
//! 프로비저너가 쓰는 값만 꺼내고, core에 없는 내부 튜닝 값을 더합니다.
//!
//! # 사용 예시
//! ```ignore
//! use testbed_core::config::TestbedConfig;
//! use testbed_provisioner::config::ProvisionerConfig;
//!
//! let core_config = TestbedConfig::default();
//! let config = ProvisionerConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use testbed_core::config::TestbedConfig;

use crate::error::ProvisionError;

/// 프로비저너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// 매핑된 포트로 접속할 호스트 주소
    pub probe_host: String,
    /// 준비 상태 폴링 주기 (밀리초)
    pub poll_interval_ms: u64,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// HTTP 검사 요청 하나의 제한 시간 (밀리초)
    pub http_probe_timeout_ms: u64,
    /// 모델 pull 제한 시간 (초)
    pub model_pull_timeout_secs: u64,
    /// 모델 목록 확인 제한 시간 (초)
    pub model_verify_timeout_secs: u64,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            probe_host: "127.0.0.1".to_owned(),
            poll_interval_ms: 250,
            http_probe_timeout_ms: 2_000,
            model_pull_timeout_secs: 300,
            model_verify_timeout_secs: 15,
        }
    }
}

/// 설정 상한값 상수
const MAX_POLL_INTERVAL_MS: u64 = 10_000;
const MAX_HTTP_PROBE_TIMEOUT_MS: u64 = 60_000;
const MAX_MODEL_PULL_TIMEOUT_SECS: u64 = 3_600;
const MAX_MODEL_VERIFY_TIMEOUT_SECS: u64 = 300;

impl ProvisionerConfig {
    /// core 설정에서 프로비저너 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &TestbedConfig) -> Self {
        Self {
            probe_host: core.docker.probe_host.clone(),
            poll_interval_ms: core.timeouts.poll_interval_ms,
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.http_probe_timeout_ms)
    }

    pub fn model_pull_timeout(&self) -> Duration {
        Duration::from_secs(self.model_pull_timeout_secs)
    }

    pub fn model_verify_timeout(&self) -> Duration {
        Duration::from_secs(self.model_verify_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.probe_host.trim().is_empty() {
            return Err(ProvisionError::Config {
                field: "probe_host".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ProvisionError::Config {
                field: "poll_interval_ms".to_owned(),
                reason: format!("must be 1-{MAX_POLL_INTERVAL_MS}"),
            });
        }

        if self.http_probe_timeout_ms == 0 || self.http_probe_timeout_ms > MAX_HTTP_PROBE_TIMEOUT_MS
        {
            return Err(ProvisionError::Config {
                field: "http_probe_timeout_ms".to_owned(),
                reason: format!("must be 1-{MAX_HTTP_PROBE_TIMEOUT_MS}"),
            });
        }

        if self.model_pull_timeout_secs == 0
            || self.model_pull_timeout_secs > MAX_MODEL_PULL_TIMEOUT_SECS
        {
            return Err(ProvisionError::Config {
                field: "model_pull_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_MODEL_PULL_TIMEOUT_SECS}"),
            });
        }

        if self.model_verify_timeout_secs == 0
            || self.model_verify_timeout_secs > MAX_MODEL_VERIFY_TIMEOUT_SECS
        {
            return Err(ProvisionError::Config {
                field: "model_verify_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_MODEL_VERIFY_TIMEOUT_SECS}"),
            });
        }

        Ok(())
    }
}

/// 프로비저너 설정 빌더
#[derive(Default)]
pub struct ProvisionerConfigBuilder {
    config: ProvisionerConfig,
}

impl ProvisionerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 접속 호스트를 설정합니다.
    pub fn probe_host(mut self, host: impl Into<String>) -> Self {
        self.config.probe_host = host.into();
        self
    }

    /// 폴링 주기(밀리초)를 설정합니다.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// HTTP 검사 제한 시간(밀리초)을 설정합니다.
    pub fn http_probe_timeout_ms(mut self, ms: u64) -> Self {
        self.config.http_probe_timeout_ms = ms;
        self
    }

    /// 모델 pull 제한 시간(초)을 설정합니다.
    pub fn model_pull_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_pull_timeout_secs = secs;
        self
    }

    /// 모델 목록 확인 제한 시간(초)을 설정합니다.
    pub fn model_verify_timeout_secs(mut self, secs: u64) -> Self {
        self.config.model_verify_timeout_secs = secs;
        self
    }

    /// 검증 후 설정을 반환합니다.
    pub fn build(self) -> Result<ProvisionerConfig, ProvisionError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
