//! 로컬 모델 추론 서버 (ollama)
//!
//! 서버가 준비된 뒤 모델을 pull 하는 단계는 best-effort 입니다.
//! pull 실패나 확인 실패는 경고로만 남기고 핸들은 항상 반환합니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use testbed_core::config::{DEFAULT_OLLAMA_IMAGE, DEFAULT_OLLAMA_MODEL};
use testbed_core::metrics as m;
use testbed_core::types::{ProjectName, ServiceDescriptor, ServiceHandle, ServiceKind, WaitStrategy};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::{ProjectScope, Provisioner};

/// 추론 서버 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceParams {
    pub image: String,
    pub model: String,
    /// 준비 후 모델을 pull 할지 여부
    pub pull_model: bool,
    pub startup_timeout: Duration,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_OLLAMA_IMAGE.to_owned(),
            model: DEFAULT_OLLAMA_MODEL.to_owned(),
            pull_model: true,
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// 추론 서버 핸들
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceHandle {
    pub handle: ServiceHandle,
    pub model: String,
    /// `ollama list`로 모델 존재가 확인되었는지
    pub model_ready: bool,
}

/// `GET /api/tags`가 200이면 준비 완료입니다.
pub fn inference_descriptor(
    project: &ProjectName,
    params: &InferenceParams,
) -> Result<ServiceDescriptor, ProvisionError> {
    if params.model.trim().is_empty() {
        return Err(ProvisionError::InvalidSpec(
            "inference model must not be empty".to_owned(),
        ));
    }

    let kind = ServiceKind::Inference;
    Ok(ServiceDescriptor {
        startup_timeout: params.startup_timeout,
        ..ServiceDescriptor::base(
            project,
            kind,
            kind.tag(),
            &params.image,
            WaitStrategy::Http {
                port: kind.default_port(),
                path: "/api/tags".to_owned(),
                status: 200,
            },
        )
    })
}

/// `ollama list` 출력에 모델이 있는지 확인합니다. 태그가 없으면 `latest`로 봅니다.
pub fn model_listed(list_output: &str, model: &str) -> bool {
    let tagged = if model.contains(':') {
        model.to_owned()
    } else {
        format!("{model}:latest")
    };
    list_output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == model || name == tagged)
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 추론 서버를 시작하고 모델 pull 을 시도합니다.
    ///
    /// 서버 준비 실패만 에러가 되며, 모델 단계의 실패는 `model_ready = false`로 나타납니다.
    pub async fn start_inference(
        &self,
        scope: &ProjectScope,
        params: &InferenceParams,
    ) -> Result<InferenceHandle, ProvisionError> {
        let descriptor = inference_descriptor(&scope.project, params)?;
        let handle = self.provision(scope, descriptor).await?;

        let model_ready = if !params.pull_model {
            false
        } else if self
            .model_present(&handle, &params.model, self.config().model_verify_timeout())
            .await
        {
            info!(container = %handle.name, model = %params.model, "model already present");
            true
        } else {
            self.pull_model(&handle, &params.model).await;
            self.verify_model(&handle, &params.model).await
        };

        Ok(InferenceHandle {
            handle,
            model: params.model.clone(),
            model_ready,
        })
    }

    /// `ollama list`가 `timeout` 안에 끝나지 않으면 모델이 없는 것으로 봅니다.
    async fn model_present(
        &self,
        handle: &ServiceHandle,
        model: &str,
        timeout: Duration,
    ) -> bool {
        let list = ["ollama".to_owned(), "list".to_owned()];
        let listing = self.runtime().exec(&handle.container_id, &list);
        match tokio::time::timeout(timeout, listing).await {
            Ok(Ok(out)) => out.success() && model_listed(&out.stdout, model),
            Ok(Err(e)) => {
                debug!(container = %handle.name, error = %e, "ollama list failed");
                false
            }
            Err(_) => {
                debug!(container = %handle.name, "ollama list did not complete");
                false
            }
        }
    }

    /// `ollama pull` 을 실행합니다. 실패는 경고로만 기록합니다.
    async fn pull_model(&self, handle: &ServiceHandle, model: &str) {
        let command = ["ollama".to_owned(), "pull".to_owned(), model.to_owned()];
        let timeout = self.config().model_pull_timeout();
        info!(container = %handle.name, model, "pulling model");

        let failure = match tokio::time::timeout(
            timeout,
            self.runtime().exec(&handle.container_id, &command),
        )
        .await
        {
            Ok(Ok(out)) if out.success() => None,
            Ok(Ok(out)) => Some(format!(
                "exit code {}: {}",
                out.exit_code,
                out.stderr.trim()
            )),
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {}s", timeout.as_secs())),
        };

        match failure {
            None => info!(container = %handle.name, model, "model pulled"),
            Some(reason) => {
                metrics::counter!(m::MODEL_PULL_FAILURES_TOTAL).increment(1);
                warn!(
                    container = %handle.name,
                    model,
                    reason = %reason,
                    "model pull failed, continuing without model"
                );
            }
        }
    }

    /// pull 이후 모델이 목록에 나타날 때까지 제한 시간 안에서 확인합니다.
    async fn verify_model(&self, handle: &ServiceHandle, model: &str) -> bool {
        let poll = self.config().poll_interval();
        let deadline = Instant::now() + self.config().model_verify_timeout();
        loop {
            let budget = deadline.saturating_duration_since(Instant::now()).max(poll);
            if self.model_present(handle, model, budget).await {
                info!(container = %handle.name, model, "model available");
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(container = %handle.name, model, "model not listed after pull");
                return false;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }
    }
}
