//! 준비 상태 게이트
//!
//! [`wait_until_ready`]는 [`WaitStrategy`]를 시작 제한 시간 안에서 반복 검사합니다.
//! 각 시도는 남은 시간으로 제한되므로 호출이 제한 시간을 넘겨 멈추지 않습니다.
//! 컨테이너가 먼저 종료되면 제한 시간을 기다리지 않고 즉시 실패합니다.

use std::time::Duration;

use testbed_core::metrics as m;
use testbed_core::types::{PortMapping, WaitStrategy};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;

/// 검사 대상 인스턴스
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    /// 메트릭 레이블용 서비스 태그
    pub service: &'a str,
    /// 인스턴스 이름
    pub name: &'a str,
    pub container_id: &'a str,
    /// 호스트 측 접속 주소
    pub host: &'a str,
    pub ports: &'a [PortMapping],
}

impl ProbeTarget<'_> {
    fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container == container_port)
            .map(|p| p.host)
    }
}

/// 한 번의 검사 결과
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observation {
    Ready,
    NotReady(String),
}

/// 준비 검사 실행기
pub struct ReadinessGate<'a, R: ContainerRuntime> {
    runtime: &'a R,
    http: &'a reqwest::Client,
    poll_interval: Duration,
}

impl<'a, R: ContainerRuntime> ReadinessGate<'a, R> {
    pub fn new(runtime: &'a R, http: &'a reqwest::Client, poll_interval: Duration) -> Self {
        Self {
            runtime,
            http,
            poll_interval,
        }
    }

    /// 준비될 때까지 기다리고 걸린 시간을 반환합니다.
    pub async fn wait(
        &self,
        target: ProbeTarget<'_>,
        wait: &WaitStrategy,
        timeout: Duration,
    ) -> Result<Duration, ProvisionError> {
        wait_until_ready(self, target, wait, timeout).await
    }

    async fn probe(&self, target: &ProbeTarget<'_>, wait: &WaitStrategy) -> Observation {
        match wait {
            WaitStrategy::ListeningPort { port } => {
                let Some(host_port) = target.host_port(*port) else {
                    return Observation::NotReady(format!("port {port} has no host mapping"));
                };
                match tokio::net::TcpStream::connect((target.host, host_port)).await {
                    Ok(_) => Observation::Ready,
                    Err(e) => Observation::NotReady(format!(
                        "tcp {}:{host_port} -> {e}",
                        target.host
                    )),
                }
            }
            WaitStrategy::Http { port, path, status } => {
                let Some(host_port) = target.host_port(*port) else {
                    return Observation::NotReady(format!("port {port} has no host mapping"));
                };
                let url = format!("http://{}:{host_port}{path}", target.host);
                match self.http.get(&url).send().await {
                    Ok(resp) if resp.status().as_u16() == *status => Observation::Ready,
                    Ok(resp) => {
                        Observation::NotReady(format!("GET {path} -> {}", resp.status().as_u16()))
                    }
                    Err(e) => Observation::NotReady(format!("GET {path} -> {e}")),
                }
            }
            WaitStrategy::Exec {
                command,
                expect_stdout,
            } => match self.runtime.exec(target.container_id, command).await {
                Ok(out) if !out.success() => Observation::NotReady(format!(
                    "`{}` exited with {}",
                    command.join(" "),
                    out.exit_code
                )),
                Ok(out) => match expect_stdout {
                    Some(expected) if !out.stdout.contains(expected.as_str()) => {
                        Observation::NotReady(format!(
                            "`{}` printed {:?}, expected {expected:?}",
                            command.join(" "),
                            out.stdout.trim()
                        ))
                    }
                    _ => Observation::Ready,
                },
                Err(e) => Observation::NotReady(format!("exec failed: {e}")),
            },
        }
    }

    /// 컨테이너가 이미 종료됐으면 에러를 반환합니다.
    async fn ensure_alive(&self, target: &ProbeTarget<'_>) -> Result<(), ProvisionError> {
        match self.runtime.find_container(target.container_id).await {
            Ok(Some(summary)) if matches!(summary.state.as_str(), "exited" | "dead") => {
                Err(ProvisionError::ContainerExited {
                    name: target.name.to_owned(),
                    state: summary.state,
                })
            }
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(ProvisionError::ContainerNotFound(target.name.to_owned())),
            // 상태 조회 실패는 다음 시도에서 다시 확인
            Err(e) => {
                debug!(container = target.name, error = %e, "state check failed");
                Ok(())
            }
        }
    }
}

/// `wait` 조건이 성립할 때까지 `poll_interval` 간격으로 검사합니다.
///
/// # Errors
///
/// - 제한 시간 초과: [`ProvisionError::StartupTimeout`] (마지막 관찰 포함)
/// - 컨테이너 조기 종료: [`ProvisionError::ContainerExited`]
pub async fn wait_until_ready<R: ContainerRuntime>(
    gate: &ReadinessGate<'_, R>,
    target: ProbeTarget<'_>,
    wait: &WaitStrategy,
    timeout: Duration,
) -> Result<Duration, ProvisionError> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut attempts: u32 = 0;
    let mut last_observation = String::from("no probe completed");

    loop {
        attempts += 1;
        // 마감 시점의 마지막 검사도 한 폴링 간격만큼은 기다린다
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(gate.poll_interval);
        match tokio::time::timeout(remaining, gate.probe(&target, wait)).await {
            Ok(Observation::Ready) => {
                let elapsed = started.elapsed();
                metrics::histogram!(
                    m::READINESS_WAIT_SECONDS,
                    m::LABEL_SERVICE => target.service.to_owned(),
                    m::LABEL_WAIT => wait.kind_name()
                )
                .record(elapsed.as_secs_f64());
                info!(
                    container = target.name,
                    wait = wait.kind_name(),
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "service ready"
                );
                return Ok(elapsed);
            }
            Ok(Observation::NotReady(observation)) => {
                debug!(
                    container = target.name,
                    attempt = attempts,
                    observation = %observation,
                    "service not ready yet"
                );
                last_observation = observation;
            }
            Err(_) => {
                last_observation = format!("{} probe did not complete", wait.kind_name());
            }
        }

        gate.ensure_alive(&target).await?;

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(gate.poll_interval.min(deadline - now)).await;
    }

    metrics::counter!(
        m::READINESS_TIMEOUTS_TOTAL,
        m::LABEL_SERVICE => target.service.to_owned()
    )
    .increment(1);
    warn!(
        container = target.name,
        timeout_secs = timeout.as_secs(),
        attempts,
        last_observation = %last_observation,
        "service did not become ready"
    );
    Err(ProvisionError::StartupTimeout {
        service: target.name.to_owned(),
        timeout,
        last_observation,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::docker::MockRuntime;
    use testbed_core::types::{ContainerSummary, ExecOutput};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn running(runtime: &MockRuntime, id: &str) {
        runtime.insert_container(ContainerSummary {
            id: id.to_owned(),
            name: format!("demo-{id}"),
            image: "img".to_owned(),
            state: "running".to_owned(),
            labels: Default::default(),
        });
    }

    fn target<'a>(id: &'a str, ports: &'a [PortMapping]) -> ProbeTarget<'a> {
        ProbeTarget {
            service: "test",
            name: id,
            container_id: id,
            host: "127.0.0.1",
            ports,
        }
    }

    /// 모든 요청에 고정 상태 코드로 응답하는 로컬 HTTP 서버
    async fn http_server(status: u16) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn http_probe_succeeds_on_expected_status() {
        let runtime = MockRuntime::new();
        running(&runtime, "app");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(20));

        let port = http_server(200).await;
        let ports = [PortMapping {
            container: 5678,
            host: port,
        }];
        let wait = WaitStrategy::Http {
            port: 5678,
            path: "/healthz".to_owned(),
            status: 200,
        };
        let elapsed = gate
            .wait(target("app", &ports), &wait, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn http_probe_with_wrong_status_times_out() {
        let runtime = MockRuntime::new();
        running(&runtime, "app");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(20));

        let port = http_server(503).await;
        let ports = [PortMapping {
            container: 11434,
            host: port,
        }];
        let wait = WaitStrategy::Http {
            port: 11434,
            path: "/api/tags".to_owned(),
            status: 200,
        };
        let started = std::time::Instant::now();
        let err = gate
            .wait(target("app", &ports), &wait, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            ProvisionError::StartupTimeout {
                last_observation, ..
            } => assert!(last_observation.contains("503"), "{last_observation}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn listening_port_probe_connects() {
        let runtime = MockRuntime::new();
        running(&runtime, "lb");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(20));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ports = [PortMapping {
            container: 80,
            host: listener.local_addr().unwrap().port(),
        }];
        let wait = WaitStrategy::ListeningPort { port: 80 };
        assert!(
            gate.wait(target("lb", &ports), &wait, Duration::from_secs(2))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn unmapped_port_reports_observation() {
        let runtime = MockRuntime::new();
        running(&runtime, "lb");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(20));

        let wait = WaitStrategy::ListeningPort { port: 80 };
        let err = gate
            .wait(target("lb", &[]), &wait, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no host mapping"));
    }

    #[tokio::test(start_paused = true)]
    async fn exec_probe_checks_expected_stdout() {
        let runtime = MockRuntime::new().with_exec_result(
            "redis-cli",
            ExecOutput {
                exit_code: 0,
                stdout: "PONG\n".to_owned(),
                stderr: String::new(),
            },
        );
        running(&runtime, "redis");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(250));

        let wait = WaitStrategy::Exec {
            command: vec!["redis-cli".to_owned(), "ping".to_owned()],
            expect_stdout: Some("PONG".to_owned()),
        };
        assert!(
            gate.wait(target("redis", &[]), &wait, Duration::from_secs(10))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn service_ready_at_deadline_is_not_a_timeout() {
        let not_ready = ExecOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "loading".to_owned(),
        };
        let runtime = Arc::new(MockRuntime::new().with_exec_result("redis-cli", not_ready));
        running(&runtime, "redis");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(runtime.as_ref(), &http, Duration::from_millis(250));

        let flipper = Arc::clone(&runtime);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(280)).await;
            flipper.set_exec_result(
                "redis-cli",
                ExecOutput {
                    exit_code: 0,
                    stdout: "PONG\n".to_owned(),
                    stderr: String::new(),
                },
            );
        });

        let wait = WaitStrategy::Exec {
            command: vec!["redis-cli".to_owned(), "ping".to_owned()],
            expect_stdout: Some("PONG".to_owned()),
        };
        let elapsed = gate
            .wait(target("redis", &[]), &wait, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(elapsed >= Duration::from_millis(300));
        assert_eq!(runtime.exec_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_exec_probe_times_out_at_deadline() {
        let runtime = MockRuntime::new().with_exec_result(
            "pg_isready",
            ExecOutput {
                exit_code: 2,
                stdout: "no response".to_owned(),
                stderr: String::new(),
            },
        );
        running(&runtime, "postgres");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(250));

        let wait = WaitStrategy::Exec {
            command: vec!["pg_isready".to_owned()],
            expect_stdout: None,
        };
        let started = Instant::now();
        let err = gate
            .wait(target("postgres", &[]), &wait, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
        assert!(matches!(err, ProvisionError::StartupTimeout { .. }));
        assert!(runtime.exec_calls().len() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exited_container_fails_fast() {
        let runtime = MockRuntime::new().with_exec_result(
            "pg_isready",
            ExecOutput {
                exit_code: 1,
                ..ExecOutput::default()
            },
        );
        running(&runtime, "postgres");
        runtime.set_state("demo-postgres", "exited");
        let http = reqwest::Client::new();
        let gate = ReadinessGate::new(&runtime, &http, Duration::from_millis(250));

        let wait = WaitStrategy::Exec {
            command: vec!["pg_isready".to_owned()],
            expect_stdout: None,
        };
        let started = Instant::now();
        let err = gate
            .wait(target("postgres", &[]), &wait, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ContainerExited { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
