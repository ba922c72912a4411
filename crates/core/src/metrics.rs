//! 메트릭 상수 및 설명 등록
//!
//! 프로비저너가 기록하는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 호출 측은 이 상수로 `metrics::counter!()`, `metrics::histogram!()`을 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `testbed_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 서비스 태그 레이블 키 (redis, postgres, nginx-lb ...)
pub const LABEL_SERVICE: &str = "service";

/// 결과 레이블 키 (created, reused, failure)
pub const LABEL_RESULT: &str = "result";

/// 준비 검사 종류 레이블 키 (listening_port, http, exec)
pub const LABEL_WAIT: &str = "wait";

// ─── Provisioner 메트릭 ─────────────────────────────────────────────

/// 프로비저닝 호출 수 (counter, label: service, result)
pub const PROVISION_TOTAL: &str = "testbed_provision_total";

/// 기존 인스턴스 재사용 수 (counter, label: service)
pub const PROVISION_REUSE_TOTAL: &str = "testbed_provision_reuse_total";

/// 준비 상태 대기 시간 (histogram, label: service, wait)
pub const READINESS_WAIT_SECONDS: &str = "testbed_readiness_wait_seconds";

/// 준비 상태 타임아웃 수 (counter, label: service)
pub const READINESS_TIMEOUTS_TOTAL: &str = "testbed_readiness_timeouts_total";

/// 모델 pull 실패 수 (counter)
pub const MODEL_PULL_FAILURES_TOTAL: &str = "testbed_model_pull_failures_total";

/// teardown 으로 제거된 컨테이너 수 (counter)
pub const TEARDOWN_REMOVED_TOTAL: &str = "testbed_teardown_removed_total";

/// 준비 대기 히스토그램 버킷 (초)
pub const READINESS_WAIT_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다. recorder가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(
        PROVISION_TOTAL,
        "Total number of service provisioning calls by outcome"
    );
    describe_counter!(
        PROVISION_REUSE_TOTAL,
        "Total number of provisioning calls satisfied by an existing instance"
    );
    describe_histogram!(
        READINESS_WAIT_SECONDS,
        "Time spent waiting for a service readiness gate in seconds"
    );
    describe_counter!(
        READINESS_TIMEOUTS_TOTAL,
        "Total number of readiness gates that hit their startup timeout"
    );
    describe_counter!(
        MODEL_PULL_FAILURES_TOTAL,
        "Total number of best-effort model pulls that failed"
    );
    describe_counter!(
        TEARDOWN_REMOVED_TOTAL,
        "Total number of containers removed during project teardown"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PROVISION_TOTAL,
        PROVISION_REUSE_TOTAL,
        READINESS_WAIT_SECONDS,
        READINESS_TIMEOUTS_TOTAL,
        MODEL_PULL_FAILURES_TOTAL,
        TEARDOWN_REMOVED_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_testbed_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("testbed_"),
                "Metric '{}' does not start with 'testbed_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn wait_buckets_are_sorted() {
        for pair in READINESS_WAIT_BUCKETS.windows(2) {
            assert!(pair[1] > pair[0], "Bucket values must be in ascending order");
        }
    }
}
