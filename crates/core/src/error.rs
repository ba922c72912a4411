//! 에러 타입: 도메인별 에러 정의

/// testbed 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TestbedError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 컨테이너 런타임 / 프로비저닝 에러
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    /// 잘못된 식별자 (프로젝트명, 서비스 태그 등)
    #[error("invalid name '{value}': {reason}")]
    InvalidName { value: String, reason: String },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 컨테이너 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 런타임(Docker) 연결 실패
    #[error("runtime unreachable: {0}")]
    Unreachable(String),

    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    Api(String),

    /// 준비 상태 대기 시간 초과
    #[error("service '{service}' not ready after {timeout_secs}s")]
    StartupTimeout { service: String, timeout_secs: u64 },

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    NotFound(String),

    /// 서비스 요청 자체가 잘못됨
    #[error("invalid service spec: {0}")]
    InvalidSpec(String),
}
