//! 애플리케이션 main 레플리카 (n8n)
//!
//! 레플리카는 데이터베이스와 캐시를 네트워크 별칭으로만 참조합니다.
//! 캐시가 연결되면 큐 모드와 multi-main 설정을 켭니다.

use std::collections::BTreeMap;
use std::time::Duration;

use testbed_core::config::DEFAULT_N8N_IMAGE;
use testbed_core::types::{
    APP_PORT, ProjectName, ServiceDescriptor, ServiceHandle, ServiceKind, WaitStrategy,
};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::{ProjectScope, Provisioner};
use crate::services::database::PostgresHandle;

/// 모든 레플리카가 공유해야 하는 기본 암호화 키
pub const DEFAULT_ENCRYPTION_KEY: &str = "testbed-shared-encryption-key";

/// 레플리카가 접속할 데이터베이스 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLink {
    pub alias: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl From<&PostgresHandle> for DatabaseLink {
    fn from(pg: &PostgresHandle) -> Self {
        Self {
            alias: pg.handle.alias.clone(),
            database: pg.database.clone(),
            username: pg.username.clone(),
            password: pg.password.clone(),
        }
    }
}

/// main 레플리카 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaParams {
    pub image: String,
    /// 1부터 시작하는 레플리카 번호
    pub index: usize,
    pub database: Option<DatabaseLink>,
    /// 캐시 스토어 네트워크 별칭
    pub cache_alias: Option<String>,
    pub encryption_key: String,
    /// 추가 환경변수 (기본 배선보다 우선)
    pub env: BTreeMap<String, String>,
    pub startup_timeout: Duration,
}

impl Default for ReplicaParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_N8N_IMAGE.to_owned(),
            index: 1,
            database: None,
            cache_alias: None,
            encryption_key: DEFAULT_ENCRYPTION_KEY.to_owned(),
            env: BTreeMap::new(),
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// k번째 레플리카 요청을 만듭니다. `GET /healthz`가 200이면 준비 완료입니다.
pub fn replica_descriptor(
    project: &ProjectName,
    params: &ReplicaParams,
) -> Result<ServiceDescriptor, ProvisionError> {
    if params.index == 0 {
        return Err(ProvisionError::InvalidSpec(
            "replica index is 1-based".to_owned(),
        ));
    }
    if params.encryption_key.is_empty() {
        return Err(ProvisionError::InvalidSpec(
            "replica encryption key must not be empty".to_owned(),
        ));
    }

    let mut env = BTreeMap::from([
        ("N8N_PORT".to_owned(), APP_PORT.to_string()),
        ("N8N_DIAGNOSTICS_ENABLED".to_owned(), "false".to_owned()),
        (
            "N8N_ENCRYPTION_KEY".to_owned(),
            params.encryption_key.clone(),
        ),
    ]);
    if let Some(db) = &params.database {
        env.extend([
            ("DB_TYPE".to_owned(), "postgresdb".to_owned()),
            ("DB_POSTGRESDB_HOST".to_owned(), db.alias.clone()),
            (
                "DB_POSTGRESDB_PORT".to_owned(),
                ServiceKind::Database.default_port().to_string(),
            ),
            ("DB_POSTGRESDB_DATABASE".to_owned(), db.database.clone()),
            ("DB_POSTGRESDB_USER".to_owned(), db.username.clone()),
            ("DB_POSTGRESDB_PASSWORD".to_owned(), db.password.clone()),
        ]);
    }
    if let Some(cache) = &params.cache_alias {
        env.extend([
            ("EXECUTIONS_MODE".to_owned(), "queue".to_owned()),
            ("QUEUE_BULL_REDIS_HOST".to_owned(), cache.clone()),
            (
                "QUEUE_BULL_REDIS_PORT".to_owned(),
                ServiceKind::Cache.default_port().to_string(),
            ),
            ("N8N_MULTI_MAIN_SETUP_ENABLED".to_owned(), "true".to_owned()),
        ]);
    }
    env.extend(params.env.clone());

    let kind = ServiceKind::MainReplica;
    let service = format!("{}-{}", kind.tag(), params.index);
    Ok(ServiceDescriptor {
        env,
        startup_timeout: params.startup_timeout,
        ..ServiceDescriptor::base(
            project,
            kind,
            &service,
            &params.image,
            WaitStrategy::Http {
                port: APP_PORT,
                path: "/healthz".to_owned(),
                status: 200,
            },
        )
    })
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// main 레플리카 하나를 시작합니다.
    pub async fn start_replica(
        &self,
        scope: &ProjectScope,
        params: &ReplicaParams,
    ) -> Result<ServiceHandle, ProvisionError> {
        let descriptor = replica_descriptor(&scope.project, params)?;
        self.provision(scope, descriptor).await
    }
}
