//! 관계형 데이터베이스 (postgres)
//!
//! 핸들은 [`PostgresHandle`]로 감싸져 자격 증명과 접속 URL을 함께 제공합니다.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use testbed_core::config::{
    DEFAULT_POSTGRES_DATABASE, DEFAULT_POSTGRES_IMAGE, DEFAULT_POSTGRES_PASSWORD,
    DEFAULT_POSTGRES_USER,
};
use testbed_core::types::{ProjectName, ServiceDescriptor, ServiceHandle, ServiceKind, WaitStrategy};

use crate::docker::ContainerRuntime;
use crate::error::ProvisionError;
use crate::provisioner::{ProjectScope, Provisioner};

/// 데이터베이스 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseParams {
    pub image: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub startup_timeout: Duration,
}

impl Default for DatabaseParams {
    fn default() -> Self {
        Self {
            image: DEFAULT_POSTGRES_IMAGE.to_owned(),
            database: DEFAULT_POSTGRES_DATABASE.to_owned(),
            username: DEFAULT_POSTGRES_USER.to_owned(),
            password: DEFAULT_POSTGRES_PASSWORD.to_owned(),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

/// 자격 증명이 포함된 데이터베이스 핸들
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresHandle {
    pub handle: ServiceHandle,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl PostgresHandle {
    /// 호스트에서 접속하는 URL
    pub fn connection_url(&self) -> Option<String> {
        let port = self.handle.host_port(ServiceKind::Database.default_port())?;
        Some(format!(
            "postgres://{}:{}@{}:{port}/{}",
            self.username, self.password, self.handle.host, self.database
        ))
    }

    /// 같은 네트워크의 피어가 쓰는 URL
    pub fn internal_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}/{}",
            self.username,
            self.password,
            self.handle
                .internal_address(ServiceKind::Database.default_port()),
            self.database
        )
    }
}

/// 데이터베이스 요청을 만듭니다.
///
/// 초기화 중 임시 서버는 유닉스 소켓만 열기 때문에 `pg_isready`는
/// TCP(`-h 127.0.0.1`)로 검사해 최종 서버가 뜬 뒤에만 성공합니다.
pub fn database_descriptor(
    project: &ProjectName,
    params: &DatabaseParams,
) -> Result<ServiceDescriptor, ProvisionError> {
    for (field, value) in [
        ("database", &params.database),
        ("username", &params.username),
        ("password", &params.password),
    ] {
        if value.is_empty() {
            return Err(ProvisionError::InvalidSpec(format!(
                "postgres {field} must not be empty"
            )));
        }
    }

    let kind = ServiceKind::Database;
    Ok(ServiceDescriptor {
        env: BTreeMap::from([
            ("POSTGRES_DB".to_owned(), params.database.clone()),
            ("POSTGRES_USER".to_owned(), params.username.clone()),
            ("POSTGRES_PASSWORD".to_owned(), params.password.clone()),
        ]),
        startup_timeout: params.startup_timeout,
        ..ServiceDescriptor::base(
            project,
            kind,
            kind.tag(),
            &params.image,
            WaitStrategy::Exec {
                command: vec![
                    "pg_isready".to_owned(),
                    "-U".to_owned(),
                    params.username.clone(),
                    "-d".to_owned(),
                    params.database.clone(),
                    "-h".to_owned(),
                    "127.0.0.1".to_owned(),
                ],
                expect_stdout: None,
            },
        )
    })
}

impl<R: ContainerRuntime> Provisioner<R> {
    /// 데이터베이스를 시작하고 자격 증명이 포함된 핸들을 반환합니다.
    pub async fn start_database(
        &self,
        scope: &ProjectScope,
        params: &DatabaseParams,
    ) -> Result<PostgresHandle, ProvisionError> {
        let descriptor = database_descriptor(&scope.project, params)?;
        let handle = self.provision(scope, descriptor).await?;
        Ok(PostgresHandle {
            handle,
            database: params.database.clone(),
            username: params.username.clone(),
            password: params.password.clone(),
        })
    }
}
