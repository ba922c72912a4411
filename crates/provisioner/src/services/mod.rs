//! 서비스별 프로비저닝 규칙
//!
//! 각 규칙은 `(서비스 파라미터, 프로젝트 범위) → 핸들` 형태이며
//! 순수 함수 `*_descriptor`와 `Provisioner::start_*` 메서드 한 쌍으로 구성됩니다.
//!
//! | 서비스 | 준비 조건 | 포트 |
//! |---|---|---|
//! | [`cache`] | `redis-cli ping` → `PONG` | 6379 |
//! | [`database`] | `pg_isready` exit 0 | 5432 |
//! | [`replica`] | `GET /healthz` → 200 | 5678 |
//! | [`load_balancer`] | TCP listen | 80 |
//! | [`browser`] | `GET /sse` → 200 | 8931 |
//! | [`inference`] | `GET /api/tags` → 200, 이후 모델 pull | 11434 |

pub mod browser;
pub mod cache;
pub mod database;
pub mod inference;
pub mod load_balancer;
pub mod replica;

pub use browser::{BrowserParams, browser_descriptor};
pub use cache::{CacheParams, cache_descriptor};
pub use database::{DatabaseParams, PostgresHandle, database_descriptor};
pub use inference::{InferenceHandle, InferenceParams, inference_descriptor};
pub use load_balancer::{LoadBalancerParams, load_balancer_descriptor};
pub use replica::{DatabaseLink, ReplicaParams, replica_descriptor};
