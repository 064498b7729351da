//! 성능 인덱스 프로비저너.
//!
//! 고정된 버전 관리 인덱스 목록을 멱등하게 생성합니다. 인덱스
//! 빌드는 오래 걸릴 수 있으므로 하나의 트랜잭션으로 묶지 않고
//! 각각 독립 실행합니다. 모든 마이그레이션이 커밋된 후에만
//! 실행됩니다.

use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::{EngineError, Result};

/// PostgreSQL SQLSTATE: duplicate_table (인덱스 중복 포함)
const SQLSTATE_DUPLICATE_TABLE: &str = "42P07";

/// 관리 대상 성능 인덱스 (이름, 생성문)
pub const PERFORMANCE_INDEXES: &[(&str, &str)] = &[
    (
        "idx_users_email",
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
    ),
    (
        "idx_users_role",
        "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
    ),
    (
        "idx_sessions_user_id",
        "CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON user_sessions(user_id)",
    ),
    (
        "idx_sessions_token",
        "CREATE INDEX IF NOT EXISTS idx_sessions_token ON user_sessions(session_token)",
    ),
    (
        "idx_api_keys_user_id",
        "CREATE INDEX IF NOT EXISTS idx_api_keys_user_id ON encrypted_api_keys(user_id)",
    ),
    (
        "idx_audit_logs_user_id",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_user_id ON audit_logs(user_id)",
    ),
    (
        "idx_audit_logs_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp)",
    ),
    (
        "idx_security_events_user_id",
        "CREATE INDEX IF NOT EXISTS idx_security_events_user_id ON security_events(user_id)",
    ),
    (
        "idx_security_events_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_security_events_timestamp ON security_events(timestamp)",
    ),
    (
        "idx_login_attempts_email",
        "CREATE INDEX IF NOT EXISTS idx_login_attempts_email ON login_attempts(email)",
    ),
    (
        "idx_login_attempts_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_login_attempts_timestamp ON login_attempts(timestamp)",
    ),
];

/// 프로비저닝 결과
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// 새로 생성된 인덱스 수
    pub created: usize,
    /// 이미 존재해 건너뛴 인덱스 수
    pub already_present: usize,
}

/// 인덱스 프로비저너
#[derive(Clone)]
pub struct IndexProvisioner {
    pool: PgPool,
    dry_run: bool,
}

impl IndexProvisioner {
    pub fn new(pool: PgPool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    /// 전체 인덱스 목록을 멱등하게 생성.
    ///
    /// "already exists"(42P07)는 성공으로 취급하고, 그 외 실패는
    /// [`EngineError::IndexCreation`]으로 전파합니다.
    pub async fn provision(&self) -> Result<IndexReport> {
        let mut report = IndexReport::default();

        for (name, ddl) in PERFORMANCE_INDEXES {
            if self.dry_run {
                info!(index = name, "dry-run: 인덱스 생성 생략");
                continue;
            }

            match sqlx::query(ddl).execute(&self.pool).await {
                Ok(_) => {
                    report.created += 1;
                }
                Err(sqlx::Error::Database(db_err))
                    if db_err.code().as_deref() == Some(SQLSTATE_DUPLICATE_TABLE) =>
                {
                    warn!(index = name, "인덱스 이미 존재, 성공으로 처리");
                    report.already_present += 1;
                }
                Err(e) => {
                    return Err(EngineError::IndexCreation {
                        name: name.to_string(),
                        cause: e.to_string(),
                    });
                }
            }
        }

        info!(
            created = report.created,
            already_present = report.already_present,
            "인덱스 프로비저닝 완료"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_index_list_well_formed() {
        let names: HashSet<_> = PERFORMANCE_INDEXES.iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), PERFORMANCE_INDEXES.len());

        for (name, ddl) in PERFORMANCE_INDEXES {
            // 멱등성: 모든 생성문은 IF NOT EXISTS 사용
            assert!(ddl.starts_with("CREATE INDEX IF NOT EXISTS"), "{}", name);
            assert!(ddl.contains(name), "{} DDL must reference its own name", name);
        }
    }

    #[test]
    fn test_index_list_covers_hot_paths() {
        let names: Vec<_> = PERFORMANCE_INDEXES.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"idx_users_email"));
        assert!(names.contains(&"idx_sessions_token"));
        assert!(names.contains(&"idx_login_attempts_email"));
    }
}
