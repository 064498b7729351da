//! 마이그레이션 실행 advisory 락.
//!
//! 두 운영자가 동시에 같은 대상에 마이그레이션을 실행하는 경합을
//! 막기 위해, 실행 전체 기간 동안 세션 수준 advisory 락을
//! 보유합니다. 락은 전용 커넥션에 묶이며, 이 커넥션이 닫히면
//! (프로세스 종료 포함) 서버가 락을 해제합니다.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// 고정 락 키. 이 엔진의 모든 실행 인스턴스가 공유.
pub const MIGRATION_LOCK_KEY: i64 = 0x4d47_5254_4c4b; // "MGRTLK"

/// 실행 기간 동안 보유하는 advisory 락.
///
/// 락을 쥔 커넥션을 풀에 반납하지 않고 소유합니다 — 세션 락이므로
/// 커넥션이 풀로 돌아가면 락이 다른 작업에 누수됩니다.
/// [`MigrationLock::release`]로 명시적으로 해제하세요.
pub struct MigrationLock {
    conn: PoolConnection<Postgres>,
}

impl MigrationLock {
    /// 락 획득 시도. 다른 프로세스가 보유 중이면 즉시
    /// [`EngineError::LockUnavailable`]로 실패합니다 (대기 없음).
    pub async fn acquire(pool: &PgPool) -> Result<Self> {
        let mut conn = pool.acquire().await?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await?;

        if !locked {
            return Err(EngineError::LockUnavailable);
        }

        info!(key = MIGRATION_LOCK_KEY, "마이그레이션 락 획득");
        Ok(Self { conn })
    }

    /// 락 해제 후 커넥션 반납
    pub async fn release(mut self) -> Result<()> {
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .fetch_one(&mut *self.conn)
            .await?;

        debug!(released = released, "마이그레이션 락 해제");
        Ok(())
    }
}
