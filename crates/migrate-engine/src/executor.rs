//! 트랜잭션 실행기.
//!
//! 한 마이그레이션의 forward 문장 전체를 단일 all-or-nothing
//! 트랜잭션으로 적용합니다. 부분 커밋은 절대 관측되지 않습니다 —
//! 트랜잭션 경계가 이 엔진이 제공하는 유일한 일관성 보장입니다.

use std::time::{Duration, Instant};

use migrate_core::{Checkpoint, MigrationDefinition};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointManager, RollbackOutcome};
use crate::error::{EngineError, Result};

/// 문장별 실행 시간 기록 (진단용)
#[derive(Debug, Clone)]
pub struct StatementTiming {
    /// 파일 내 문장 순번 (0-based)
    pub index: usize,
    /// 실행 소요 시간
    pub elapsed: Duration,
    /// 문장 앞부분 미리보기
    pub preview: String,
}

/// 마이그레이션 1건 적용 결과
#[derive(Debug, Clone)]
pub struct MigrationApplyReport {
    pub migration_id: u32,
    pub statement_count: usize,
    pub timings: Vec<StatementTiming>,
    pub total_elapsed: Duration,
}

/// 적용 실패 + 자동 롤백 시도 결과.
///
/// 자동 롤백의 실패가 원래 에러를 가리지 않도록 둘을 함께 전달합니다.
#[derive(Debug)]
pub struct MigrationFailure {
    /// 원래의 실행 에러 (`MigrationExecution`)
    pub error: EngineError,
    /// pre-checkpoint 자동 롤백 결과
    pub rollback: RollbackOutcome,
}

/// 트랜잭션 실행기
#[derive(Clone)]
pub struct TransactionalExecutor {
    pool: PgPool,
    statement_timeout_ms: u64,
    dry_run: bool,
}

impl TransactionalExecutor {
    pub fn new(pool: PgPool, statement_timeout_ms: u64, dry_run: bool) -> Self {
        Self {
            pool,
            statement_timeout_ms,
            dry_run,
        }
    }

    /// forward 문장 전체를 단일 트랜잭션으로 실행.
    ///
    /// 1. 문장 타임아웃이 설정된 트랜잭션 오픈
    /// 2. 파일 순서대로 각 문장 실행, 문장별 소요 시간 기록
    /// 3. 전부 성공하면 커밋
    /// 4. 하나라도 실패하면 즉시 트랜잭션 롤백 (부분 DDL 노출 금지)
    ///    후 [`EngineError::MigrationExecution`] 반환
    pub async fn execute_forward(
        &self,
        migration: &MigrationDefinition,
    ) -> Result<MigrationApplyReport> {
        let started = Instant::now();

        if self.dry_run {
            for (idx, stmt) in migration.forward_statements.iter().enumerate() {
                info!(
                    migration = %migration.label(),
                    statement_index = idx,
                    statement = %preview(stmt),
                    "dry-run: forward 문장 실행 생략"
                );
            }
            return Ok(MigrationApplyReport {
                migration_id: migration.id,
                statement_count: migration.forward_statements.len(),
                timings: Vec::new(),
                total_elapsed: started.elapsed(),
            });
        }

        let mut tx = self.pool.begin().await?;

        // SET은 파라미터 바인딩이 불가 — 검증된 정수만 포맷
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        let mut timings = Vec::with_capacity(migration.forward_statements.len());

        for (idx, stmt) in migration.forward_statements.iter().enumerate() {
            let stmt_started = Instant::now();

            if let Err(e) = sqlx::query(stmt).execute(&mut *tx).await {
                error!(
                    migration = %migration.label(),
                    statement_index = idx,
                    statement = %preview(stmt),
                    error = %e,
                    "forward 문장 실패, 트랜잭션 롤백"
                );
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "트랜잭션 롤백 중 추가 에러");
                }
                return Err(EngineError::MigrationExecution {
                    migration_id: migration.id,
                    statement_index: idx,
                    cause: e.to_string(),
                });
            }

            let elapsed = stmt_started.elapsed();
            debug!(
                migration = %migration.label(),
                statement_index = idx,
                elapsed_ms = elapsed.as_millis() as u64,
                "forward 문장 실행"
            );
            timings.push(StatementTiming {
                index: idx,
                elapsed,
                preview: preview(stmt),
            });
        }

        tx.commit().await.map_err(|e| EngineError::MigrationExecution {
            migration_id: migration.id,
            statement_index: migration.forward_statements.len(),
            cause: format!("commit failed: {}", e),
        })?;

        let total_elapsed = started.elapsed();
        info!(
            migration = %migration.label(),
            statements = migration.forward_statements.len(),
            elapsed_ms = total_elapsed.as_millis() as u64,
            "마이그레이션 커밋 완료"
        );

        Ok(MigrationApplyReport {
            migration_id: migration.id,
            statement_count: migration.forward_statements.len(),
            timings,
            total_elapsed,
        })
    }

    /// 적용 + 실패 시 best-effort pre-checkpoint 자동 롤백.
    ///
    /// 트랜잭션 롤백(부분 효과 제거)은 [`Self::execute_forward`]가
    /// 이미 보장하고, 여기서는 추가로 pre-checkpoint의 reverse
    /// 스크립트 재생을 시도합니다. `skip_auto_rollback`이면 시도
    /// 자체를 생략합니다 (무결성 검증 비활성화와 연동).
    pub async fn apply(
        &self,
        migration: &MigrationDefinition,
        pre_checkpoint: &Checkpoint,
        checkpoints: &CheckpointManager,
        skip_auto_rollback: bool,
    ) -> std::result::Result<MigrationApplyReport, MigrationFailure> {
        match self.execute_forward(migration).await {
            Ok(report) => Ok(report),
            Err(error) => {
                let rollback = if skip_auto_rollback {
                    RollbackOutcome::Skipped
                } else {
                    checkpoints.attempt_rollback(pre_checkpoint).await
                };
                Err(MigrationFailure { error, rollback })
            }
        }
    }
}

/// 로그용 한 줄 미리보기 (최대 80자)
fn preview(stmt: &str) -> String {
    let flat: String = stmt.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 80 {
        let cut: String = flat.chars().take(77).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_flattens_whitespace() {
        let p = preview("CREATE TABLE users (\n    id UUID\n)");
        assert_eq!(p, "CREATE TABLE users ( id UUID )");
    }

    #[test]
    fn test_preview_truncates_long_statements() {
        let long = "SELECT ".to_string() + &"x, ".repeat(100);
        let p = preview(&long);
        assert!(p.chars().count() <= 80);
        assert!(p.ends_with("..."));
    }
}
