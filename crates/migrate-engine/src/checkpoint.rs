//! 체크포인트 매니저.
//!
//! 데이터베이스 상태 스냅샷과 reverse 스크립트를 캡처해
//! `migration_checkpoints` 테이블에 영속화하고, 체크포인트 기준
//! 롤백을 수행합니다. 체크포인트는 프로세스 재시작 후에도 남으며
//! 자동 삭제되지 않습니다.

use chrono::{DateTime, Utc};
use migrate_core::{
    statement, Checkpoint, CheckpointType, DatabaseSnapshot, MigrationDefinition,
    MigrationRunState, TableCounters,
};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// 체크포인트 영속 테이블 이름
pub const CHECKPOINT_TABLE: &str = "migration_checkpoints";

/// 체크포인트 영속 테이블 DDL
const CHECKPOINT_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS migration_checkpoints (
    id UUID PRIMARY KEY,
    migration_id INTEGER NOT NULL,
    migration_name VARCHAR(255) NOT NULL,
    checkpoint_type VARCHAR(20) NOT NULL,
    database_state JSONB NOT NULL,
    reverse_script TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// 체크포인트 기준 자동 롤백 시도 결과.
///
/// best-effort 경로를 조용한 로그 한 줄로 삼키지 않고, 호출자와
/// 테스트가 단언할 수 있는 명시적 결과로 노출합니다. 자동 롤백
/// 자체의 실패는 원래의 실행 에러를 가리지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// reverse 스크립트 재생 성공
    Succeeded,
    /// 시도했으나 실패 (원인 보존)
    AttemptedButFailed { cause: String },
    /// 자동 롤백 비활성화 상태라 시도하지 않음
    Skipped,
}

/// 체크포인트 목록 조회용 레코드
#[derive(Debug, Clone, FromRow)]
pub struct CheckpointRecord {
    pub id: Uuid,
    pub migration_id: i32,
    pub migration_name: String,
    pub checkpoint_type: String,
    pub created_at: DateTime<Utc>,
}

/// 체크포인트 매니저
#[derive(Clone)]
pub struct CheckpointManager {
    pool: PgPool,
    dry_run: bool,
}

impl CheckpointManager {
    pub fn new(pool: PgPool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    /// 영속 테이블 준비 (시뮬레이션 모드에서는 생략)
    pub async fn ensure_checkpoint_table(&self) -> Result<()> {
        if self.dry_run {
            debug!("dry-run: 체크포인트 테이블 생성 생략");
            return Ok(());
        }
        sqlx::query(CHECKPOINT_TABLE_DDL).execute(&self.pool).await?;
        Ok(())
    }

    /// 테이블별 행 변경 카운터 스냅샷 캡처.
    ///
    /// `pg_stat_user_tables` 단일 읽기 쿼리만 수행하며, 쿼리 자체의
    /// 트랜잭션 외에는 락을 잡지 않습니다 (동시 읽기 차단 없음).
    #[instrument(skip(self))]
    pub async fn capture_state(&self) -> Result<DatabaseSnapshot> {
        let rows: Vec<(String, Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT relname::text, n_tup_ins::bigint, n_tup_del::bigint
            FROM pg_stat_user_tables
            ORDER BY relname
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = DatabaseSnapshot::new();
        for (table, inserts, deletes) in rows {
            snapshot.tables.insert(
                table,
                TableCounters {
                    inserts: inserts.unwrap_or(0),
                    deletes: deletes.unwrap_or(0),
                },
            );
        }

        debug!(tables = snapshot.table_count(), "상태 스냅샷 캡처");
        Ok(snapshot)
    }

    /// 체크포인트 생성 및 동기 영속화.
    ///
    /// 마이그레이션 트랜잭션이 열리기 *전에* 영속화가 완료되어야
    /// 합니다 — 영속된 pre-checkpoint 없이 실행된 마이그레이션은
    /// 롤백이 동작할 대상이 없습니다. 영속화 실패는
    /// [`EngineError::CheckpointPersist`]로 해당 마이그레이션 시도를
    /// 중단시킵니다.
    pub async fn create_checkpoint(
        &self,
        migration: &MigrationDefinition,
        checkpoint_type: CheckpointType,
        run_state: &mut MigrationRunState,
    ) -> Result<Checkpoint> {
        let snapshot = self.capture_state().await?;

        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            migration_id: migration.id,
            migration_name: migration.name.clone(),
            checkpoint_type,
            created_at: Utc::now(),
            snapshot,
            reverse_script: migration.reverse_statements.clone(),
        };

        if self.dry_run {
            debug!(
                checkpoint_id = %checkpoint.id,
                migration = %migration.label(),
                checkpoint_type = %checkpoint_type,
                "dry-run: 체크포인트 영속화 생략"
            );
        } else {
            self.persist(&checkpoint)
                .await
                .map_err(|e| EngineError::CheckpointPersist(e.to_string()))?;
        }

        info!(
            checkpoint_id = %checkpoint.id,
            migration = %migration.label(),
            checkpoint_type = %checkpoint_type,
            reversible = checkpoint.is_reversible(),
            "체크포인트 생성"
        );

        run_state.checkpoints.push(checkpoint.clone());
        Ok(checkpoint)
    }

    /// 체크포인트 레코드 INSERT
    async fn persist(&self, checkpoint: &Checkpoint) -> Result<()> {
        let state_json = serde_json::to_value(&checkpoint.snapshot)
            .map_err(|e| EngineError::CheckpointPersist(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO migration_checkpoints
                (id, migration_id, migration_name, checkpoint_type, database_state, reverse_script, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(checkpoint.id)
        .bind(checkpoint.migration_id as i32)
        .bind(&checkpoint.migration_name)
        .bind(checkpoint.checkpoint_type.as_str())
        .bind(state_json)
        .bind(checkpoint.reverse_script.join(";\n"))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 체크포인트의 reverse 스크립트를 새 트랜잭션에서 재생.
    ///
    /// reverse 스크립트가 비어 있으면 [`EngineError::NoReverseScript`] —
    /// 되돌릴 수 없는 체크포인트는 조용히 넘어가지 않고 보고합니다.
    #[instrument(skip(self, checkpoint), fields(checkpoint_id = %checkpoint.id))]
    pub async fn rollback_to_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        if !checkpoint.is_reversible() {
            return Err(EngineError::NoReverseScript {
                checkpoint_id: checkpoint.id,
            });
        }

        if self.dry_run {
            for stmt in &checkpoint.reverse_script {
                info!(statement = %stmt, "dry-run: reverse 문장 실행 생략");
            }
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (idx, stmt) in checkpoint.reverse_script.iter().enumerate() {
            if let Err(e) = sqlx::query(stmt).execute(&mut *tx).await {
                warn!(
                    checkpoint_id = %checkpoint.id,
                    statement_index = idx,
                    error = %e,
                    "reverse 문장 실패, 롤백 트랜잭션 중단"
                );
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "롤백 트랜잭션 정리 실패");
                }
                return Err(EngineError::Database(e));
            }
        }
        tx.commit().await?;

        info!(
            checkpoint_id = %checkpoint.id,
            migration_id = checkpoint.migration_id,
            statements = checkpoint.reverse_script.len(),
            "체크포인트 롤백 완료"
        );
        Ok(())
    }

    /// best-effort 자동 롤백. 실패해도 에러를 전파하지 않고
    /// [`RollbackOutcome`]으로 결과를 보고합니다.
    pub async fn attempt_rollback(&self, checkpoint: &Checkpoint) -> RollbackOutcome {
        match self.rollback_to_checkpoint(checkpoint).await {
            Ok(()) => RollbackOutcome::Succeeded,
            Err(e) => {
                warn!(
                    checkpoint_id = %checkpoint.id,
                    error = %e,
                    "체크포인트 자동 롤백 실패"
                );
                RollbackOutcome::AttemptedButFailed {
                    cause: e.to_string(),
                }
            }
        }
    }

    /// 영속 체크포인트 목록 (최신순)
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointRecord>> {
        let records = sqlx::query_as(
            r#"
            SELECT id, migration_id, migration_name, checkpoint_type, created_at
            FROM migration_checkpoints
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// id로 영속 체크포인트 로드 (CLI 롤백 경로)
    pub async fn load_checkpoint(&self, id: Uuid) -> Result<Option<Checkpoint>> {
        let row: Option<(Uuid, i32, String, String, serde_json::Value, String, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, migration_id, migration_name, checkpoint_type,
                       database_state, reverse_script, created_at
                FROM migration_checkpoints
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((id, migration_id, migration_name, type_str, state_json, script, created_at)) =
            row
        else {
            return Ok(None);
        };

        let checkpoint_type = CheckpointType::parse(&type_str).ok_or_else(|| {
            EngineError::CheckpointPersist(format!(
                "checkpoint {} has unknown type '{}'",
                id, type_str
            ))
        })?;

        let snapshot: DatabaseSnapshot = serde_json::from_value(state_json)
            .map_err(|e| EngineError::CheckpointPersist(e.to_string()))?;

        Ok(Some(Checkpoint {
            id,
            migration_id: migration_id as u32,
            migration_name,
            checkpoint_type,
            created_at,
            snapshot,
            reverse_script: statement::split_statements(&script),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint_with_script(script: Vec<&str>) -> Checkpoint {
        Checkpoint {
            id: Uuid::new_v4(),
            migration_id: 1,
            migration_name: "create_users".to_string(),
            checkpoint_type: CheckpointType::PreMigration,
            created_at: Utc::now(),
            snapshot: DatabaseSnapshot::new(),
            reverse_script: script.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_reverse_script_storage_roundtrip() {
        // persist는 ";\n"으로 합치고, load는 렉서로 다시 분리
        let cp = checkpoint_with_script(vec!["DROP INDEX idx_a", "DROP TABLE a"]);
        let stored = cp.reverse_script.join(";\n");
        let restored = statement::split_statements(&stored);
        assert_eq!(restored, cp.reverse_script);
    }

    #[test]
    fn test_non_reversible_checkpoint() {
        let cp = checkpoint_with_script(vec![]);
        assert!(!cp.is_reversible());
    }

    #[test]
    fn test_rollback_outcome_failure_keeps_cause() {
        let outcome = RollbackOutcome::AttemptedButFailed {
            cause: "relation does not exist".to_string(),
        };
        assert_ne!(outcome, RollbackOutcome::Succeeded);
        if let RollbackOutcome::AttemptedButFailed { cause } = outcome {
            assert!(cause.contains("does not exist"));
        }
    }
}
