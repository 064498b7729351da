//! 엔진 에러 타입.

use thiserror::Error;
use uuid::Uuid;

/// 마이그레이션 엔진 에러
#[derive(Debug, Error)]
pub enum EngineError {
    /// 카탈로그 로딩/파싱 에러 (실행 전 중단)
    #[error(transparent)]
    Core(#[from] migrate_core::CoreError),

    /// 설정 에러
    #[error("configuration error: {0}")]
    Config(String),

    /// 체크포인트 영속화 실패.
    ///
    /// 진행 중인 마이그레이션에 치명적 — 영속된 pre-checkpoint 없이는
    /// 롤백이 동작할 대상이 없으므로 해당 마이그레이션을 중단해야 함.
    #[error("checkpoint persist error: {0}")]
    CheckpointPersist(String),

    /// 마이그레이션 문장 실행 실패 (로컬 롤백 후 재전파)
    #[error("migration {migration_id} failed at statement {statement_index}: {cause}")]
    MigrationExecution {
        migration_id: u32,
        statement_index: usize,
        cause: String,
    },

    /// reverse 스크립트가 빈 체크포인트로 롤백 시도.
    ///
    /// 설계상 되돌릴 수 없는 체크포인트이므로 조용히 무시하지 않고
    /// 보고합니다. 운영자 개입 필요.
    #[error("checkpoint {checkpoint_id} has no reverse script; manual intervention required")]
    NoReverseScript { checkpoint_id: Uuid },

    /// 인덱스 생성 실패 ("already exists"는 여기로 오지 않음)
    #[error("index creation failed: {name}: {cause}")]
    IndexCreation { name: String, cause: String },

    /// 시드 데이터 그룹 실패
    #[error("seed group '{group}' failed: {cause}")]
    Seed { group: String, cause: String },

    /// 비상 롤백 스크립트 생성 실패
    #[error("emergency script error: {0}")]
    EmergencyScript(String),

    /// 다른 프로세스가 마이그레이션 락을 보유 중
    #[error("migration advisory lock is held by another process")]
    LockUnavailable,

    /// 데이터베이스 에러
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
