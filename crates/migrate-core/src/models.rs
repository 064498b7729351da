//! 마이그레이션 엔진의 핵심 데이터 모델.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 파싱된 마이그레이션 정의.
///
/// 파일 하나당 하나 생성되며, 로드 이후에는 불변입니다.
/// 다른 컴포넌트는 `id`로만 참조합니다.
#[derive(Debug, Clone)]
pub struct MigrationDefinition {
    /// 파일명의 3자리 숫자 접두사 (예: 003_add_sessions.sql → 3)
    pub id: u32,
    /// 파일명에서 추출한 이름 (접두사/확장자 제외)
    pub name: String,
    /// forward 섹션의 개별 SQL 문장 (파일 순서대로)
    pub forward_statements: Vec<String>,
    /// reverse 섹션의 개별 SQL 문장 (없으면 빈 목록)
    pub reverse_statements: Vec<String>,
    /// forward 문장의 FK REFERENCES 절에서 추출한 테이블 이름
    ///
    /// 진단용 메타데이터. 실행 순서는 항상 카탈로그(숫자) 순서이며
    /// 이 필드는 순서 결정에 사용되지 않습니다.
    pub dependencies: BTreeSet<String>,
    /// 원본 파일 바이트 전체의 SHA-256 (드리프트 검출용)
    pub content_checksum: String,
}

impl MigrationDefinition {
    /// `003_add_sessions` 형태의 표시용 라벨
    pub fn label(&self) -> String {
        format!("{:03}_{}", self.id, self.name)
    }

    /// reverse 섹션 보유 여부
    pub fn is_reversible(&self) -> bool {
        !self.reverse_statements.is_empty()
    }
}

/// 체크포인트 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointType {
    /// 마이그레이션 트랜잭션 시작 전
    PreMigration,
    /// 마이그레이션 커밋 성공 후
    PostMigration,
}

impl CheckpointType {
    /// DB 저장용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointType::PreMigration => "pre_migration",
            CheckpointType::PostMigration => "post_migration",
        }
    }

    /// DB 저장 문자열에서 복원
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre_migration" => Some(CheckpointType::PreMigration),
            "post_migration" => Some(CheckpointType::PostMigration),
            _ => None,
        }
    }
}

impl std::fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 테이블별 행 변경 카운터 (`pg_stat_user_tables` 기준)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounters {
    /// 누적 INSERT 행 수 (n_tup_ins)
    pub inserts: i64,
    /// 누적 DELETE 행 수 (n_tup_del)
    pub deletes: i64,
}

/// 캡처 시점의 데이터베이스 상태 스냅샷.
///
/// 테이블 이름 → 변경 카운터. jsonb로 직렬화되어 체크포인트와 함께
/// 영속화됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub tables: BTreeMap<String, TableCounters>,
}

impl DatabaseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 스냅샷에 포함된 테이블 수
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// 특정 시점에 대한 커밋 지점.
///
/// 마이그레이션이 *시도*되면 트랜잭션 시작 전에 pre-migration
/// 체크포인트가 정확히 하나 생성되고, 커밋에 성공한 경우에만
/// post-migration 체크포인트가 존재합니다. 자동 삭제되지 않습니다
/// (감사 및 사후 롤백용으로 보존).
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: Uuid,
    /// 연관 마이그레이션 (약한 참조: id + 이름만 보관)
    pub migration_id: u32,
    pub migration_name: String,
    pub checkpoint_type: CheckpointType,
    pub created_at: DateTime<Utc>,
    /// 캡처 시점의 테이블별 변경 카운터
    pub snapshot: DatabaseSnapshot,
    /// 소유 마이그레이션의 reverse 문장 사본
    pub reverse_script: Vec<String>,
}

impl Checkpoint {
    /// reverse 스크립트가 비어 있으면 이 체크포인트는 설계상
    /// 되돌릴 수 없으며, 운영자 개입이 필요합니다.
    pub fn is_reversible(&self) -> bool {
        !self.reverse_script.is_empty()
    }
}

/// 오케스트레이션 1회 실행의 프로세스 상태.
///
/// 오케스트레이터가 단독 소유하며, 추가가 필요한 컴포넌트
/// (체크포인트 매니저, 에러 기록)에만 `&mut`로 전달됩니다.
/// 실행 종료 시 폐기되지만 체크포인트의 영속 레코드는 남습니다.
#[derive(Debug, Clone)]
pub struct MigrationRunState {
    /// 현재 실행 중인 마이그레이션 id
    pub current_migration_id: Option<u32>,
    /// 커밋 완료된 마이그레이션 id (append-only, 적용 순서)
    pub completed: Vec<u32>,
    /// 이번 실행에서 생성된 체크포인트 (생성 순서)
    pub checkpoints: Vec<Checkpoint>,
    /// 기록된 에러
    pub errors: Vec<String>,
    /// 기록된 경고
    pub warnings: Vec<String>,
    /// 실행 시작 시각
    pub started_at: DateTime<Utc>,
}

impl MigrationRunState {
    pub fn new() -> Self {
        Self {
            current_migration_id: None,
            completed: Vec::new(),
            checkpoints: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// 에러 기록 (로그 후 호출)
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// 경고 기록
    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

impl Default for MigrationRunState {
    fn default() -> Self {
        Self::new()
    }
}

/// 무결성 검사 심각도
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// 정보 (권장사항)
    Info,
    /// 경고 (수정 권장)
    Warning,
    /// 에러 (수정 필수)
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_label() {
        let m = MigrationDefinition {
            id: 3,
            name: "add_sessions".to_string(),
            forward_statements: vec!["CREATE TABLE t (id INT)".to_string()],
            reverse_statements: vec![],
            dependencies: BTreeSet::new(),
            content_checksum: String::new(),
        };
        assert_eq!(m.label(), "003_add_sessions");
        assert!(!m.is_reversible());
    }

    #[test]
    fn test_checkpoint_type_roundtrip() {
        for ty in [CheckpointType::PreMigration, CheckpointType::PostMigration] {
            assert_eq!(CheckpointType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(CheckpointType::parse("unknown"), None);
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let mut snapshot = DatabaseSnapshot::new();
        snapshot.tables.insert(
            "users".to_string(),
            TableCounters {
                inserts: 10,
                deletes: 2,
            },
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        let restored: DatabaseSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.table_count(), 1);
    }

    #[test]
    fn test_run_state_records() {
        let mut state = MigrationRunState::new();
        state.record_error("boom");
        state.record_warning("hmm");
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.warnings.len(), 1);
        assert!(state.completed.is_empty());
    }
}
