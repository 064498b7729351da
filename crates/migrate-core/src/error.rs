//! 카탈로그 파싱 에러 타입.

use thiserror::Error;

/// 카탈로그 로딩/파싱 에러
#[derive(Debug, Error)]
pub enum CoreError {
    /// 마이그레이션 디렉토리를 읽을 수 없음
    #[error("catalog read error: {0}")]
    CatalogRead(String),

    /// 마이그레이션 파일 형식 오류 (forward 섹션 누락, id 중복 등)
    #[error("malformed migration {file}: {reason}")]
    MalformedMigration { file: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
