//! 환경변수 기반 설정 모듈.

use std::path::PathBuf;

use crate::error::{EngineError, Result};

/// 마이그레이션 엔진 전체 설정
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// 선택된 환경 프로파일 이름 (`--env`)
    pub env_name: Option<String>,
    /// 데이터베이스 URL
    pub database_url: String,
    /// 마이그레이션 정의 파일 디렉토리
    pub migrations_dir: PathBuf,
    /// 문장당 타임아웃 (밀리초)
    pub statement_timeout_ms: u64,
    /// 허용 가능한 무결성 위반 수 (초과 시 중단, 기본 0)
    pub validation_tolerance: u64,
    /// 커넥션 풀 크기
    pub pool_size: u32,
    /// 비상 롤백 스크립트 출력 경로
    pub emergency_script_path: PathBuf,
    /// 부트스트랩 관리자 계정 초기 비밀번호
    pub admin_initial_password: String,
    /// 시뮬레이션 모드: 영속 쓰기/문장 실행 없이 로깅만 수행
    pub dry_run: bool,
    /// 무결성 검증 실패를 지나쳐 계속 진행
    pub force: bool,
    /// 무결성 검증 전체 비활성화 (자동 체크포인트 롤백도 함께 꺼짐)
    pub skip_validation: bool,
}

impl MigrateConfig {
    /// 환경변수에서 설정 로드.
    ///
    /// `env_name`이 주어지면 `<NAME>_DATABASE_URL`을 먼저 찾고,
    /// 없으면 `DATABASE_URL`로 폴백합니다.
    pub fn from_env(env_name: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = profile_database_url(env_name, |key| std::env::var(key).ok())
            .ok_or_else(|| {
                EngineError::Config(match env_name {
                    Some(name) => format!(
                        "neither {}_DATABASE_URL nor DATABASE_URL is set",
                        name.to_uppercase()
                    ),
                    None => "DATABASE_URL is not set".to_string(),
                })
            })?;

        Ok(Self {
            env_name: env_name.map(|s| s.to_string()),
            database_url,
            migrations_dir: PathBuf::from(
                std::env::var("MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string()),
            ),
            statement_timeout_ms: env_var_parse("MIGRATE_STATEMENT_TIMEOUT_MS", 30_000),
            validation_tolerance: env_var_parse("MIGRATE_VALIDATION_TOLERANCE", 0),
            pool_size: env_var_parse("MIGRATE_POOL_SIZE", 5),
            emergency_script_path: PathBuf::from(
                std::env::var("MIGRATE_EMERGENCY_SCRIPT_PATH")
                    .unwrap_or_else(|_| "emergency_rollback.sh".to_string()),
            ),
            admin_initial_password: std::env::var("MIGRATE_ADMIN_INITIAL_PASSWORD")
                .unwrap_or_else(|_| "admin123".to_string()),
            dry_run: false,
            force: false,
            skip_validation: false,
        })
    }

    /// 프로파일 라벨 (로그/스크립트 헤더용)
    pub fn env_label(&self) -> &str {
        self.env_name.as_deref().unwrap_or("default")
    }
}

/// 프로파일 우선 데이터베이스 URL 조회.
///
/// 조회 함수를 주입받아 환경변수 없이도 테스트 가능.
fn profile_database_url(
    env_name: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if let Some(name) = env_name {
        let key = format!("{}_DATABASE_URL", name.to_uppercase());
        if let Some(url) = lookup(&key) {
            return Some(url);
        }
    }
    lookup("DATABASE_URL")
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup_prefers_named_env() {
        let url = profile_database_url(Some("staging"), |key| match key {
            "STAGING_DATABASE_URL" => Some("postgres://staging".to_string()),
            "DATABASE_URL" => Some("postgres://default".to_string()),
            _ => None,
        });
        assert_eq!(url.as_deref(), Some("postgres://staging"));
    }

    #[test]
    fn test_profile_lookup_falls_back_to_default() {
        let url = profile_database_url(Some("qa"), |key| match key {
            "DATABASE_URL" => Some("postgres://default".to_string()),
            _ => None,
        });
        assert_eq!(url.as_deref(), Some("postgres://default"));
    }

    #[test]
    fn test_profile_lookup_none_when_unset() {
        let url = profile_database_url(Some("qa"), |_| None);
        assert_eq!(url, None);
    }

    #[test]
    fn test_profile_name_uppercased() {
        let url = profile_database_url(Some("Prod"), |key| {
            (key == "PROD_DATABASE_URL").then(|| "postgres://prod".to_string())
        });
        assert_eq!(url.as_deref(), Some("postgres://prod"));
    }
}
