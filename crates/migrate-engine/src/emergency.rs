//! 비상 롤백 스크립트 생성기.
//!
//! 이 엔진이 생성할 수 있는 모든 테이블을 역의존성 순서로 제거하는
//! 독립 실행형 스크립트를 만듭니다. 오케스트레이터 프로세스가
//! 복구 불가능하게 죽어도 쓸 수 있도록, 어떤 마이그레이션도 실행되기
//! 전에 한 번 생성됩니다. 제거 전에 전체 데이터베이스 export 단계를
//! 포함합니다.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::checkpoint::CHECKPOINT_TABLE;
use crate::error::{EngineError, Result};

/// 관리 대상 테이블, 생성(FK 의존성) 순서.
///
/// 제거는 이 순서의 역순으로 진행됩니다. 체크포인트 테이블은
/// 감사 기록이 마지막까지 남도록 맨 끝에 제거합니다.
pub const MANAGED_TABLES: &[&str] = &[
    "users",
    "sso_configurations",
    "user_sessions",
    "encrypted_api_keys",
    "audit_logs",
    "security_events",
    "user_preferences",
    "login_attempts",
];

/// 비상 롤백 스크립트를 `path`에 생성.
///
/// 생성된 스크립트는 이 엔진 없이 bash + psql/pg_dump만으로
/// 동작합니다.
pub fn generate_script(path: &Path, env_label: &str) -> Result<PathBuf> {
    let script = render_script(env_label);

    fs::write(path, &script)
        .map_err(|e| EngineError::EmergencyScript(format!("{}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .map_err(|e| EngineError::EmergencyScript(format!("{}: {}", path.display(), e)))?;
    }

    info!(path = %path.display(), "비상 롤백 스크립트 생성");
    Ok(path.to_path_buf())
}

/// 스크립트 본문 렌더링
fn render_script(env_label: &str) -> String {
    let mut out = String::new();

    out.push_str("#!/usr/bin/env bash\n");
    out.push_str("# Emergency rollback script — tears down every table the migration\n");
    out.push_str("# engine manages, in reverse dependency order, after a full export.\n");
    out.push_str(&format!("# Environment: {}\n", env_label));
    out.push_str(&format!("# Generated at: {}\n", Utc::now().to_rfc3339()));
    out.push_str("#\n");
    out.push_str("# Usage: DATABASE_URL=postgres://... ./emergency_rollback.sh\n");
    out.push_str("\nset -euo pipefail\n\n");
    out.push_str(": \"${DATABASE_URL:?DATABASE_URL must be set}\"\n\n");

    out.push_str("STAMP=\"$(date +%Y%m%d_%H%M%S)\"\n");
    out.push_str("EXPORT_FILE=\"pre_teardown_${STAMP}.dump\"\n\n");

    out.push_str("echo \"[1/2] Exporting full database to ${EXPORT_FILE}...\"\n");
    out.push_str("pg_dump \"$DATABASE_URL\" --format=custom --file=\"$EXPORT_FILE\"\n\n");

    out.push_str("echo \"[2/2] Dropping managed tables (reverse dependency order)...\"\n");
    for table in teardown_order() {
        out.push_str(&format!(
            "psql \"$DATABASE_URL\" -v ON_ERROR_STOP=1 -c \"DROP TABLE IF EXISTS {} CASCADE;\"\n",
            table
        ));
    }

    out.push_str("\necho \"Teardown complete. Export preserved at ${EXPORT_FILE}.\"\n");
    out
}

/// 제거 순서: 관리 테이블 역순 + 체크포인트 테이블 마지막
fn teardown_order() -> Vec<&'static str> {
    let mut order: Vec<&'static str> = MANAGED_TABLES.iter().rev().copied().collect();
    order.push(CHECKPOINT_TABLE);
    order
}
