//! 마이그레이션 카탈로그 로더.
//!
//! `NNN_name.sql` 파일 디렉토리를 읽어 id 순으로 정렬된
//! [`MigrationDefinition`] 목록을 만듭니다. 순수 읽기 작업이며
//! 부수 효과가 없습니다.
//!
//! # 파일 형식
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (...);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! forward(`up`) 섹션은 필수, reverse(`down`) 섹션은 선택입니다.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::depend;
use crate::error::{CoreError, Result};
use crate::models::MigrationDefinition;
use crate::statement;

/// forward 섹션 마커
pub const MARKER_UP: &str = "-- migrate:up";
/// reverse 섹션 마커
pub const MARKER_DOWN: &str = "-- migrate:down";

/// 디렉토리에서 마이그레이션 카탈로그 로드.
///
/// 파일명의 3자리 숫자 접두사(`003_add_sessions.sql`)로 정렬합니다.
/// 접두사가 없는 `.sql` 파일은 경고 후 건너뛰고, id가 중복되면
/// [`CoreError::MalformedMigration`]으로 실패합니다.
pub fn load_catalog(dir: &Path) -> Result<Vec<MigrationDefinition>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| CoreError::CatalogRead(format!("{}: {}", dir.display(), e)))?;

    let mut migrations: Vec<MigrationDefinition> = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| CoreError::CatalogRead(e.to_string()))?;
        let path = entry.path();

        if path.extension().is_none_or(|e| e != "sql") {
            continue;
        }

        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let Some((id, name)) = parse_filename(&filename) else {
            warn!(file = %filename, "숫자 접두사 없는 SQL 파일, 건너뜀");
            continue;
        };

        let raw = fs::read(&path)
            .map_err(|e| CoreError::CatalogRead(format!("{}: {}", path.display(), e)))?;

        let migration = parse_migration(id, name, &filename, &raw)?;
        migrations.push(migration);
    }

    migrations.sort_by_key(|m| m.id);

    // id 중복은 카탈로그 순서를 모호하게 만들므로 하드 에러
    for pair in migrations.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(CoreError::MalformedMigration {
                file: format!("{:03}_{}.sql", pair[1].id, pair[1].name),
                reason: format!("duplicate migration id {}", pair[1].id),
            });
        }
    }

    debug!(count = migrations.len(), dir = %dir.display(), "카탈로그 로드 완료");

    Ok(migrations)
}

/// `003_add_sessions.sql` → (3, "add_sessions")
fn parse_filename(filename: &str) -> Option<(u32, String)> {
    let stem = filename.strip_suffix(".sql")?;
    let (prefix, name) = stem.split_at_checked(3)?;

    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let name = name.strip_prefix('_')?;
    if name.is_empty() {
        return None;
    }

    let id: u32 = prefix.parse().ok()?;
    Some((id, name.to_string()))
}

/// 파일 내용을 섹션으로 나누고 정의를 생성
fn parse_migration(id: u32, name: String, filename: &str, raw: &[u8]) -> Result<MigrationDefinition> {
    let content = String::from_utf8_lossy(raw);

    let (forward_block, reverse_block) = split_sections(&content, filename)?;

    let forward_statements = statement::split_statements(&forward_block);
    if forward_statements.is_empty() {
        return Err(CoreError::MalformedMigration {
            file: filename.to_string(),
            reason: "forward section contains no statements".to_string(),
        });
    }

    let reverse_statements = reverse_block
        .map(|block| statement::split_statements(&block))
        .unwrap_or_default();

    let dependencies: BTreeSet<String> = depend::extract_table_refs(&forward_statements);

    // 체크섬은 원본 바이트 기준 (마커/공백 포함) — 드리프트 검출용
    let content_checksum = hex::encode(Sha256::digest(raw));

    Ok(MigrationDefinition {
        id,
        name,
        forward_statements,
        reverse_statements,
        dependencies,
        content_checksum,
    })
}

/// 현재 누적 중인 섹션
enum Section {
    /// 첫 마커 이전 (헤더 주석, 무시)
    Header,
    Forward,
    Reverse,
}

/// 마커 기준으로 forward/reverse 블록 분리.
///
/// `-- migrate:up` 마커가 없으면 forward 섹션 부재로 실패합니다.
fn split_sections(content: &str, filename: &str) -> Result<(String, Option<String>)> {
    let mut forward = String::new();
    let mut reverse = String::new();
    let mut seen_up = false;
    let mut seen_down = false;
    let mut section = Section::Header;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == MARKER_UP {
            if seen_up {
                return Err(CoreError::MalformedMigration {
                    file: filename.to_string(),
                    reason: format!("duplicate `{}` marker", MARKER_UP),
                });
            }
            seen_up = true;
            section = Section::Forward;
            continue;
        }
        if trimmed == MARKER_DOWN {
            if seen_down {
                return Err(CoreError::MalformedMigration {
                    file: filename.to_string(),
                    reason: format!("duplicate `{}` marker", MARKER_DOWN),
                });
            }
            seen_down = true;
            section = Section::Reverse;
            continue;
        }
        match section {
            Section::Forward => {
                forward.push_str(line);
                forward.push('\n');
            }
            Section::Reverse => {
                reverse.push_str(line);
                reverse.push('\n');
            }
            Section::Header => {}
        }
    }

    if !seen_up {
        return Err(CoreError::MalformedMigration {
            file: filename.to_string(),
            reason: format!("missing `{}` marker", MARKER_UP),
        });
    }

    Ok((forward, seen_down.then_some(reverse)))
}
