//! 기본 마이그레이션 카탈로그와 엔진 구성요소 정합성 테스트
//!
//! migrations/ 디렉토리의 기본 카탈로그가 엔진이 관리하는 테이블
//! 목록, 무결성 규칙, 인덱스 목록과 어긋나지 않는지 확인합니다.

use std::path::PathBuf;

use migrate_core::catalog;
use migrate_engine::emergency::MANAGED_TABLES;
use migrate_engine::indexes::PERFORMANCE_INDEXES;
use migrate_engine::validator::default_rules;

fn default_migrations_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../migrations")
}

#[test]
fn default_catalog_loads_in_order() {
    let migrations = catalog::load_catalog(&default_migrations_dir()).unwrap();

    assert_eq!(migrations.len(), MANAGED_TABLES.len());
    for (idx, migration) in migrations.iter().enumerate() {
        assert_eq!(migration.id, (idx + 1) as u32);
        assert!(migration.is_reversible(), "{} must be reversible", migration.label());
        assert_eq!(migration.content_checksum.len(), 64);
    }
}

#[test]
fn default_catalog_matches_managed_tables() {
    let migrations = catalog::load_catalog(&default_migrations_dir()).unwrap();

    for (migration, table) in migrations.iter().zip(MANAGED_TABLES) {
        assert_eq!(migration.name, format!("create_{}", table));

        let forward = migration.forward_statements.join("\n");
        assert!(
            forward.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
            "{} must create {}",
            migration.label(),
            table
        );

        // 역방향은 forward가 만든 테이블을 정확히 제거
        let reverse = migration.reverse_statements.join("\n");
        assert!(
            reverse.contains(&format!("DROP TABLE IF EXISTS {}", table)),
            "{} reverse must drop {}",
            migration.label(),
            table
        );
    }
}

#[test]
fn dependencies_point_to_earlier_migrations() {
    let migrations = catalog::load_catalog(&default_migrations_dir()).unwrap();

    for migration in &migrations {
        for dep in &migration.dependencies {
            let parent = migrations
                .iter()
                .find(|m| m.name == format!("create_{}", dep))
                .unwrap_or_else(|| panic!("{} references unknown table {}", migration.label(), dep));
            assert!(
                parent.id < migration.id,
                "{} depends on {} which is created later",
                migration.label(),
                dep
            );
        }
    }

    // FK 스키마 구조 확인: 세션/키/설정은 users에 의존
    let sessions = migrations.iter().find(|m| m.name == "create_user_sessions").unwrap();
    assert!(sessions.dependencies.contains("users"));
}

#[test]
fn integrity_rules_cover_only_managed_tables() {
    for rule in default_rules() {
        for table in rule.required_tables {
            assert!(
                MANAGED_TABLES.contains(table),
                "rule {} requires unmanaged table {}",
                rule.name,
                table
            );
        }
    }
}

#[test]
fn performance_indexes_target_managed_tables() {
    for (name, ddl) in PERFORMANCE_INDEXES {
        let target = ddl
            .split(" ON ")
            .nth(1)
            .and_then(|rest| rest.split('(').next())
            .unwrap_or_default()
            .trim();
        assert!(
            MANAGED_TABLES.contains(&target),
            "index {} targets unmanaged table '{}'",
            name,
            target
        );
    }
}
