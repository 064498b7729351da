//! 참조 무결성 검증기.
//!
//! 라이브 스키마에 대해 고정된 무결성 규칙 배터리를 평가합니다.
//! 각 규칙은 위반 행 수를 반환하는 COUNT 쿼리입니다. 규칙이
//! 참조하는 테이블이 아직 없으면 해당 규칙은 실패가 아니라
//! 건너뜀으로 처리됩니다 — 초기 마이그레이션 단계에서는 정상입니다.
//! 검증 실패로 실행을 중단할지는 오케스트레이터가 결정합니다
//! (tolerance / force 설정).

use migrate_core::Severity;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::error::Result;

/// 이름 있는 참조 무결성 검사
#[derive(Debug, Clone)]
pub struct IntegrityRule {
    /// 규칙 이름 (보고서 표시용)
    pub name: &'static str,
    /// 위반 행 수를 반환하는 단일 COUNT 쿼리
    pub query: &'static str,
    /// 위반 시 심각도
    pub severity: Severity,
    /// 평가에 필요한 테이블 (하나라도 없으면 규칙 건너뜀)
    pub required_tables: &'static [&'static str],
}

/// 기본 규칙 배터리.
///
/// 관리 대상 스키마의 FK 간선에서 도출: 삭제된 부모(users)를
/// 가리키는 고아 행 검출. ON DELETE SET NULL 간선은 NULL이 정상
/// 상태이므로 non-NULL 고아만 센다.
pub fn default_rules() -> Vec<IntegrityRule> {
    vec![
        IntegrityRule {
            name: "sessions_without_user",
            query: "SELECT COUNT(*) FROM user_sessions s \
                    LEFT JOIN users u ON u.id = s.user_id \
                    WHERE u.id IS NULL",
            severity: Severity::Error,
            required_tables: &["user_sessions", "users"],
        },
        IntegrityRule {
            name: "api_keys_without_user",
            query: "SELECT COUNT(*) FROM encrypted_api_keys k \
                    LEFT JOIN users u ON u.id = k.user_id \
                    WHERE u.id IS NULL",
            severity: Severity::Error,
            required_tables: &["encrypted_api_keys", "users"],
        },
        IntegrityRule {
            name: "preferences_without_user",
            query: "SELECT COUNT(*) FROM user_preferences p \
                    LEFT JOIN users u ON u.id = p.user_id \
                    WHERE u.id IS NULL",
            severity: Severity::Error,
            required_tables: &["user_preferences", "users"],
        },
        IntegrityRule {
            name: "audit_logs_dangling_user",
            query: "SELECT COUNT(*) FROM audit_logs l \
                    LEFT JOIN users u ON u.id = l.user_id \
                    WHERE l.user_id IS NOT NULL AND u.id IS NULL",
            severity: Severity::Warning,
            required_tables: &["audit_logs", "users"],
        },
        IntegrityRule {
            name: "security_events_dangling_user",
            query: "SELECT COUNT(*) FROM security_events e \
                    LEFT JOIN users u ON u.id = e.user_id \
                    WHERE e.user_id IS NOT NULL AND u.id IS NULL",
            severity: Severity::Warning,
            required_tables: &["security_events", "users"],
        },
    ]
}

/// 규칙 위반 기록
#[derive(Debug, Clone)]
pub struct Violation {
    pub rule: String,
    pub count: i64,
    pub severity: Severity,
}

/// 검증 결과
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// 위반이 하나도 없으면 true
    pub passed: bool,
    /// 위반 목록 (count > 0인 규칙만)
    pub violations: Vec<Violation>,
    /// 필요한 테이블 부재로 건너뛴 규칙 이름
    pub skipped: Vec<String>,
}

impl ValidationOutcome {
    /// 전체 위반 행 수
    pub fn total_violations(&self) -> i64 {
        self.violations.iter().map(|v| v.count).sum()
    }
}

/// 무결성 검증기
#[derive(Clone)]
pub struct IntegrityValidator {
    pool: PgPool,
}

impl IntegrityValidator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 규칙 배터리 평가
    pub async fn validate(&self, rules: &[IntegrityRule]) -> Result<ValidationOutcome> {
        let mut outcome = ValidationOutcome {
            passed: true,
            ..Default::default()
        };

        for rule in rules {
            if !self.tables_exist(rule.required_tables).await? {
                debug!(rule = rule.name, "필요 테이블 없음, 규칙 건너뜀");
                outcome.skipped.push(rule.name.to_string());
                continue;
            }

            let count: i64 = sqlx::query_scalar(rule.query).fetch_one(&self.pool).await?;

            if count > 0 {
                warn!(
                    rule = rule.name,
                    violations = count,
                    severity = %rule.severity,
                    "무결성 위반 검출"
                );
                outcome.violations.push(Violation {
                    rule: rule.name.to_string(),
                    count,
                    severity: rule.severity,
                });
                outcome.passed = false;
            }
        }

        info!(
            rules = rules.len(),
            skipped = outcome.skipped.len(),
            violations = outcome.violations.len(),
            passed = outcome.passed,
            "무결성 검증 완료"
        );

        Ok(outcome)
    }

    /// 모든 테이블이 존재하는지 확인 (`to_regclass` 기반, 락 없음)
    async fn tables_exist(&self, tables: &[&str]) -> Result<bool> {
        for table in tables {
            let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .bind(table)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_rules_well_formed() {
        let rules = default_rules();
        assert!(!rules.is_empty());

        let names: HashSet<_> = rules.iter().map(|r| r.name).collect();
        assert_eq!(names.len(), rules.len(), "rule names must be unique");

        for rule in &rules {
            assert!(
                rule.query.trim_start().to_uppercase().starts_with("SELECT COUNT"),
                "{} must be a COUNT query",
                rule.name
            );
            assert!(
                !rule.required_tables.is_empty(),
                "{} must declare required tables",
                rule.name
            );
            for table in rule.required_tables {
                assert!(
                    rule.query.contains(table),
                    "{} query must reference declared table {}",
                    rule.name,
                    table
                );
            }
        }
    }

    #[test]
    fn test_dangling_rules_ignore_null_fk() {
        // SET NULL 간선 규칙은 NULL FK를 위반으로 세지 않아야 함
        for rule in default_rules() {
            if rule.name.contains("dangling") {
                assert!(rule.query.contains("IS NOT NULL"));
                assert_eq!(rule.severity, Severity::Warning);
            }
        }
    }

    #[test]
    fn test_outcome_total_violations() {
        let outcome = ValidationOutcome {
            passed: false,
            violations: vec![
                Violation {
                    rule: "a".to_string(),
                    count: 2,
                    severity: Severity::Error,
                },
                Violation {
                    rule: "b".to_string(),
                    count: 1,
                    severity: Severity::Warning,
                },
            ],
            skipped: vec![],
        };
        assert_eq!(outcome.total_violations(), 3);
    }
}
