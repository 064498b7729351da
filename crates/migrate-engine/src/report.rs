//! 최종 실행 보고서.

use std::time::Duration;

use migrate_core::CheckpointType;
use uuid::Uuid;

use crate::orchestrator::RunPhase;
use crate::validator::Violation;

/// 보고서용 체크포인트 요약
#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    pub id: Uuid,
    pub migration_id: u32,
    pub checkpoint_type: CheckpointType,
}

/// 오케스트레이션 1회 실행의 최종 보고서.
///
/// 실패한 실행에서도 항상 생성됩니다 — 어떤 마이그레이션이
/// 완료됐는지, 어떤 체크포인트 id가 존재하는지, 실패한 문장이
/// 무엇인지 운영자가 도구 재실행 없이 파악할 수 있어야 합니다.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// 종료 시점의 상태 머신 단계 (Completed 또는 Aborted)
    pub phase: RunPhase,
    /// 카탈로그의 전체 마이그레이션 수
    pub total_migrations: usize,
    /// 완료된 마이그레이션 (적용 순서)
    pub completed: Vec<(u32, String)>,
    /// 이번 실행에서 생성된 체크포인트
    pub checkpoints: Vec<CheckpointSummary>,
    /// 최종 검증 단계의 무결성 위반
    pub violations: Vec<Violation>,
    /// 기록된 에러
    pub errors: Vec<String>,
    /// 기록된 경고
    pub warnings: Vec<String>,
    /// 전체 소요 시간
    pub elapsed: Duration,
    /// dry-run 여부
    pub dry_run: bool,
}

impl MigrationReport {
    /// 정상 완료 여부
    pub fn is_success(&self) -> bool {
        matches!(self.phase, RunPhase::Completed)
    }

    /// 프로세스 종료 코드 (0: Completed, 1: Aborted)
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "═══════════════════════════════════════════════════════════════"
        )?;
        writeln!(f, "                    마이그레이션 실행 보고서")?;
        writeln!(
            f,
            "═══════════════════════════════════════════════════════════════"
        )?;
        writeln!(f)?;
        writeln!(f, "📊 요약")?;
        if self.dry_run {
            writeln!(f, "  모드: dry-run (실제 변경 없음)")?;
        }
        writeln!(f, "  대상 마이그레이션: {} 개", self.total_migrations)?;
        writeln!(f, "  완료: {} 개", self.completed.len())?;
        writeln!(f, "  체크포인트: {} 개", self.checkpoints.len())?;
        writeln!(f, "  최종 상태: {}", self.phase)?;
        writeln!(f, "  소요 시간: {:.1}s", self.elapsed.as_secs_f64())?;
        writeln!(f)?;
        writeln!(
            f,
            "  🔴 에러: {} 개  🟡 경고: {} 개",
            self.errors.len(),
            self.warnings.len()
        )?;

        if !self.completed.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "───────────────────────────────────────────────────────────────"
            )?;
            writeln!(f, "✅ 완료된 마이그레이션")?;
            writeln!(
                f,
                "───────────────────────────────────────────────────────────────"
            )?;
            for (id, name) in &self.completed {
                writeln!(f, "  {:03}_{}", id, name)?;
            }
        }

        if !self.checkpoints.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "───────────────────────────────────────────────────────────────"
            )?;
            writeln!(f, "📌 체크포인트")?;
            writeln!(
                f,
                "───────────────────────────────────────────────────────────────"
            )?;
            for cp in &self.checkpoints {
                writeln!(
                    f,
                    "  {} | migration {:03} | {}",
                    cp.id, cp.migration_id, cp.checkpoint_type
                )?;
            }
        }

        if !self.violations.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "───────────────────────────────────────────────────────────────"
            )?;
            writeln!(f, "🔍 무결성 위반")?;
            writeln!(
                f,
                "───────────────────────────────────────────────────────────────"
            )?;
            for v in &self.violations {
                writeln!(f, "  [{}] {}: {} 건", v.severity, v.rule, v.count)?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "🔴 에러")?;
            for (i, e) in self.errors.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, e)?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "🟡 경고")?;
            for (i, w) in self.warnings.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, w)?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "═══════════════════════════════════════════════════════════════"
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrate_core::Severity;

    fn sample_report(phase: RunPhase) -> MigrationReport {
        MigrationReport {
            phase,
            total_migrations: 2,
            completed: vec![(1, "create_users".to_string())],
            checkpoints: vec![CheckpointSummary {
                id: Uuid::new_v4(),
                migration_id: 1,
                checkpoint_type: CheckpointType::PreMigration,
            }],
            violations: vec![Violation {
                rule: "sessions_without_user".to_string(),
                count: 3,
                severity: Severity::Error,
            }],
            errors: vec!["migration 2 failed at statement 0: boom".to_string()],
            warnings: vec![],
            elapsed: Duration::from_secs(2),
            dry_run: false,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(sample_report(RunPhase::Completed).exit_code(), 0);
        assert_eq!(sample_report(RunPhase::Aborted).exit_code(), 1);
    }

    #[test]
    fn test_display_lists_everything_operator_needs() {
        let report = sample_report(RunPhase::Aborted);
        let out = format!("{}", report);

        assert!(out.contains("001_create_users"));
        assert!(out.contains("pre_migration"));
        assert!(out.contains("sessions_without_user: 3 건"));
        assert!(out.contains("failed at statement 0"));
        assert!(out.contains("aborted"));
    }

    #[test]
    fn test_display_marks_dry_run() {
        let mut report = sample_report(RunPhase::Completed);
        report.dry_run = true;
        assert!(format!("{}", report).contains("dry-run"));
    }
}
