//! 마이그레이션 오케스트레이터.
//!
//! 컴포넌트들을 순서대로 구동하는 상태 머신입니다. 마이그레이션은
//! 엄격히 순차 실행됩니다 — 순서 자체가 정합성 불변식이므로
//! (뒤 마이그레이션은 앞 스키마의 존재를 가정) 같은 대상에 두
//! 정의가 동시에 적용되는 일은 없습니다. [`MigrationRunState`]는
//! 오케스트레이터가 단독 소유하며 다른 논리 스레드에서 접근하지
//! 않습니다.

use std::time::Instant;

use migrate_core::{catalog, CheckpointType, MigrationRunState};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointManager, RollbackOutcome};
use crate::config::MigrateConfig;
use crate::emergency;
use crate::error::Result;
use crate::executor::TransactionalExecutor;
use crate::indexes::IndexProvisioner;
use crate::lock::MigrationLock;
use crate::report::{CheckpointSummary, MigrationReport};
use crate::seed::SeedPopulator;
use crate::validator::{default_rules, IntegrityValidator, ValidationOutcome, Violation};

/// 오케스트레이션 상태 머신 단계.
///
/// `Idle → Initializing → Running(i) → Validating(i) → Indexing →
/// Seeding → FinalValidating → Completed`, 그리고 모든 `Running`/
/// `Validating` 단계에서 도달 가능한 터미널 상태 `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Initializing,
    /// i번째 (0-based) 마이그레이션 적용 중
    Running(usize),
    /// i번째 마이그레이션 직후 무결성 검증 중
    Validating(usize),
    Indexing,
    Seeding,
    FinalValidating,
    Completed,
    Aborted,
}

impl RunPhase {
    /// 터미널 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Aborted)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Initializing => write!(f, "initializing"),
            RunPhase::Running(i) => write!(f, "running({})", i),
            RunPhase::Validating(i) => write!(f, "validating({})", i),
            RunPhase::Indexing => write!(f, "indexing"),
            RunPhase::Seeding => write!(f, "seeding"),
            RunPhase::FinalValidating => write!(f, "final-validating"),
            RunPhase::Completed => write!(f, "completed"),
            RunPhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// 검증 게이트 판정: 중단해야 하면 true.
///
/// 위반 수가 허용치를 넘고 `force`가 아니면 중단합니다.
fn validation_should_abort(total_violations: i64, tolerance: u64, force: bool) -> bool {
    !force && total_violations.max(0) as u64 > tolerance
}

/// 마이그레이션 오케스트레이터
pub struct MigrationOrchestrator {
    config: MigrateConfig,
    pool: PgPool,
}

impl MigrationOrchestrator {
    pub fn new(config: MigrateConfig, pool: PgPool) -> Self {
        Self { config, pool }
    }

    /// 전체 파이프라인 실행.
    ///
    /// 초기화 단계(카탈로그 로드, 락, 체크포인트 테이블, 비상
    /// 스크립트)의 실패만 `Err`로 전파됩니다. 마이그레이션 루프
    /// 진입 이후의 실패는 상태에 기록되고 `Aborted` 보고서로
    /// 귀결됩니다 — 실패한 실행도 체크포인트와 비상 스크립트를
    /// 남겨야 하기 때문입니다.
    pub async fn run(self) -> Result<MigrationReport> {
        let started = Instant::now();
        let mut phase = RunPhase::Initializing;
        let mut state = MigrationRunState::new();

        info!(
            env = self.config.env_label(),
            dry_run = self.config.dry_run,
            phase = %phase,
            "마이그레이션 오케스트레이션 시작"
        );

        // ── 초기화 ──────────────────────────────────────────────
        let migrations = catalog::load_catalog(&self.config.migrations_dir)?;
        info!(count = migrations.len(), "카탈로그 로드 완료");

        let lock = MigrationLock::acquire(&self.pool).await?;

        let checkpoints = CheckpointManager::new(self.pool.clone(), self.config.dry_run);
        checkpoints.ensure_checkpoint_table().await?;

        // 프로세스가 복구 불가능하게 죽어도 쓸 수 있도록
        // 첫 마이그레이션 실행 전에 생성
        emergency::generate_script(&self.config.emergency_script_path, self.config.env_label())?;

        let executor = TransactionalExecutor::new(
            self.pool.clone(),
            self.config.statement_timeout_ms,
            self.config.dry_run,
        );
        let validator = IntegrityValidator::new(self.pool.clone());
        let rules = default_rules();

        // ── 마이그레이션 루프 ────────────────────────────────────
        let total = migrations.len();
        let mut aborted = false;

        for (idx, migration) in migrations.iter().enumerate() {
            phase = RunPhase::Running(idx);
            state.current_migration_id = Some(migration.id);

            info!(
                phase = %phase,
                "Step {}/{}: {} 적용",
                idx + 1,
                total,
                migration.label()
            );
            if !migration.dependencies.is_empty() {
                debug!(
                    migration = %migration.label(),
                    dependencies = ?migration.dependencies,
                    "FK 의존성 힌트 (진단용, 실행 순서에 영향 없음)"
                );
            }

            // pre-checkpoint: 영속화 실패 시 이 마이그레이션은 실행 불가
            let pre = match checkpoints
                .create_checkpoint(migration, CheckpointType::PreMigration, &mut state)
                .await
            {
                Ok(cp) => cp,
                Err(e) => {
                    error!(migration = %migration.label(), error = %e, "pre-checkpoint 생성 실패");
                    state.record_error(format!("{}: {}", migration.label(), e));
                    aborted = true;
                    break;
                }
            };

            // 트랜잭션 적용 (+실패 시 best-effort 자동 롤백)
            match executor
                .apply(migration, &pre, &checkpoints, self.config.skip_validation)
                .await
            {
                Ok(apply_report) => {
                    if let Some(slowest) = apply_report.timings.iter().max_by_key(|t| t.elapsed) {
                        debug!(
                            migration = %migration.label(),
                            statement_index = slowest.index,
                            elapsed_ms = slowest.elapsed.as_millis() as u64,
                            statement = %slowest.preview,
                            "가장 느린 문장"
                        );
                    }
                }
                Err(failure) => {
                    state.record_error(failure.error.to_string());
                    match failure.rollback {
                        RollbackOutcome::Succeeded => {
                            state.record_warning(format!(
                                "{}: 체크포인트 {} 자동 롤백 성공",
                                migration.label(),
                                pre.id
                            ));
                        }
                        RollbackOutcome::AttemptedButFailed { cause } => {
                            state.record_warning(format!(
                                "{}: 체크포인트 {} 자동 롤백 실패: {}",
                                migration.label(),
                                pre.id,
                                cause
                            ));
                        }
                        RollbackOutcome::Skipped => {}
                    }
                    aborted = true;
                    break;
                }
            }

            state.completed.push(migration.id);

            // post-checkpoint: 커밋에 성공한 경우에만 존재
            if let Err(e) = checkpoints
                .create_checkpoint(migration, CheckpointType::PostMigration, &mut state)
                .await
            {
                error!(migration = %migration.label(), error = %e, "post-checkpoint 생성 실패");
                state.record_error(format!("{}: {}", migration.label(), e));
                aborted = true;
                break;
            }

            // 무결성 게이트
            if !self.config.skip_validation {
                phase = RunPhase::Validating(idx);
                debug!(phase = %phase, migration = %migration.label(), "무결성 게이트");
                if self
                    .run_validation_gate(&validator, &rules, &mut state, &migration.label())
                    .await
                {
                    aborted = true;
                    break;
                }
            }
        }

        state.current_migration_id = None;

        // ── 후처리 단계 ─────────────────────────────────────────
        let mut final_violations: Vec<Violation> = Vec::new();

        if !aborted {
            phase = RunPhase::Indexing;
            info!(phase = %phase, "인덱스 프로비저닝");
            let provisioner = IndexProvisioner::new(self.pool.clone(), self.config.dry_run);
            if let Err(e) = provisioner.provision().await {
                error!(error = %e, "인덱스 프로비저닝 실패");
                state.record_error(e.to_string());
                aborted = true;
            }
        }

        if !aborted {
            phase = RunPhase::Seeding;
            info!(phase = %phase, "시드 데이터 삽입");
            let seeder = SeedPopulator::new(
                self.pool.clone(),
                self.config.dry_run,
                self.config.admin_initial_password.clone(),
            );
            match seeder.populate().await {
                Ok(seed_report) => {
                    debug!(inserted = seed_report.total_inserted(), "시딩 완료");
                }
                Err(e) => {
                    error!(error = %e, "시드 데이터 삽입 실패");
                    state.record_error(e.to_string());
                    aborted = true;
                }
            }
        }

        if !aborted && !self.config.skip_validation {
            phase = RunPhase::FinalValidating;
            info!(phase = %phase, "최종 무결성 검증");
            match validator.validate(&rules).await {
                Ok(outcome) => {
                    final_violations = outcome.violations.clone();
                    if self.gate_outcome(&outcome, &mut state, "final validation") {
                        aborted = true;
                    }
                }
                Err(e) => {
                    if self.config.force {
                        state.record_warning(format!("final validation error (forced): {}", e));
                    } else {
                        state.record_error(format!("final validation error: {}", e));
                        aborted = true;
                    }
                }
            }
        }

        phase = if aborted {
            RunPhase::Aborted
        } else {
            RunPhase::Completed
        };

        if let Err(e) = lock.release().await {
            warn!(error = %e, "마이그레이션 락 해제 실패 (커넥션 종료 시 서버가 해제)");
        }

        let report = MigrationReport {
            phase,
            total_migrations: total,
            completed: state
                .completed
                .iter()
                .map(|id| {
                    let name = migrations
                        .iter()
                        .find(|m| m.id == *id)
                        .map(|m| m.name.clone())
                        .unwrap_or_default();
                    (*id, name)
                })
                .collect(),
            checkpoints: state
                .checkpoints
                .iter()
                .map(|cp| CheckpointSummary {
                    id: cp.id,
                    migration_id: cp.migration_id,
                    checkpoint_type: cp.checkpoint_type,
                })
                .collect(),
            violations: final_violations,
            errors: state.errors.clone(),
            warnings: state.warnings.clone(),
            elapsed: started.elapsed(),
            dry_run: self.config.dry_run,
        };

        if report.is_success() {
            info!(
                completed = report.completed.len(),
                elapsed_s = format!("{:.1}", report.elapsed.as_secs_f64()),
                "마이그레이션 오케스트레이션 완료"
            );
        } else {
            error!(
                completed = report.completed.len(),
                errors = report.errors.len(),
                "마이그레이션 오케스트레이션 중단"
            );
        }

        Ok(report)
    }

    /// 마이그레이션 직후 검증 게이트. 중단해야 하면 true.
    async fn run_validation_gate(
        &self,
        validator: &IntegrityValidator,
        rules: &[crate::validator::IntegrityRule],
        state: &mut MigrationRunState,
        label: &str,
    ) -> bool {
        match validator.validate(rules).await {
            Ok(outcome) => self.gate_outcome(&outcome, state, label),
            Err(e) => {
                if self.config.force {
                    state.record_warning(format!("{}: validation error (forced): {}", label, e));
                    false
                } else {
                    state.record_error(format!("{}: validation error: {}", label, e));
                    true
                }
            }
        }
    }

    /// 검증 결과에 tolerance/force 정책 적용. 중단해야 하면 true.
    ///
    /// 위반은 건수와 함께 그대로 기록됩니다 — 중단 여부와 무관하게
    /// 보고서에서 운영자가 원문을 볼 수 있어야 합니다.
    fn gate_outcome(
        &self,
        outcome: &ValidationOutcome,
        state: &mut MigrationRunState,
        label: &str,
    ) -> bool {
        for v in &outcome.violations {
            state.record_warning(format!("[{}] {}: {} violation(s)", v.severity, v.rule, v.count));
        }

        let total = outcome.total_violations();
        if total == 0 {
            return false;
        }

        if validation_should_abort(total, self.config.validation_tolerance, self.config.force) {
            state.record_error(format!(
                "{}: integrity validation failed with {} violation(s)",
                label, total
            ));
            true
        } else {
            state.record_warning(format!(
                "{}: {} violation(s) within tolerance, continuing",
                label, total
            ));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::Idle.to_string(), "idle");
        assert_eq!(RunPhase::Running(3).to_string(), "running(3)");
        assert_eq!(RunPhase::Validating(0).to_string(), "validating(0)");
        assert_eq!(RunPhase::FinalValidating.to_string(), "final-validating");
        assert_eq!(RunPhase::Completed.to_string(), "completed");
    }

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::Completed.is_terminal());
        assert!(RunPhase::Aborted.is_terminal());
        assert!(!RunPhase::Running(0).is_terminal());
        assert!(!RunPhase::Indexing.is_terminal());
    }

    #[test]
    fn test_validation_gate_default_tolerance() {
        // 기본 tolerance 0: 위반 1건이면 중단
        assert!(validation_should_abort(1, 0, false));
        assert!(!validation_should_abort(0, 0, false));
    }

    #[test]
    fn test_validation_gate_tolerance() {
        assert!(!validation_should_abort(3, 5, false));
        assert!(validation_should_abort(6, 5, false));
    }

    #[test]
    fn test_validation_gate_force_overrides() {
        assert!(!validation_should_abort(100, 0, true));
    }
}
