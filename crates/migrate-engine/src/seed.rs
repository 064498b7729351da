//! 기준 데이터 시더.
//!
//! 조회/설정용 기준 행을 멱등하게 삽입합니다. 의미 단위 그룹마다
//! 트랜잭션 하나를 사용해 그룹이 반쯤 채워진 채 남지 않게 하고,
//! `ON CONFLICT ... DO NOTHING`(first-writer-wins)으로 운영자가
//! 수정한 설정을 절대 덮어쓰지 않습니다.

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// 부트스트랩 관리자 이메일
pub const ADMIN_EMAIL: &str = "admin@mainframe.local";

/// 기본 SSO 프로바이더 (id, 이름, 프로바이더 종류, 인증/토큰/유저정보 URL, 스코프)
const SSO_PROVIDERS: &[(&str, &str, &str, &str, &str, &str, &str)] = &[
    (
        "google-oauth",
        "Google OAuth 2.0",
        "google",
        "https://accounts.google.com/o/oauth2/v2/auth",
        "https://oauth2.googleapis.com/token",
        "https://www.googleapis.com/oauth2/v1/userinfo",
        r#"["openid", "profile", "email"]"#,
    ),
    (
        "microsoft-azure",
        "Microsoft Azure AD",
        "azure_ad",
        "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
        "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        "https://graph.microsoft.com/v1.0/me",
        r#"["openid", "profile", "email"]"#,
    ),
];

/// 그룹별 시딩 결과
#[derive(Debug, Clone)]
pub struct SeedGroupReport {
    pub group: String,
    /// 새로 삽입된 행 수 (이미 있던 행은 건드리지 않음)
    pub inserted: u64,
}

/// 전체 시딩 결과
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub groups: Vec<SeedGroupReport>,
}

impl SeedReport {
    pub fn total_inserted(&self) -> u64 {
        self.groups.iter().map(|g| g.inserted).sum()
    }
}

/// 기준 데이터 시더
#[derive(Clone)]
pub struct SeedPopulator {
    pool: PgPool,
    dry_run: bool,
    admin_password: String,
}

impl SeedPopulator {
    pub fn new(pool: PgPool, dry_run: bool, admin_password: String) -> Self {
        Self {
            pool,
            dry_run,
            admin_password,
        }
    }

    /// 전체 시드 그룹 실행 (providers → admin 계정 → 시스템 기본값).
    ///
    /// 그룹 실패는 즉시 중단합니다 — 뒤 그룹(admin 환경설정)이 앞
    /// 그룹(admin 계정)의 행을 전제하기 때문입니다.
    pub async fn populate(&self) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        let inserted = self.seed_sso_providers().await.map_err(seed_err("sso_providers"))?;
        record_group(&mut report, "sso_providers", inserted);

        let inserted = self.seed_admin_account().await.map_err(seed_err("admin_account"))?;
        record_group(&mut report, "admin_account", inserted);

        let inserted = self
            .seed_system_defaults()
            .await
            .map_err(seed_err("system_defaults"))?;
        record_group(&mut report, "system_defaults", inserted);

        Ok(report)
    }

    /// 기본 SSO 프로바이더 행 삽입
    async fn seed_sso_providers(&self) -> Result<u64> {
        if self.dry_run {
            debug!(rows = SSO_PROVIDERS.len(), "dry-run: SSO 프로바이더 시딩 생략");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for (id, name, provider, auth_url, token_url, user_info_url, scopes) in SSO_PROVIDERS {
            let result = sqlx::query(
                r#"
                INSERT INTO sso_configurations
                    (id, name, provider, authorization_url, token_url, user_info_url, scopes, is_enabled)
                VALUES ($1, $2, $3, $4, $5, $6, $7::jsonb, true)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(provider)
            .bind(auth_url)
            .bind(token_url)
            .bind(user_info_url)
            .bind(scopes)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// 부트스트랩 관리자 계정 삽입
    async fn seed_admin_account(&self) -> Result<u64> {
        if self.dry_run {
            debug!("dry-run: 관리자 계정 시딩 생략");
            return Ok(0);
        }

        let password_hash = hash_password(&self.admin_password);

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO users
                (email, email_verified, password_hash, first_name, last_name,
                 display_name, role, permissions, is_active)
            VALUES ($1, true, $2, 'System', 'Administrator',
                    'System Administrator', 'admin', '["read", "write", "admin"]'::jsonb, true)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(ADMIN_EMAIL)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// 관리자 기본 환경설정 삽입
    async fn seed_system_defaults(&self) -> Result<u64> {
        if self.dry_run {
            debug!("dry-run: 시스템 기본값 시딩 생략");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, theme, language)
            SELECT id, 'light', 'en' FROM users WHERE email = $1
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(ADMIN_EMAIL)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }
}

/// 그룹 결과 기록 헬퍼
fn record_group(report: &mut SeedReport, group: &str, inserted: u64) {
    info!(group = group, inserted = inserted, "시드 그룹 완료");
    report.groups.push(SeedGroupReport {
        group: group.to_string(),
        inserted,
    });
}

/// 그룹 이름을 보존하는 에러 변환 헬퍼
fn seed_err(group: &'static str) -> impl Fn(EngineError) -> EngineError {
    move |e| EngineError::Seed {
        group: group.to_string(),
        cause: e.to_string(),
    }
}

/// `salt$sha256(password+salt)` 형식 비밀번호 해시
pub fn hash_password(password: &str) -> String {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);

    let digest = Sha256::digest(format!("{}{}", password, salt).as_bytes());
    format!("{}${}", salt, hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_format() {
        let hash = hash_password("admin123");
        let (salt, digest) = hash.split_once('$').unwrap();
        assert_eq!(salt.len(), 32); // 16바이트 hex
        assert_eq!(digest.len(), 64); // SHA-256 hex
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_password_salted() {
        // 같은 비밀번호라도 솔트가 달라 해시가 달라야 함
        assert_ne!(hash_password("admin123"), hash_password("admin123"));
    }

    #[test]
    fn test_hash_password_verifiable() {
        let hash = hash_password("secret");
        let (salt, digest) = hash.split_once('$').unwrap();
        let recomputed = hex::encode(Sha256::digest(format!("secret{}", salt).as_bytes()));
        assert_eq!(digest, recomputed);
    }

    #[test]
    fn test_sso_provider_rows() {
        assert_eq!(SSO_PROVIDERS.len(), 2);
        let ids: Vec<_> = SSO_PROVIDERS.iter().map(|p| p.0).collect();
        assert!(ids.contains(&"google-oauth"));
        assert!(ids.contains(&"microsoft-azure"));
    }
}
