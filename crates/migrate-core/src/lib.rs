//! 마이그레이션 카탈로그 파싱 및 핵심 데이터 모델.
//!
//! 마이그레이션 정의 파일을 구조화된 레코드로 변환하고,
//! SQL 문장 분리, FK 의존성 추출, 체크섬 계산을 담당합니다.
//! 데이터베이스에 접근하는 코드는 `migrate-engine`에 있습니다.
//!
//! # 사용 예시
//!
//! ```ignore
//! use migrate_core::catalog;
//!
//! let migrations = catalog::load_catalog(Path::new("migrations"))?;
//! for m in &migrations {
//!     println!("{:03}_{}: {} statements", m.id, m.name, m.forward_statements.len());
//! }
//! ```

pub mod catalog;
pub mod depend;
pub mod error;
pub mod models;
pub mod statement;

pub use error::{CoreError, Result};
pub use models::*;
