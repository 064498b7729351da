//! FK 의존성 추출기.
//!
//! forward 문장의 `REFERENCES <table>` 절에서 참조 테이블 이름을
//! 추출합니다. 진단/순서 힌트 용도로만 사용되며 실행 순서에는
//! 영향을 주지 않습니다 (마이그레이션은 항상 카탈로그 순서로 적용).
//! 휴리스틱 best-effort 패스: 추출 실패가 실행을 막아서는 안 됩니다.

use std::collections::BTreeSet;

/// forward 문장들에서 FK REFERENCES 대상 테이블 집합을 추출.
///
/// 스키마 한정 이름(`public.users`)은 마지막 구성요소만 취하고,
/// 소문자로 정규화합니다. 파싱할 수 없는 입력에서는 해당 절을
/// 건너뛰며, 절대 실패하지 않습니다.
pub fn extract_table_refs(statements: &[String]) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();

    for stmt in statements {
        collect_refs(stmt, &mut refs);
    }

    refs
}

/// 단일 문장에서 REFERENCES 대상 수집
fn collect_refs(stmt: &str, refs: &mut BTreeSet<String>) {
    let upper = stmt.to_uppercase();
    let mut search_from = 0;

    while let Some(rel) = upper[search_from..].find("REFERENCES") {
        let key_start = search_from + rel;
        let key_end = key_start + "REFERENCES".len();

        // 단어 경계 확인 (예: 컬럼명 일부가 아님)
        let before_ok = key_start == 0
            || !upper[..key_start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let after_ok = !upper[key_end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');

        if before_ok && after_ok {
            if let Some(name) = read_identifier(&stmt[key_end..]) {
                refs.insert(name);
            }
        }

        search_from = key_end;
    }
}

/// 키워드 뒤의 첫 식별자를 읽음 (따옴표/스키마 한정 처리)
fn read_identifier(rest: &str) -> Option<String> {
    let rest = rest.trim_start();

    // "quoted name" 형식
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        let name = &stripped[..end];
        if name.is_empty() {
            return None;
        }
        return Some(name.to_lowercase());
    }

    let ident: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        .collect();

    if ident.is_empty() {
        return None;
    }

    // public.users → users
    let last = ident.rsplit('.').next().unwrap_or(&ident);
    if last.is_empty() {
        return None;
    }
    Some(last.to_lowercase())
}
