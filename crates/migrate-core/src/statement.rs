//! SQL 문장 분리기.
//!
//! 단일 구분자 `split(';')`는 문자열 리터럴이나 함수 본문 안의
//! 세미콜론에서 깨지므로, 인용부호와 중첩 블록을 인식하는
//! 문자 단위 렉서로 분리합니다. 인식 대상:
//! 작은따옴표(`''` 이스케이프 포함), 큰따옴표 식별자,
//! 달러 인용 블록(`$tag$ ... $tag$`), `--` 줄 주석, `/* */` 블록 주석.

/// 렉서 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum LexState {
    /// 일반 SQL
    Normal,
    /// '...' 내부
    SingleQuote,
    /// "..." 내부
    DoubleQuote,
    /// -- 줄 주석
    LineComment,
    /// /* */ 블록 주석
    BlockComment,
    /// $tag$ ... $tag$ 내부 (여는 태그 보관)
    DollarQuote(String),
}

/// SQL 블록을 개별 실행 가능한 문장으로 분리.
///
/// 최상위 `;`에서만 분리하고, 빈 조각과 주석만 있는 조각은 버립니다.
/// 반환된 문장에는 종결자 `;`가 포함되지 않습니다.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = LexState::Normal;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match &state {
            LexState::Normal => match c {
                '\'' => {
                    state = LexState::SingleQuote;
                    current.push(c);
                }
                '"' => {
                    state = LexState::DoubleQuote;
                    current.push(c);
                }
                '-' if next == Some('-') => {
                    state = LexState::LineComment;
                    current.push(c);
                }
                '/' if next == Some('*') => {
                    state = LexState::BlockComment;
                    current.push(c);
                    current.push('*');
                    i += 1;
                }
                '$' => {
                    // 달러 인용 여는 태그: $$, $body$, $_1$ 등
                    if let Some(tag) = read_dollar_tag(&chars, i) {
                        current.push_str(&tag);
                        i += tag.chars().count() - 1;
                        state = LexState::DollarQuote(tag);
                    } else {
                        current.push(c);
                    }
                }
                ';' => {
                    push_fragment(&mut statements, &mut current);
                }
                _ => current.push(c),
            },
            LexState::SingleQuote => {
                current.push(c);
                if c == '\'' {
                    // '' 는 이스케이프된 따옴표
                    if next == Some('\'') {
                        current.push('\'');
                        i += 1;
                    } else {
                        state = LexState::Normal;
                    }
                }
            }
            LexState::DoubleQuote => {
                current.push(c);
                if c == '"' {
                    state = LexState::Normal;
                }
            }
            LexState::LineComment => {
                current.push(c);
                if c == '\n' {
                    state = LexState::Normal;
                }
            }
            LexState::BlockComment => {
                current.push(c);
                if c == '*' && next == Some('/') {
                    current.push('/');
                    i += 1;
                    state = LexState::Normal;
                }
            }
            LexState::DollarQuote(tag) => {
                if c == '$' && matches_tag(&chars, i, tag) {
                    current.push_str(tag);
                    i += tag.chars().count() - 1;
                    state = LexState::Normal;
                } else {
                    current.push(c);
                }
            }
        }

        i += 1;
    }

    // 종결자 없는 마지막 문장
    push_fragment(&mut statements, &mut current);

    statements
}

/// 조각을 정리해서 추가. 빈 조각과 주석만 있는 조각은 버림.
fn push_fragment(statements: &mut Vec<String>, current: &mut String) {
    let fragment = current.trim().to_string();
    current.clear();
    if fragment.is_empty() || is_comment_only(&fragment) {
        return;
    }
    statements.push(fragment);
}

/// 주석만으로 이루어진 조각인지 확인
fn is_comment_only(fragment: &str) -> bool {
    fragment.lines().all(|line| {
        let t = line.trim();
        t.is_empty() || t.starts_with("--")
    })
}

/// `pos`의 `$`에서 시작하는 달러 인용 태그를 읽음.
///
/// `$tag$` 전체를 반환. 태그는 비어 있거나(`$$`)
/// 식별자 문자(영문/숫자/underscore)로만 구성됩니다.
fn read_dollar_tag(chars: &[char], pos: usize) -> Option<String> {
    debug_assert_eq!(chars[pos], '$');
    let mut tag = String::from("$");
    let mut i = pos + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            tag.push('$');
            return Some(tag);
        }
        if c.is_alphanumeric() || c == '_' {
            tag.push(c);
            i += 1;
        } else {
            return None;
        }
    }
    None
}

/// `pos` 위치에서 닫는 태그가 일치하는지 확인
fn matches_tag(chars: &[char], pos: usize, tag: &str) -> bool {
    let tag_chars: Vec<char> = tag.chars().collect();
    if pos + tag_chars.len() > chars.len() {
        return false;
    }
    chars[pos..pos + tag_chars.len()] == tag_chars[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        let sql = "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "CREATE TABLE a (id INT)");
        assert_eq!(stmts[1], "CREATE TABLE b (id INT)");
    }

    #[test]
    fn test_split_discards_empty_fragments() {
        let stmts = split_statements(";;\n  ;\nSELECT 1;");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_semicolon_inside_string_literal() {
        let sql = "INSERT INTO t (v) VALUES ('a;b');\nSELECT 1;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("'a;b'"));
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let sql = "INSERT INTO t (v) VALUES ('it''s; fine');SELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("('it''s; fine')"));
    }

    #[test]
    fn test_dollar_quoted_body() {
        let sql = r#"
CREATE FUNCTION touch() RETURNS trigger AS $$
BEGIN
    NEW.updated_at = NOW();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;
SELECT 1;
"#;
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("NEW.updated_at = NOW();"));
        assert!(stmts[0].contains("LANGUAGE plpgsql"));
    }

    #[test]
    fn test_tagged_dollar_quote() {
        let sql = "CREATE FUNCTION f() RETURNS text AS $body$ SELECT 'x;y'; $body$ LANGUAGE sql; SELECT 3;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("$body$ SELECT 'x;y'; $body$"));
    }

    #[test]
    fn test_line_comment_with_semicolon() {
        let sql = "SELECT 1 -- trailing; comment\n+ 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("-- trailing; comment"));
    }

    #[test]
    fn test_block_comment_with_semicolon() {
        let sql = "SELECT /* a;b */ 1; SELECT 2;";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_comment_only_fragment_dropped() {
        let sql = "-- header comment\n;\nSELECT 1;";
        let stmts = split_statements(sql);
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_trailing_statement_without_terminator() {
        let stmts = split_statements("SELECT 1; SELECT 2");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], "SELECT 2");
    }

    #[test]
    fn test_double_quoted_identifier() {
        let sql = r#"CREATE TABLE "odd;name" (id INT); SELECT 1;"#;
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains(r#""odd;name""#));
    }
}
