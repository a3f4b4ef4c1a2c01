//! Splitting of SQL source files into statements, and the narrow
//! `CREATE [DEFINER=...] (PROCEDURE|FUNCTION) name` recognizer.
//!
//! Neither is a SQL parser. The splitter only knows enough to keep quoted
//! text, comments, `DELIMITER` directives and `BEGIN ... END` bodies intact.

use crate::model::RoutineKind;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDeclaration {
    pub kind: RoutineKind,
    pub name: String,
}

fn declaration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\bCREATE\s+(?:OR\s+REPLACE\s+)?(?:DEFINER\s*=\s*\S+\s+)?(PROCEDURE|FUNCTION)\s+(?:IF\s+NOT\s+EXISTS\s+)?`?(\w+)`?",
        )
        .unwrap_or_else(|e| panic!("routine declaration pattern: {e}"))
    })
}

/// Finds the first routine declaration in `source`.
pub fn routine_declaration(source: &str) -> Option<RoutineDeclaration> {
    let caps = declaration_re().captures(source)?;
    let kind = RoutineKind::parse(caps.get(1)?.as_str())?;
    Some(RoutineDeclaration {
        kind,
        name: caps.get(2)?.as_str().to_string(),
    })
}

/// Leading keyword of a statement that would end or replace the current
/// transaction (`COMMIT`, `ROLLBACK`, `BEGIN`, `START TRANSACTION`, `END`,
/// `SET autocommit`, table locks, `XA`). `ROLLBACK TO SAVEPOINT` stays inside
/// the transaction and is not reported.
pub fn transaction_control(statement: &str) -> Option<String> {
    let words: Vec<String> = strip_leading_comments(statement)
        .split(|c: char| c.is_whitespace() || c == ';' || c == '=')
        .filter(|w| !w.is_empty())
        .take(3)
        .map(|w| w.to_ascii_uppercase())
        .collect();
    let first = words.first()?;
    let second = words.get(1).map(String::as_str);
    let hit = match first.as_str() {
        "COMMIT" | "BEGIN" | "END" | "XA" => true,
        "ROLLBACK" => second != Some("TO"),
        "START" => second == Some("TRANSACTION"),
        "LOCK" | "UNLOCK" => matches!(second, Some("TABLE" | "TABLES" | "INSTANCE")),
        "SET" => words[1..].iter().any(|w| {
            let var = w.trim_start_matches("@@");
            let var = ["SESSION.", "LOCAL.", "GLOBAL."]
                .iter()
                .fold(var, |v, scope| v.strip_prefix(scope).unwrap_or(v));
            var == "AUTOCOMMIT"
        }),
        _ => false,
    };
    hit.then(|| first.clone())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Single,
    Double,
    Backtick,
    LineComment,
    BlockComment,
}

/// Splits a script into executable statements.
///
/// - `'...'`, `"..."` and `` `...` `` are opaque (doubled quotes and
///   backslash escapes included);
/// - `-- `, `#` and `/* */` comments are kept with their statement;
/// - a line `DELIMITER xx` switches the terminator until the next directive;
/// - with the default `;` terminator, `BEGIN`/`CASE` ... `END` nesting inside
///   a `CREATE` statement keeps compound bodies whole.
///
/// Empty and comment-only statements are dropped.
pub fn split_statements(source: &str) -> Vec<String> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut has_code = false;
    let mut delimiter = String::from(";");
    let mut depth: i32 = 0;
    let mut lex = Lex::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match lex {
            Lex::Code => {
                if at_line_start(&chars, i) && !has_code {
                    if let Some((new_delim, next)) = delimiter_directive(&chars, i) {
                        flush(&mut buf, &mut has_code, &mut out);
                        delimiter = new_delim;
                        depth = 0;
                        i = next;
                        continue;
                    }
                }

                if depth <= 0 && matches_at(&chars, i, &delimiter) {
                    flush(&mut buf, &mut has_code, &mut out);
                    depth = 0;
                    i += delimiter.chars().count();
                    continue;
                }

                match c {
                    '\'' => lex = Lex::Single,
                    '"' => lex = Lex::Double,
                    '`' => lex = Lex::Backtick,
                    '#' => lex = Lex::LineComment,
                    '-' if chars.get(i + 1) == Some(&'-')
                        && chars.get(i + 2).map_or(true, |n| n.is_whitespace()) =>
                    {
                        lex = Lex::LineComment
                    }
                    '/' if chars.get(i + 1) == Some(&'*') => {
                        buf.push_str("/*");
                        lex = Lex::BlockComment;
                        i += 2;
                        continue;
                    }
                    _ => {}
                }

                if lex == Lex::Code && is_word_start(&chars, i) {
                    let end = word_end(&chars, i);
                    let word: String = chars[i..end].iter().collect();
                    buf.push_str(&word);
                    has_code = true;
                    i = end;
                    if delimiter == ";" && starts_with_create(&buf) {
                        i = track_block(&word, &chars, i, &mut depth, &mut buf);
                    }
                    continue;
                }

                if !c.is_whitespace() && !matches!(lex, Lex::LineComment) {
                    has_code = true;
                }
                buf.push(c);
                i += 1;
            }
            Lex::Single | Lex::Double | Lex::Backtick => {
                let quote = match lex {
                    Lex::Single => '\'',
                    Lex::Double => '"',
                    _ => '`',
                };
                buf.push(c);
                if c == '\\' && lex != Lex::Backtick {
                    if let Some(&n) = chars.get(i + 1) {
                        buf.push(n);
                        i += 2;
                        continue;
                    }
                } else if c == quote {
                    if chars.get(i + 1) == Some(&quote) {
                        buf.push(quote);
                        i += 2;
                        continue;
                    }
                    lex = Lex::Code;
                }
                i += 1;
            }
            Lex::LineComment => {
                buf.push(c);
                if c == '\n' {
                    lex = Lex::Code;
                }
                i += 1;
            }
            Lex::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    buf.push_str("*/");
                    lex = Lex::Code;
                    i += 2;
                    continue;
                }
                buf.push(c);
                i += 1;
            }
        }
    }
    flush(&mut buf, &mut has_code, &mut out);
    out
}

fn flush(buf: &mut String, has_code: &mut bool, out: &mut Vec<String>) {
    let stmt = buf.trim();
    if *has_code && !stmt.is_empty() {
        out.push(stmt.to_string());
    }
    buf.clear();
    *has_code = false;
}

/// Adjusts block depth for `word`; returns the new scan position (which
/// moves past the closer word after `END`).
fn track_block(word: &str, chars: &[char], pos: usize, depth: &mut i32, buf: &mut String) -> usize {
    match word.to_ascii_uppercase().as_str() {
        "BEGIN" | "CASE" => {
            *depth += 1;
            pos
        }
        "END" => {
            let (next_word, next_end) = peek_word(chars, pos);
            match next_word.to_ascii_uppercase().as_str() {
                "IF" | "LOOP" | "WHILE" | "REPEAT" => {
                    // closes a block that never incremented
                    buf.extend(&chars[pos..next_end]);
                    next_end
                }
                "CASE" => {
                    *depth -= 1;
                    buf.extend(&chars[pos..next_end]);
                    next_end
                }
                _ => {
                    *depth -= 1;
                    pos
                }
            }
        }
        _ => pos,
    }
}

fn peek_word(chars: &[char], pos: usize) -> (String, usize) {
    let mut j = pos;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    if j < chars.len() && is_word_char(chars[j]) {
        let end = word_end(chars, j);
        (chars[j..end].iter().collect(), end)
    } else {
        (String::new(), pos)
    }
}

fn starts_with_create(buf: &str) -> bool {
    let trimmed = strip_leading_comments(buf);
    trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("create"))
}

fn strip_leading_comments(s: &str) -> &str {
    let mut rest = s.trim_start();
    loop {
        if rest.starts_with("--") || rest.starts_with('#') {
            rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if rest.starts_with("/*") {
            rest = rest.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else {
            return rest;
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_start(chars: &[char], i: usize) -> bool {
    (chars[i].is_alphabetic() || chars[i] == '_') && (i == 0 || !is_word_char(chars[i - 1]))
}

fn word_end(chars: &[char], start: usize) -> usize {
    let mut j = start;
    while j < chars.len() && is_word_char(chars[j]) {
        j += 1;
    }
    j
}

fn matches_at(chars: &[char], i: usize, pat: &str) -> bool {
    let mut j = i;
    for p in pat.chars() {
        if chars.get(j) != Some(&p) {
            return false;
        }
        j += 1;
    }
    true
}

fn at_line_start(chars: &[char], i: usize) -> bool {
    let mut j = i;
    while j > 0 {
        let p = chars[j - 1];
        if p == '\n' {
            return true;
        }
        if !p.is_whitespace() {
            return false;
        }
        j -= 1;
    }
    true
}

/// Parses `DELIMITER <token>` at `i`; returns the token and the index after the line.
fn delimiter_directive(chars: &[char], i: usize) -> Option<(String, usize)> {
    let mut j = i;
    while j < chars.len() && chars[j].is_whitespace() && chars[j] != '\n' {
        j += 1;
    }
    let keyword = "DELIMITER";
    let end = j + keyword.len();
    if end > chars.len() {
        return None;
    }
    let word: String = chars[j..end].iter().collect();
    if !word.eq_ignore_ascii_case(keyword) || chars.get(end).map_or(true, |c| !c.is_whitespace()) {
        return None;
    }
    let mut line_end = end;
    while line_end < chars.len() && chars[line_end] != '\n' {
        line_end += 1;
    }
    let token: String = chars[end..line_end].iter().collect::<String>().trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some((token, (line_end + 1).min(chars.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let stmts = split_statements("DROP FUNCTION IF EXISTS f; SELECT 1;\n\nSELECT 'a;b';");
        assert_eq!(
            stmts,
            vec!["DROP FUNCTION IF EXISTS f", "SELECT 1", "SELECT 'a;b'"]
        );
    }

    #[test]
    fn keeps_compound_body_whole() {
        let src = r#"
DROP PROCEDURE IF EXISTS raise_salary;
CREATE PROCEDURE raise_salary(IN p_id INT, IN pct INT)
BEGIN
  DECLARE cur INT;
  IF pct > 0 THEN
    UPDATE emp SET salary = salary * (100 + pct) / 100 WHERE id = p_id;
  END IF;
  SELECT CASE WHEN pct > 10 THEN 'big' ELSE 'small' END AS size;
END;
SELECT 2;
"#;
        let stmts = split_statements(src);
        assert_eq!(stmts.len(), 3, "{stmts:#?}");
        assert!(stmts[1].starts_with("CREATE PROCEDURE raise_salary"));
        assert!(stmts[1].ends_with("END"));
        assert_eq!(stmts[2], "SELECT 2");
    }

    #[test]
    fn honours_delimiter_directive() {
        let src = "DELIMITER $$\nCREATE FUNCTION f() RETURNS INT\nBEGIN\n  RETURN 1;\nEND$$\nDELIMITER ;\nSELECT f();\n";
        let stmts = split_statements(src);
        assert_eq!(stmts.len(), 2, "{stmts:#?}");
        assert!(stmts[0].contains("RETURN 1;"));
        assert_eq!(stmts[1], "SELECT f()");
    }

    #[test]
    fn comment_only_fragments_are_dropped() {
        let stmts = split_statements("-- setup\n;\n/* nothing */;\nSELECT 1; -- trailing\n");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn end_case_statement_closes_case() {
        let src = "CREATE PROCEDURE p(x INT)\nBEGIN\n CASE x WHEN 1 THEN SELECT 1; ELSE SELECT 2; END CASE;\nEND;\nSELECT 3;";
        let stmts = split_statements(src);
        assert_eq!(stmts.len(), 2, "{stmts:#?}");
    }

    #[test]
    fn recognizes_declarations() {
        let d = routine_declaration("create function `get_bonus`(id INT) RETURNS INT").unwrap();
        assert_eq!(d.kind, RoutineKind::Function);
        assert_eq!(d.name, "get_bonus");

        let d = routine_declaration("DROP PROCEDURE IF EXISTS p;\nCREATE  PROCEDURE p()").unwrap();
        assert_eq!(d.kind, RoutineKind::Procedure);
        assert_eq!(d.name, "p");

        assert!(routine_declaration("SELECT 1").is_none());
    }

    #[test]
    fn flags_statements_that_end_the_transaction() {
        for stmt in [
            "COMMIT",
            "commit work",
            "-- done\nCOMMIT;",
            "ROLLBACK",
            "BEGIN",
            "begin transaction",
            "START TRANSACTION READ ONLY",
            "END",
            "SET autocommit=1",
            "SET SESSION autocommit = 0",
            "set @@session.autocommit=1",
            "LOCK TABLES emp WRITE",
            "XA START 'x'",
        ] {
            assert!(transaction_control(stmt).is_some(), "{stmt}");
        }
        assert_eq!(transaction_control("  /* c */ Commit").as_deref(), Some("COMMIT"));
    }

    #[test]
    fn ordinary_statements_are_not_transaction_control() {
        for stmt in [
            "SELECT 1",
            "ROLLBACK TO SAVEPOINT s1",
            "SAVEPOINT s1",
            "SET @x = 1",
            "UPDATE emp SET salary = 1",
            "CREATE PROCEDURE p() BEGIN SELECT 1; END",
            "SELECT * FROM commits",
            "",
        ] {
            assert_eq!(transaction_control(stmt), None, "{stmt}");
        }
    }

    #[test]
    fn recognizes_exported_declarations_with_definer() {
        let d = routine_declaration(
            "DELIMITER $$\nCREATE DEFINER=`root`@`%` PROCEDURE `raise_salary`(IN p INT)\nBEGIN END$$",
        )
        .unwrap();
        assert_eq!(d.kind, RoutineKind::Procedure);
        assert_eq!(d.name, "raise_salary");

        let d = routine_declaration("CREATE DEFINER = CURRENT_USER FUNCTION f() RETURNS INT RETURN 1")
            .unwrap();
        assert_eq!(d.name, "f");

        let d = routine_declaration("create function if not exists g() returns int return 1").unwrap();
        assert_eq!(d.name, "g");
    }
}
