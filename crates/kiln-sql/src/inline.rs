//! Ephemeral model inlining
//!
//! Ephemeral models are never built. Every consumer gets their compiled
//! SQL spliced in as a named CTE instead.

use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

/// Prefix of the CTE name an ephemeral model is inlined under
pub const CTE_PREFIX: &str = "__kiln__cte__";

/// CTE name for the ephemeral model `name`
pub fn cte_name(name: &str) -> String {
    format!("{}{}", CTE_PREFIX, name)
}

/// `<cte name> as (\n<compiled sql>\n)`
pub fn cte_definition(name: &str, compiled_sql: &str) -> String {
    format!("{} as (\n{}\n)", cte_name(name), compiled_sql)
}

/// Where CTE definitions go in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Splice {
    /// The query has its own leading `with`, spanning these byte offsets
    ExistingWith { start: usize, end: usize },
    /// No `with`; definitions go before this byte offset
    Prepend { at: usize },
}

/// Prepend `ctes` (already formatted definitions, in order) to `sql`.
///
/// If `sql` opens with a `with` clause the definitions are spliced right
/// after the keyword and the original CTE list follows after a comma.
/// Otherwise a new `with` clause is put in front of the first token.
///
/// # Example
///
/// ```
/// use kiln_sql::inline::{cte_definition, inject_ctes};
///
/// let ctes = vec![cte_definition("stg", "select 1 as id")];
/// let sql = inject_ctes("select * from __kiln__cte__stg", &ctes);
/// assert_eq!(
///     sql,
///     "with __kiln__cte__stg as (\nselect 1 as id\n) select * from __kiln__cte__stg"
/// );
/// ```
pub fn inject_ctes(sql: &str, ctes: &[String]) -> String {
    if ctes.is_empty() {
        return sql.to_string();
    }
    let definitions = ctes.join(", ");
    match find_splice(sql) {
        Splice::ExistingWith { start, end } => format!(
            "{}with {}, {}",
            &sql[..start],
            definitions,
            sql[end..].trim_start()
        ),
        Splice::Prepend { at } => format!("{}with {} {}", &sql[..at], definitions, &sql[at..]),
    }
}

fn find_splice(sql: &str) -> Splice {
    match splice_from_tokens(sql) {
        Some(splice) => splice,
        None => {
            log::debug!("Tokenizer rejected query, scanning text for a leading with");
            splice_from_text(sql)
        }
    }
}

/// Look at the first significant token of the top-level statement
fn splice_from_tokens(sql: &str) -> Option<Splice> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .ok()?;
    let offsets = LineOffsets::new(sql);

    let mut first_token = None;
    for token in &tokens {
        if token.token == Token::EOF {
            break;
        }
        let start = offsets.byte_offset(
            sql,
            token.span.start.line as usize,
            token.span.start.column as usize,
        )?;
        match &token.token {
            Token::Whitespace(ws) => {
                if first_token.is_none() && !ws.to_string().trim().is_empty() {
                    // a comment is still the first token for insertion purposes
                    first_token = Some(start);
                }
            }
            Token::Word(word) if word.keyword == Keyword::WITH => {
                return Some(Splice::ExistingWith {
                    start,
                    end: start + word.value.len(),
                });
            }
            _ => {
                return Some(Splice::Prepend {
                    at: first_token.unwrap_or(start),
                })
            }
        }
    }
    Some(Splice::Prepend {
        at: first_token.unwrap_or(sql.len()),
    })
}

/// Fallback when the text does not tokenize: skip whitespace and comments
/// by hand.
fn splice_from_text(sql: &str) -> Splice {
    let mut rest = sql;
    let mut first_token = None;
    loop {
        let trimmed = rest.trim_start();
        let offset = sql.len() - trimmed.len();
        if let Some(comment) = trimmed.strip_prefix("--") {
            first_token.get_or_insert(offset);
            rest = comment.find('\n').map_or("", |i| &comment[i..]);
        } else if let Some(comment) = trimmed.strip_prefix("/*") {
            first_token.get_or_insert(offset);
            rest = comment.find("*/").map_or("", |i| &comment[i + 2..]);
        } else {
            let is_with = trimmed
                .get(..4)
                .is_some_and(|w| w.eq_ignore_ascii_case("with"))
                && trimmed[4..]
                    .chars()
                    .next()
                    .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
            if is_with {
                return Splice::ExistingWith {
                    start: offset,
                    end: offset + 4,
                };
            }
            return Splice::Prepend {
                at: first_token.unwrap_or(offset),
            };
        }
    }
}

/// Maps tokenizer line/column locations (1-based, columns in chars) to
/// byte offsets.
struct LineOffsets {
    starts: Vec<usize>,
}

impl LineOffsets {
    fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn byte_offset(&self, sql: &str, line: usize, column: usize) -> Option<usize> {
        let line_start = *self.starts.get(line.checked_sub(1)?)?;
        let line_text = &sql[line_start..];
        let within = line_text
            .char_indices()
            .nth(column.checked_sub(1)?)
            .map_or(line_text.len(), |(i, _)| i);
        Some(line_start + within)
    }
}

#[cfg(test)]
#[path = "inline_test.rs"]
mod tests;
