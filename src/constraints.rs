//! Check-constraint inference
//!
//! Turns the free text of check-constraint clauses into [`SemanticConstraint`]
//! values. This is pattern matching over the clause text, not SQL parsing:
//! each rule family either recognises a clause shape or yields nothing, and a
//! clause no family recognises is skipped without error.
//!
//! Families are tried in a fixed order and the first one that matches claims
//! the clause:
//!
//! 1. range: `col >= N` and/or `col <= M`, in any order within the clause
//! 2. enum: `col IN ('a', 'b')` or the catalog's `col = ANY (ARRAY['a', 'b'])`
//! 3. length: `length(col) <= N`
//! 4. pattern: `col ~ 'regex'`
//!
//! Range rules accumulate: two single-bound clauses give two `Range` entries.
//! Enum, length and pattern keep the first clause that produces them.

use regex::Regex;
use tracing::{debug, trace};

use crate::schema::{Bound, SemanticConstraint};

const NUMBER: &str = r"\(?\s*'?(-?\d+(?:\.\d+)?)'?";
// start of text or a non-identifier character, then any opening parens;
// keeps `length(col)` from reading as a bare `col`
const BARE: &str = r"(?:^|[^\w(])\(*\s*";
const QUOTED: &str = r"'((?:[^']|'')*)'";
// list body up to the closing delimiter, skipping delimiters inside quotes
const IN_BODY: &str = r"((?:'(?:[^']|'')*'|[^')])*)";
const ARRAY_BODY: &str = r"((?:'(?:[^']|'')*'|[^'\]])*)";

/// Infer semantic constraints for one column from the clauses naming it
pub fn infer_constraints<S: AsRef<str>>(column: &str, clauses: &[S]) -> Vec<SemanticConstraint> {
    let rules = match RuleSet::for_column(column) {
        Some(rules) => rules,
        None => {
            debug!(column = ?column, "Could not build inference rules for column");
            return Vec::new();
        }
    };

    let mut found: Vec<SemanticConstraint> = Vec::new();
    for clause in clauses {
        let clause = clause.as_ref();
        let normalized = rules.normalize(clause);

        match rules.parse(&normalized) {
            Some(constraint) => {
                trace!(column = ?column, clause = ?clause, constraint = ?constraint, "Inferred constraint");
                if is_accumulating(&constraint) || !has_family(&found, &constraint) {
                    found.push(constraint);
                }
            }
            None => {
                debug!(column = ?column, clause = ?clause, "Skipping unrecognised check clause");
            }
        }
    }
    found
}

fn is_accumulating(constraint: &SemanticConstraint) -> bool {
    matches!(constraint, SemanticConstraint::Range { .. })
}

fn has_family(found: &[SemanticConstraint], constraint: &SemanticConstraint) -> bool {
    found
        .iter()
        .any(|c| std::mem::discriminant(c) == std::mem::discriminant(constraint))
}

/// Apply `f` to the text between single-quoted literals
///
/// A doubled quote inside a literal closes and reopens it, which leaves the
/// literal intact.
fn outside_quotes(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find('\'') {
            None => {
                out.push_str(&f(rest));
                return out;
            }
            Some(open) => {
                out.push_str(&f(&rest[..open]));
                let literal = &rest[open..];
                match literal[1..].find('\'') {
                    Some(close) => {
                        out.push_str(&literal[..close + 2]);
                        rest = &literal[close + 2..];
                    }
                    None => {
                        out.push_str(literal);
                        return out;
                    }
                }
            }
        }
    }
}

/// Compiled per-column patterns
struct RuleSet {
    casts: Regex,
    wrapped_column: Regex,
    lower_bound: Regex,
    upper_bound: Regex,
    in_list: Regex,
    any_array: Regex,
    length: Regex,
    pattern: Regex,
    quoted: Regex,
}

impl RuleSet {
    fn for_column(column: &str) -> Option<Self> {
        let col = format!(r#""?\b{}\b"?"#, regex::escape(column));
        let build = |pattern: String| Regex::new(&pattern).ok();

        Some(Self {
            casts: build(
                r"(?i)::\s*(?:character varying|double precision|bit varying|timestamp with(?:out)? time zone|time with(?:out)? time zone|[a-z_][a-z0-9_]*)(?:\s*\(\s*\d+(?:\s*,\s*\d+)?\s*\))?(?:\s*\[\])*"
                    .to_string(),
            )?,
            wrapped_column: build(format!(r"(?i)(^|[^\w])\(\s*({col})\s*\)"))?,
            lower_bound: build(format!(r"(?i){BARE}{col}\s*>=\s*{NUMBER}"))?,
            upper_bound: build(format!(r"(?i){BARE}{col}\s*<=\s*{NUMBER}"))?,
            in_list: build(format!(r"(?i){col}\s+IN\s*\({IN_BODY}\)"))?,
            any_array: build(format!(r"(?i){col}\s*=\s*ANY\s*\(+\s*ARRAY\s*\[{ARRAY_BODY}\]"))?,
            length: build(format!(
                r"(?i)\b(?:length|char_length|character_length)\s*\(\s*{col}\s*\)\s*<=\s*{NUMBER}"
            ))?,
            pattern: build(format!(r"(?i){col}\s*~\s*{QUOTED}"))?,
            quoted: build(QUOTED.to_string())?,
        })
    }

    /// Strip type casts and parentheses wrapped directly around the column
    ///
    /// Quoted literals pass through untouched.
    fn normalize(&self, clause: &str) -> String {
        outside_quotes(clause, |segment| {
            let mut text = self.casts.replace_all(segment, "").into_owned();
            loop {
                let next = self.wrapped_column.replace_all(&text, "${1}${2}").into_owned();
                if next == text {
                    return text;
                }
                text = next;
            }
        })
    }

    fn parse(&self, clause: &str) -> Option<SemanticConstraint> {
        self.parse_range(clause)
            .or_else(|| self.parse_enum(clause))
            .or_else(|| self.parse_length(clause))
            .or_else(|| self.parse_pattern(clause))
    }

    fn parse_range(&self, clause: &str) -> Option<SemanticConstraint> {
        let bound = |re: &Regex| -> Option<Bound> {
            re.captures(clause)
                .and_then(|caps| caps.get(1))
                .and_then(|m| Bound::parse(m.as_str()))
        };
        let min = bound(&self.lower_bound);
        let max = bound(&self.upper_bound);
        if min.is_none() && max.is_none() {
            return None;
        }
        Some(SemanticConstraint::Range { min, max })
    }

    fn parse_enum(&self, clause: &str) -> Option<SemanticConstraint> {
        let list = self
            .in_list
            .captures(clause)
            .or_else(|| self.any_array.captures(clause))?
            .get(1)?
            .as_str();

        let values: Vec<String> = self
            .quoted
            .captures_iter(list)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().replace("''", "'"))
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(SemanticConstraint::Enum(values))
        }
    }

    fn parse_length(&self, clause: &str) -> Option<SemanticConstraint> {
        let caps = self.length.captures(clause)?;
        let max: f64 = caps.get(1)?.as_str().parse().ok()?;
        if max < 0.0 || max.fract() != 0.0 {
            return None;
        }
        Some(SemanticConstraint::Length(max as u32))
    }

    fn parse_pattern(&self, clause: &str) -> Option<SemanticConstraint> {
        let caps = self.pattern.captures(clause)?;
        let regex = caps.get(1)?.as_str().replace("''", "'");
        Some(SemanticConstraint::Pattern(regex))
    }
}
