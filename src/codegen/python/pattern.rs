//! PostgreSQL regular expressions rewritten for Python's `re`
//!
//! Only constructs with a faithful Python spelling are translated. Anything
//! else (collating elements, equivalence classes, unknown escapes, embedded
//! directors) yields `None` and the caller leaves the check out.
//!
//! POSIX classes expand to their ASCII ranges.

/// Translate a `~` pattern, or `None` when there is no safe equivalent
pub(super) fn py_regex(pattern: &str) -> Option<String> {
    if pattern.starts_with("***") {
        return None;
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                out.push_str(&escape(*chars.get(i + 1)?)?);
                i += 2;
            }
            '[' => i = bracket(&chars, i, &mut out)?,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Some(out)
}

fn escape(c: char) -> Option<String> {
    let translated = match c {
        // word boundaries
        'm' | 'M' | 'y' => r"\b".to_string(),
        'Y' => r"\B".to_string(),
        'd' | 'D' | 's' | 'S' | 'w' | 'W' | 'A' | 'Z' | 'n' | 'r' | 't' | 'f' | 'v' => {
            format!("\\{}", c)
        }
        c if c.is_ascii_digit() => format!("\\{}", c),
        c if c.is_ascii_alphabetic() => return None,
        c => format!("\\{}", c),
    };
    Some(translated)
}

/// Copy the bracket expression opening at `start`; returns the index past it
fn bracket(chars: &[char], start: usize, out: &mut String) -> Option<usize> {
    let mut i = start + 1;
    out.push('[');
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        out.push_str(r"\]");
        i += 1;
    }

    loop {
        match *chars.get(i)? {
            ']' => {
                out.push(']');
                return Some(i + 1);
            }
            '[' => match chars.get(i + 1) {
                Some(':') => {
                    let name_start = i + 2;
                    let name_len = chars[name_start..]
                        .windows(2)
                        .position(|w| w == [':', ']'])?;
                    let name: String = chars[name_start..name_start + name_len].iter().collect();
                    out.push_str(posix_class(&name)?);
                    i = name_start + name_len + 2;
                }
                Some('.') | Some('=') => return None,
                _ => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            '\\' => {
                let next = *chars.get(i + 1)?;
                match next {
                    'd' | 'D' | 's' | 'S' | 'w' | 'W' | 'n' | 'r' | 't' | 'f' | 'v' => {
                        out.push('\\');
                        out.push(next);
                    }
                    c if c.is_ascii_alphanumeric() => return None,
                    c => {
                        out.push('\\');
                        out.push(c);
                    }
                }
                i += 2;
            }
            // doubled set operators warn in Python
            c @ ('&' | '~' | '|') => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
}

fn posix_class(name: &str) -> Option<&'static str> {
    let range = match name {
        "alpha" => "a-zA-Z",
        "digit" => "0-9",
        "alnum" => "a-zA-Z0-9",
        "upper" => "A-Z",
        "lower" => "a-z",
        "space" => r"\s",
        "blank" => r" \t",
        "xdigit" => "0-9A-Fa-f",
        "punct" => r"!-/:-@\[-`{-~",
        "word" => r"\w",
        "cntrl" => r"\x00-\x1f\x7f",
        _ => return None,
    };
    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_patterns_pass_through() {
        assert_eq!(py_regex("^[A-Z]{3}$").unwrap(), "^[A-Z]{3}$");
        assert_eq!(py_regex(r"^[^@]+@[^@]+\.[a-z]{2,}$").unwrap(), r"^[^@]+@[^@]+\.[a-z]{2,}$");
        assert_eq!(py_regex(r"^\d+(\.\d{1,2})?$").unwrap(), r"^\d+(\.\d{1,2})?$");
    }

    #[test]
    fn test_posix_classes_expand() {
        assert_eq!(py_regex("^[[:upper:]]{3}$").unwrap(), "^[A-Z]{3}$");
        assert_eq!(py_regex("^[[:alpha:][:digit:]_]+$").unwrap(), "^[a-zA-Z0-9_]+$");
        assert_eq!(py_regex("[^[:space:]]").unwrap(), r"[^\s]");
    }

    #[test]
    fn test_word_boundary_escapes() {
        assert_eq!(py_regex(r"\mfoo\M").unwrap(), r"\bfoo\b");
        assert_eq!(py_regex(r"\yx\Y").unwrap(), r"\bx\B");
    }

    #[test]
    fn test_literal_brackets_inside_sets() {
        assert_eq!(py_regex("[]a]").unwrap(), r"[\]a]");
        assert_eq!(py_regex("[[a]").unwrap(), r"[\[a]");
        assert_eq!(py_regex("[a&&b]").unwrap(), r"[a\&\&b]");
    }

    #[test]
    fn test_untranslatable_patterns() {
        assert!(py_regex("[[.hyphen.]]").is_none());
        assert!(py_regex("[[=e=]]").is_none());
        assert!(py_regex("[[:klingon:]]").is_none());
        assert!(py_regex(r"\e").is_none());
        assert!(py_regex("***=literal").is_none());
        assert!(py_regex("[abc").is_none());
        assert!(py_regex("trailing\\").is_none());
    }
}
