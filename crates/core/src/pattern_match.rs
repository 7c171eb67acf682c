//! LIKE pattern matching used by filter expressions.
//!
//! Wildcards:
//! - `*` and `%` match zero or more characters
//!
//! A wildcard character wrapped in brackets (`[*]`, `[%]`, `[[]`) matches
//! itself. Matching operates on Unicode scalar values and folds case when the
//! owning table is case-insensitive.

/// LIKE pattern matching.
///
/// ```
/// use tabula_core::pattern_match::like;
/// assert!(like("hello", "h*o", true));
/// assert!(like("HELLO", "%ell%", false));
/// assert!(!like("hello", "world", true));
/// assert!(like("50%", "50[%]", true));
/// ```
pub fn like(value: &str, pattern: &str, case_sensitive: bool) -> bool {
    let fold = |s: &str| -> Vec<char> {
        if case_sensitive {
            s.chars().collect()
        } else {
            s.to_lowercase().chars().collect()
        }
    };
    let v = fold(value);
    let p = tokenize(&fold(pattern));
    like_recursive(&v, &p, 0, 0)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Any,
    Char(char),
}

fn tokenize(p: &[char]) -> Vec<Token> {
    let mut out = Vec::with_capacity(p.len());
    let mut i = 0;
    while i < p.len() {
        match p[i] {
            '*' | '%' => {
                // Consecutive wildcards collapse.
                if out.last() != Some(&Token::Any) {
                    out.push(Token::Any);
                }
                i += 1;
            }
            '[' if i + 2 < p.len() && p[i + 2] == ']' => {
                out.push(Token::Char(p[i + 1]));
                i += 3;
            }
            ch => {
                out.push(Token::Char(ch));
                i += 1;
            }
        }
    }
    out
}

fn like_recursive(v: &[char], p: &[Token], vi: usize, pi: usize) -> bool {
    if pi == p.len() {
        return vi == v.len();
    }
    match p[pi] {
        Token::Any => (vi..=v.len()).any(|skip| like_recursive(v, p, skip, pi + 1)),
        Token::Char(ch) => vi < v.len() && v[vi] == ch && like_recursive(v, p, vi + 1, pi + 1),
    }
}
