//! Graph-variable naming policy.

use once_cell::sync::Lazy;
use regex::Regex;

/// Names that collide with keywords of the generated native code.
pub const FORBIDDEN_NAMES: &[&str] = &[
    "", "alignas", "alignof", "and", "asm", "auto", "bitand", "bitor", "bool", "break",
    "case", "catch", "char", "class", "compl", "concept", "const", "consteval", "constexpr",
    "constinit", "continue", "decltype", "default", "delete", "directive", "do", "double",
    "else", "enum", "explicit", "export", "extern", "false", "float", "for", "friend",
    "goto", "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept", "not",
    "nullptr", "operator", "or", "private", "protected", "public", "register", "requires",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "template", "this",
    "throw", "true", "try", "typedef", "typeid", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "while", "xor", "std",
];

/// Prefix put in front of a synthesized name that happens to be forbidden.
pub const FORBIDDEN_PREFIX: &str = "__jace_forbidden_";

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("name pattern is valid"));

static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("sanitize pattern is valid"));

pub fn is_forbidden_name(name: &str) -> bool {
    FORBIDDEN_NAMES.contains(&name)
}

/// Identifier syntax check; says nothing about forbidden names.
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// The `counter`-th name of the sequence `a, b, ..., z, ba, bb, ...`.
pub fn propose_name(counter: usize) -> String {
    let mut digits = Vec::new();
    let mut rest = counter;
    loop {
        digits.push(b'a' + (rest % 26) as u8);
        rest /= 26;
        if rest == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Replaces every character that may not appear in an identifier by `_`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned = INVALID_CHARS.replace_all(name, "_").into_owned();
    match cleaned.chars().next() {
        Some(first) if first.is_ascii_digit() => format!("_{cleaned}"),
        None => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_sequence() {
        let names: Vec<String> = (0..30).map(propose_name).collect();
        assert_eq!(names[0], "a");
        assert_eq!(names[25], "z");
        assert_eq!(&names[26..], &["ba", "bb", "bc", "bd"]);
        assert_eq!(propose_name(26 * 26), "baa");
    }

    #[test]
    fn validity() {
        assert!(is_valid_name("_a1"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name("a-b"));
        assert!(is_forbidden_name("for"));
        assert!(is_forbidden_name(""));
        assert_eq!(sanitize_name("my.fun<lambda>"), "my_fun_lambda_");
    }
}
