use std::env;
use std::sync::OnceLock;

/// Capacity of each per-stage translation cache when `JACE_CACHE_SIZE` is unset.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Backend used by `jit` when neither the caller nor `JACE_BACKEND` picks one.
pub const DEFAULT_BACKEND: &str = "cpu";

static JACE_CACHE_SIZE: OnceLock<usize> = OnceLock::new();
static JACE_BACKEND: OnceLock<String> = OnceLock::new();
static JACE_VALIDATE_EACH_EQUATION: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_capacity(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|size| *size > 0)
}

pub(crate) fn cache_capacity() -> usize {
    *JACE_CACHE_SIZE.get_or_init(|| match env::var("JACE_CACHE_SIZE") {
        Ok(value) => parse_capacity(&value).unwrap_or_else(|| {
            log::warn!("ignoring invalid JACE_CACHE_SIZE={value:?}");
            DEFAULT_CACHE_CAPACITY
        }),
        Err(_) => DEFAULT_CACHE_CAPACITY,
    })
}

pub(crate) fn default_backend() -> &'static str {
    JACE_BACKEND.get_or_init(|| match env::var("JACE_BACKEND") {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => DEFAULT_BACKEND.to_string(),
    })
}

pub(crate) fn validate_each_equation() -> bool {
    *JACE_VALIDATE_EACH_EQUATION.get_or_init(|| match env::var("JACE_VALIDATE_EACH_EQUATION") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_spellings() {
        for value in ["1", "true", " YES ", "on"] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "off", "nope"] {
            assert!(!parse_bool(value), "{value}");
        }
    }

    #[test]
    fn capacity_rejects_zero_and_garbage() {
        assert_eq!(parse_capacity("12"), Some(12));
        assert_eq!(parse_capacity("0"), None);
        assert_eq!(parse_capacity("many"), None);
    }
}
