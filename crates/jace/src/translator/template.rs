use std::collections::BTreeMap;
use std::fmt;

use crate::error::{JaceError, JaceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Slot(String),
}

/// Tasklet expression with named `{slot}` placeholders.
///
/// Rendering replaces each placeholder by its bound text and leaves everything else
/// untouched, so binding `in1` can never rewrite part of `in10`. `{{` and `}}` stand for
/// literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskletTemplate {
    text: String,
    bindings: BTreeMap<String, String>,
}

impl TaskletTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bindings: BTreeMap::new(),
        }
    }

    /// Binds `slot` to `value`, replacing an earlier binding.
    pub fn bind(mut self, slot: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(slot.into(), value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder names in order of appearance, repeats included.
    pub fn slots(&self) -> JaceResult<Vec<String>> {
        Ok(self
            .parse()?
            .into_iter()
            .filter_map(|piece| match piece {
                Piece::Slot(name) => Some(name),
                Piece::Text(_) => None,
            })
            .collect())
    }

    pub fn render(&self) -> JaceResult<String> {
        let mut out = String::with_capacity(self.text.len());
        for piece in self.parse()? {
            match piece {
                Piece::Text(text) => out.push_str(&text),
                Piece::Slot(name) => {
                    let value = self.bindings.get(&name).ok_or_else(|| {
                        JaceError::invariant(format!(
                            "tasklet template `{}` has no binding for '{{{name}}}'",
                            self.text
                        ))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    fn parse(&self) -> JaceResult<Vec<Piece>> {
        let malformed = |why: &str| {
            JaceError::invariant(format!("malformed tasklet template `{}`: {why}", self.text))
        };
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut chars = self.text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                            Some(c) => return Err(malformed(&format!("'{c}' inside a placeholder"))),
                            None => return Err(malformed("unterminated placeholder")),
                        }
                    }
                    if name.is_empty() {
                        return Err(malformed("empty placeholder"));
                    }
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(Piece::Slot(name));
                }
                '}' => return Err(malformed("unmatched '}'")),
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok(pieces)
    }
}

impl fmt::Display for TaskletTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_does_not_touch_longer_names() {
        let tmpl = TaskletTemplate::new("({in1})+({in10})")
            .bind("in1", "2.0")
            .bind("in10", "__in10");
        assert_eq!(tmpl.render().unwrap(), "(2.0)+(__in10)");
        assert_eq!(tmpl.slots().unwrap(), vec!["in1", "in10"]);
    }

    #[test]
    fn missing_binding_is_an_error() {
        let err = TaskletTemplate::new("({in0})**({y})")
            .bind("in0", "__in0")
            .render()
            .unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn escaped_braces_and_malformed_input() {
        let tmpl = TaskletTemplate::new("{{{in0}}}").bind("in0", "x");
        assert_eq!(tmpl.render().unwrap(), "{x}");
        assert!(TaskletTemplate::new("({in0)").render().is_err());
        assert!(TaskletTemplate::new("a}b").render().is_err());
    }
}
