// ABOUTME: Dollar-rooted path expressions over JSON payloads
// ABOUTME: Parses selectors like $.a.b[0]['key'] and resolves them against a Value

use serde_json::Value;

use super::error::{ExprError, Result};

/// A single segment of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathPart {
    Field(String),
    Index(usize),
}

/// A compiled path expression, rooted at `$`.
///
/// Supported forms: `$`, `$.field`, `$.a.b`, `$[0]`, `$['key']` and chains
/// of those. `$` alone selects the whole payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    raw: String,
    parts: Vec<PathPart>,
}

impl PathExpr {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        let rest = raw.strip_prefix('$').ok_or_else(|| ExprError::InvalidPath {
            path: raw.to_string(),
            reason: "path must start with '$'".to_string(),
        })?;

        let invalid = |reason: &str| ExprError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '.' => {
                    let mut field = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        field.push(c);
                        chars.next();
                    }
                    if field.is_empty() {
                        return Err(invalid("empty field name after '.'"));
                    }
                    parts.push(PathPart::Field(field));
                }
                '[' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(invalid("unclosed '['"));
                    }
                    let inner = inner.trim();
                    if (inner.starts_with('\'') && inner.ends_with('\'') && inner.len() >= 2)
                        || (inner.starts_with('"') && inner.ends_with('"') && inner.len() >= 2)
                    {
                        parts.push(PathPart::Field(inner[1..inner.len() - 1].to_string()));
                    } else if let Ok(index) = inner.parse::<usize>() {
                        parts.push(PathPart::Index(index));
                    } else {
                        return Err(invalid("bracket segment must be an index or quoted key"));
                    }
                }
                _ => return Err(invalid("expected '.' or '[' after '$'")),
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the path against a JSON payload.
    pub fn lookup<'v>(&self, root: &'v Value) -> Result<&'v Value> {
        let mut current = root;
        for part in &self.parts {
            current = match part {
                PathPart::Field(name) => current.get(name.as_str()),
                PathPart::Index(i) => current.get(*i),
            }
            .ok_or_else(|| ExprError::PathNotFound {
                path: self.raw.clone(),
            })?;
        }
        Ok(current)
    }
}
