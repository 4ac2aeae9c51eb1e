//! Shell-style glob patterns for table filters.
//!
//! Patterns are translated into anchored, case-insensitive regular
//! expressions. Supported syntax: `*`, `?`, `[abc]`, `[a-z]`, `[!abc]`,
//! `{alt1,alt2}` and `\` escapes.

use crate::{Result, error::DumpError};
use regex::Regex;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compiles a glob pattern.
    ///
    /// # Errors
    /// Returns a configuration error for unterminated classes, braces, or a
    /// trailing escape.
    ///
    /// # Example
    /// ```rust
    /// use anondump_core::glob::Glob;
    ///
    /// let glob = Glob::new("audit_*").unwrap();
    /// assert!(glob.matches("AUDIT_LOG"));
    /// assert!(!glob.matches("users"));
    /// ```
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = translate(pattern)?;
        let regex = Regex::new(&format!("(?i)^{}$", translated)).map_err(|e| {
            DumpError::configuration(format!("invalid glob '{}': {}", pattern, e))
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Returns true if the whole name matches, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl std::fmt::Display for Glob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn translate(pattern: &str) -> Result<String> {
    let invalid = |reason: &str| {
        DumpError::configuration(format!("invalid glob '{}': {}", pattern, reason))
    };

    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();
    let mut brace_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                let escaped = chars.next().ok_or_else(|| invalid("trailing escape"))?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                let mut first = true;
                while let Some(inner) = chars.next() {
                    match inner {
                        // A leading `]` is a literal member of the class.
                        ']' if !first => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            let escaped =
                                chars.next().ok_or_else(|| invalid("trailing escape"))?;
                            out.push('\\');
                            out.push(escaped);
                        }
                        '-' => out.push('-'),
                        '[' | ']' | '^' | '&' | '~' => {
                            out.push('\\');
                            out.push(inner);
                        }
                        other => out.push(other),
                    }
                    first = false;
                }
                if !closed {
                    return Err(invalid("unterminated character class"));
                }
                out.push(']');
            }
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            ',' if brace_depth > 0 => out.push('|'),
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    if brace_depth > 0 {
        return Err(invalid("unterminated alternation"));
    }

    Ok(out)
}
