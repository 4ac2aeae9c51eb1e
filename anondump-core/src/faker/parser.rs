//! Parser for `faker.Call(args)` and `faker.Namespace().Method(args)`.

use super::FakerError;

/// Prefix every anonymization expression starts with.
pub const FAKER_PREFIX: &str = "faker";

/// Calls that are never dispatched, whatever the registry offers.
pub const DENYLIST: &[&str] = &["ContactInfo"];

/// One call of an expression: a name and its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub args: Vec<String>,
}

/// A parsed anonymization expression, at most two calls deep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub root: Call,
    pub chained: Option<Call>,
}

impl Expression {
    /// Display path such as `Person.Name`.
    pub fn path(&self) -> String {
        match &self.chained {
            Some(chained) => format!("{}.{}", self.root.name, chained.name),
            None => self.root.name.clone(),
        }
    }
}

/// Parses an expression.
///
/// # Errors
/// Returns a `FakerError` describing the first malformed part.
///
/// # Example
/// ```rust
/// use anondump_core::faker::parser::parse;
///
/// let expr = parse("faker.Lorem().Words(3)").unwrap();
/// assert_eq!(expr.root.name, "Lorem");
/// assert_eq!(expr.chained.unwrap().args, vec!["3"]);
/// ```
pub fn parse(input: &str) -> Result<Expression, FakerError> {
    let input = input.trim();
    let Some(rest) = input.strip_prefix(FAKER_PREFIX) else {
        return Err(FakerError::MissingPrefix(input.to_string()));
    };

    let mut cursor = Cursor {
        input,
        position: FAKER_PREFIX.len(),
    };
    if rest.is_empty() {
        return Err(FakerError::MissingCall(input.to_string()));
    }

    let mut calls = Vec::with_capacity(2);
    while cursor.peek().is_some() {
        match cursor.peek() {
            Some('.') => cursor.bump(),
            Some(found) if calls.is_empty() => {
                return Err(FakerError::UnexpectedCharacter {
                    found,
                    position: cursor.position,
                });
            }
            Some(_) => return Err(FakerError::TrailingInput(cursor.remaining().to_string())),
            None => break,
        }
        if calls.len() == 2 {
            return Err(FakerError::TooManyCalls(input.to_string()));
        }
        calls.push(cursor.call()?);
    }

    let mut calls = calls.into_iter();
    let Some(root) = calls.next() else {
        return Err(FakerError::MissingCall(input.to_string()));
    };
    let chained = calls.next();

    for call in std::iter::once(&root).chain(chained.as_ref()) {
        if DENYLIST.contains(&call.name.as_str()) {
            return Err(FakerError::Denied(call.name.clone()));
        }
    }

    Ok(Expression { root, chained })
}

struct Cursor<'a> {
    input: &'a str,
    position: usize,
}

impl Cursor<'_> {
    fn remaining(&self) -> &str {
        &self.input[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn call(&mut self) -> Result<Call, FakerError> {
        let input = self.input;
        let start = self.position;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let name = &input[start..self.position];

        match self.peek() {
            Some('(') if name.is_empty() => {
                return Err(FakerError::EmptyName { position: start });
            }
            Some('(') => {}
            None if name.is_empty() => return Err(FakerError::EmptyName { position: start }),
            None | Some('.') => {
                return Err(FakerError::UnbalancedParentheses {
                    name: name.to_string(),
                });
            }
            Some(found) => {
                return Err(FakerError::UnexpectedCharacter {
                    found,
                    position: self.position,
                });
            }
        }
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(FakerError::InvalidName(name.to_string()));
        }

        self.bump();
        let args_start = self.position;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.peek() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                (None, _) => {}
            }
            self.bump();
        }

        if quote.is_some() {
            return Err(FakerError::UnbalancedQuotes {
                name: name.to_string(),
            });
        }
        if depth != 0 {
            return Err(FakerError::UnbalancedParentheses {
                name: name.to_string(),
            });
        }

        let args = split_args(&input[args_start..self.position]);
        self.bump();

        Ok(Call {
            name: name.to_string(),
            args,
        })
    }
}

/// Splits on commas outside quotes; surrounding whitespace and quotes are stripped.
fn split_args(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ',') => args.push(clean_arg(&std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    args.push(clean_arg(&current));
    args
}

fn clean_arg(raw: &str) -> String {
    let trimmed = raw.trim();
    for q in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(q) && trimmed.ends_with(q) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}
