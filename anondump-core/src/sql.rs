//! MySQL literal escaping and statement assembly.

/// Backslash sequence MySQL expects for a byte inside a quoted literal.
///
/// Every escaped byte is ASCII, so escaping works byte by byte on any
/// encoding the column uses.
fn escape_sequence(byte: u8) -> Option<&'static str> {
    match byte {
        b'\0' => Some(r"\0"),
        b'\n' => Some(r"\n"),
        b'\r' => Some(r"\r"),
        b'\\' => Some(r"\\"),
        b'\'' => Some(r"\'"),
        b'"' => Some(r#"\""#),
        0x1a => Some(r"\Z"),
        _ => None,
    }
}

/// Escapes a string for use inside a single-quoted MySQL literal.
///
/// # Example
/// ```rust
/// use anondump_core::sql::escape;
///
/// assert_eq!(escape("it's\n"), r"it\'s\n");
/// ```
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match u8::try_from(c).ok().and_then(escape_sequence) {
            Some(sequence) => out.push_str(sequence),
            None => out.push(c),
        }
    }
    out
}

/// Escapes raw cell bytes for use inside a single-quoted MySQL literal.
///
/// Bytes that are not valid UTF-8 pass through untouched, so the server
/// reads back exactly the stored value.
///
/// ```rust
/// use anondump_core::sql::escape_bytes;
///
/// assert_eq!(escape_bytes(&[b'A', 0xff, b'\'']), b"A\xff\\'".to_vec());
/// ```
pub fn escape_bytes(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 8);
    for &byte in value {
        match escape_sequence(byte) {
            Some(sequence) => out.extend_from_slice(sequence.as_bytes()),
            None => out.push(byte),
        }
    }
    out
}

/// Escapes and single-quotes a string.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape(value))
}

/// Escapes and single-quotes raw bytes.
pub fn quote_bytes(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 10);
    out.push(b'\'');
    out.extend_from_slice(&escape_bytes(value));
    out.push(b'\'');
    out
}

/// Renders raw bytes as `UNHEX('..')` with lower-case hex digits.
pub fn hex_literal(bytes: &[u8]) -> String {
    format!("UNHEX('{}')", hex::encode(bytes))
}

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Header of an extended INSERT statement, without rows.
///
/// ```rust
/// use anondump_core::sql::insert_statement;
///
/// let columns = vec!["id".to_string(), "name".to_string()];
/// assert_eq!(
///     insert_statement("users", &columns),
///     "INSERT INTO `users` (`id`, `name`) VALUES"
/// );
/// ```
pub fn insert_statement(table: &str, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES",
        quote_identifier(table),
        columns
    )
}

/// Renders one row tuple from already formatted values.
pub fn row_tuple(values: &[Vec<u8>]) -> Vec<u8> {
    let mut tuple = Vec::with_capacity(values.iter().map(|v| v.len() + 2).sum::<usize>() + 2);
    tuple.push(b'(');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            tuple.extend_from_slice(b", ");
        }
        tuple.extend_from_slice(value);
    }
    tuple.push(b')');
    tuple
}

/// Renders a full INSERT statement from a header and row tuples.
///
/// Rows are separated by `,\n` and the statement ends with `;\n`.
pub fn insert_batch(header: &str, rows: &[Vec<u8>]) -> Vec<u8> {
    let mut statement =
        Vec::with_capacity(header.len() + rows.iter().map(|r| r.len() + 2).sum::<usize>() + 2);
    statement.extend_from_slice(header.as_bytes());
    statement.push(b'\n');
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            statement.extend_from_slice(b",\n");
        }
        statement.extend_from_slice(row);
    }
    statement.extend_from_slice(b";\n");
    statement
}
