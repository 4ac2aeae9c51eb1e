//! Rendering of fetched cells as SQL literals.

use crate::faker::{FakerService, parser::FAKER_PREFIX};
use crate::sql::{hex_literal, quote_bytes};

/// Renders raw cell values for one table.
#[derive(Debug, Clone, Copy)]
pub struct ValueFormatter {
    faker: FakerService,
    hex_encode: bool,
}

impl ValueFormatter {
    /// Creates a formatter. With `hex_encode` binary columns are written as
    /// `UNHEX('..')`.
    pub fn new(faker: FakerService, hex_encode: bool) -> Self {
        Self { faker, hex_encode }
    }

    /// Renders one cell as literal bytes.
    ///
    /// Cell bytes are escaped as stored, whatever their encoding. Text that
    /// is a faker expression is replaced by a generated value. An expression
    /// that fails to evaluate is kept as-is so the row is still emitted.
    pub fn render(&self, value: Option<&[u8]>, binary: bool) -> Vec<u8> {
        let Some(bytes) = value else {
            return b"NULL".to_vec();
        };

        if self.hex_encode && binary {
            return hex_literal(bytes).into_bytes();
        }

        if bytes.starts_with(FAKER_PREFIX.as_bytes())
            && let Ok(text) = std::str::from_utf8(bytes)
        {
            match self.faker.replace_when_requested(text) {
                Ok(generated) => return quote_bytes(generated.as_bytes()),
                Err(e) => {
                    tracing::debug!("Keeping unevaluated faker expression '{}': {}", text, e);
                }
            }
        }

        quote_bytes(bytes)
    }
}
