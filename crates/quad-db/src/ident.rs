//! Identifier handling for dynamically built statements

use quad_core::{Error, Result};
use std::fmt;

pub const DEFAULT_SCHEMA: &str = "public";

/// Double-quote an identifier, doubling any embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A table addressed as `table` or `schema.table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Every table an unchecked string may address, most specific first.
    ///
    /// `a.b` is table `b` in schema `a`, then a table literally named `a.b`
    /// in `public`. Unqualified names live in `public`.
    pub fn candidates(raw: &str) -> Result<Vec<Self>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::validation("Table name is required"));
        }

        let whole = Self::new(DEFAULT_SCHEMA, raw);
        match raw.split_once('.') {
            Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
                Ok(vec![Self::new(schema, name), whole])
            }
            _ => Ok(vec![whole]),
        }
    }

    /// Quoted `"schema"."table"` form for interpolation
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}
