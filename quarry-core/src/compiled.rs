use crate::{Value, truncate_long};
use std::fmt::{self, Display};

/// SQL text plus its ordered parameter array, ready for the extended-query
/// protocol. Invariant: `values.len()` equals the number of distinct `$n`
/// placeholders in `text`.
#[derive(Debug, Clone, Default)]
pub struct CompiledSql {
    pub text: String,
    pub values: Vec<Value>,
}

impl CompiledSql {
    pub fn new(text: String, values: Vec<Value>) -> Self {
        let compiled = Self { text, values };
        debug_assert_eq!(
            compiled.placeholder_count(),
            compiled.values.len(),
            "placeholder count must match bound parameter count in {}",
            compiled.text,
        );
        compiled
    }

    /// Number of distinct `$n` placeholders in the text.
    pub fn placeholder_count(&self) -> usize {
        let bytes = self.text.as_bytes();
        let mut seen = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    let n: usize = self.text[start..end].parse().unwrap_or(0);
                    if n > 0 && !seen.contains(&n) {
                        seen.push(n);
                    }
                }
                i = end;
            } else {
                i += 1;
            }
        }
        seen.len()
    }
}

impl Display for CompiledSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", truncate_long!(self.text))
    }
}

impl From<&str> for CompiledSql {
    fn from(text: &str) -> Self {
        Self {
            text: text.into(),
            values: Vec::new(),
        }
    }
}

impl From<String> for CompiledSql {
    fn from(text: String) -> Self {
        Self {
            text,
            values: Vec::new(),
        }
    }
}

/// A compiled mutation: one statement, or the ordered batch an oversized
/// bulk operation was split into. Batch entries are independent statements,
/// each numbering its placeholders from `$1`.
#[derive(Debug, Clone)]
pub enum Compiled {
    Single(CompiledSql),
    Batch(Vec<CompiledSql>),
}

impl Compiled {
    pub fn statements(&self) -> &[CompiledSql] {
        match self {
            Compiled::Single(sql) => std::slice::from_ref(sql),
            Compiled::Batch(batch) => batch,
        }
    }

    pub fn into_statements(self) -> Vec<CompiledSql> {
        match self {
            Compiled::Single(sql) => vec![sql],
            Compiled::Batch(batch) => batch,
        }
    }
}

impl From<CompiledSql> for Compiled {
    fn from(sql: CompiledSql) -> Self {
        Compiled::Single(sql)
    }
}
