use crate::{Result, Value};
use std::{borrow::Cow, fmt, sync::Arc};

/// Conversion applied to a single column value on its way in (encode) or out
/// (parse) of the database. Pure by contract.
pub type ColumnCodec = fn(Value) -> Result<Value>;

/// Pure name-mapping function supplied by the collaborator layer, applied
/// only when a shape is resolved (logical key -> database column name).
pub type NameMapper = fn(&str) -> String;

/// One column a table, CTE or join exposes: database name, logical key and
/// the parse/encode pair used by the result pipeline and the value encoder.
#[derive(Clone)]
pub struct ShapeEntry {
    /// Column name as the database knows it.
    pub column: Cow<'static, str>,
    /// Logical key the collaborator layer addresses the column by.
    pub key: Cow<'static, str>,
    pub parse: Option<ColumnCodec>,
    pub encode: Option<ColumnCodec>,
}

impl ShapeEntry {
    pub fn new(key: impl Into<Cow<'static, str>>, column: impl Into<Cow<'static, str>>) -> Self {
        Self {
            column: column.into(),
            key: key.into(),
            parse: None,
            encode: None,
        }
    }

    pub fn with_parse(mut self, parse: ColumnCodec) -> Self {
        self.parse = Some(parse);
        self
    }

    pub fn with_encode(mut self, encode: ColumnCodec) -> Self {
        self.encode = Some(encode);
        self
    }
}

impl fmt::Debug for ShapeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeEntry")
            .field("column", &self.column)
            .field("key", &self.key)
            .field("parse", &self.parse.is_some())
            .field("encode", &self.encode.is_some())
            .finish()
    }
}

/// The ordered set of columns a source currently exposes.
///
/// Entries are shared, not copied: cloning a `Shape` (as join resolution does
/// when it propagates a joined source's columns) hands out the same entries
/// under reference counting, so joins borrow upstream definitions instead of
/// owning duplicates.
#[derive(Clone, Debug)]
pub struct Shape {
    entries: Arc<[ShapeEntry]>,
}

impl Shape {
    pub fn new(entries: impl IntoIterator<Item = ShapeEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Builds a shape from logical keys alone, deriving each database column
    /// name through the collaborator-supplied mapper.
    pub fn from_keys(
        keys: impl IntoIterator<Item = impl Into<Cow<'static, str>>>,
        mapper: NameMapper,
    ) -> Self {
        Self::new(keys.into_iter().map(|key| {
            let key = key.into();
            let column = mapper(&key);
            ShapeEntry::new(key, column)
        }))
    }

    pub fn entries(&self) -> &[ShapeEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks a column up by its logical key.
    pub fn by_key(&self, key: &str) -> Option<&ShapeEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Looks a column up by its database name.
    pub fn by_column(&self, column: &str) -> Option<&ShapeEntry> {
        self.entries.iter().find(|e| e.column == column)
    }
}

impl Default for Shape {
    fn default() -> Self {
        Self::new([])
    }
}

impl FromIterator<ShapeEntry> for Shape {
    fn from_iter<T: IntoIterator<Item = ShapeEntry>>(iter: T) -> Self {
        Self::new(iter)
    }
}
