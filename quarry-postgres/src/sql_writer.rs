use quarry_core::SqlWriter;

/// The core's generic dialect already targets the extended-query protocol
/// with `$n` placeholders, so the Postgres writer adopts the defaults.
pub struct PostgresSqlWriter;

impl PostgresSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Default for PostgresSqlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlWriter for PostgresSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
