use crate::PostgresSqlWriter;
use quarry_core::{CompileOptions, Driver};

pub struct PostgresDriver {
    options: CompileOptions,
}

impl PostgresDriver {
    pub const fn new(options: CompileOptions) -> Self {
        Self { options }
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Driver for PostgresDriver {
    type SqlWriter = PostgresSqlWriter;

    const NAME: &'static str = "postgres";

    fn sql_writer(&self) -> PostgresSqlWriter {
        PostgresSqlWriter::new()
    }

    fn compile_options(&self) -> CompileOptions {
        self.options
    }
}
