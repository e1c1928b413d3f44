//! Dialect selection and the per-dialect rendering rules.

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    SqlServer,
    Postgres,
    Sqlite,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::SqlServer
    }
}

impl Dialect {
    pub fn generator(&self) -> Box<dyn SqlDialect> {
        match self {
            Dialect::SqlServer => Box::new(SqlServerDialect),
            Dialect::Postgres => Box::new(PostgresDialect),
            Dialect::Sqlite => Box::new(SqliteDialect),
        }
    }
}

/// The dialect-specific pieces of text generation.
pub trait SqlDialect {
    /// Quote an identifier, escaping the closing quote character.
    fn quote(&self, identifier: &str) -> String;

    /// The placeholder for the parameter with this 1-based ordinal.
    fn placeholder(&self, ordinal: usize) -> String;

    /// Token placed between statements of a batch.
    fn batch_separator(&self) -> &'static str;

    fn bool_literal(&self, value: bool) -> &'static str;

    /// Whether row limits render as `TOP(n)`; otherwise `LIMIT`/`OFFSET`.
    fn uses_top(&self) -> bool;

    /// The aggregate used for 64-bit counting.
    fn count_big_function(&self) -> &'static str;

    fn length_function(&self) -> &'static str;
}

pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn quote(&self, identifier: &str) -> String {
        format!("[{}]", identifier.replace(']', "]]"))
    }

    fn placeholder(&self, ordinal: usize) -> String {
        format!("@p{}", ordinal)
    }

    fn batch_separator(&self) -> &'static str {
        "GO"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn uses_top(&self) -> bool {
        true
    }

    fn count_big_function(&self) -> &'static str {
        "COUNT_BIG"
    }

    fn length_function(&self) -> &'static str {
        "LEN"
    }
}

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn placeholder(&self, ordinal: usize) -> String {
        format!("${}", ordinal)
    }

    fn batch_separator(&self) -> &'static str {
        ";"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn uses_top(&self) -> bool {
        false
    }

    fn count_big_function(&self) -> &'static str {
        "COUNT"
    }

    fn length_function(&self) -> &'static str {
        "LENGTH"
    }
}

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn placeholder(&self, ordinal: usize) -> String {
        format!("?{}", ordinal)
    }

    fn batch_separator(&self) -> &'static str {
        ";"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn uses_top(&self) -> bool {
        false
    }

    fn count_big_function(&self) -> &'static str {
        "COUNT"
    }

    fn length_function(&self) -> &'static str {
        "LENGTH"
    }
}
