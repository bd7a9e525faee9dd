//! Sparse field patch builder.
//!
//! Turns a client-submitted JSON object into a minimal parameterized UPDATE
//! fragment, touching only attributes present in the input and listed in the
//! entity's mutable-attribute whitelist. Pure statement construction, no I/O.

use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::errors::AppError;

/// One mutable attribute: the name the API accepts and the column it maps to.
#[derive(Debug, Clone, Copy)]
pub struct MutableField {
    pub api_name: &'static str,
    pub column: &'static str,
}

/// A prepared sparse update: column assignments in whitelist order, each
/// bound to a positional parameter.
///
/// An explicit JSON `null` means "set to null"; an absent key means "leave
/// unchanged". Keys outside the whitelist are ignored, not rejected, so
/// newer clients can keep sending fields an older server does not know.
#[derive(Debug, Clone)]
pub struct FieldPatch {
    assignments: Vec<(&'static str, Value)>,
}

impl FieldPatch {
    /// Build a patch from the whitelist and a sparse input object.
    ///
    /// Fails with [`AppError::NoMutableFields`] when the input contributes
    /// zero whitelisted attributes; callers must report that as a client
    /// error rather than emit a no-op statement.
    pub fn from_input(
        whitelist: &[MutableField],
        input: &Map<String, Value>,
    ) -> Result<Self, AppError> {
        let assignments: Vec<(&'static str, Value)> = whitelist
            .iter()
            .filter_map(|field| {
                input
                    .get(field.api_name)
                    .map(|value| (field.column, value.clone()))
            })
            .collect();

        if assignments.is_empty() {
            return Err(AppError::NoMutableFields);
        }

        Ok(Self { assignments })
    }

    /// Columns touched by this patch, in whitelist order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.assignments.iter().map(|(column, _)| *column)
    }

    /// Render the `SET` fragment, e.g. `title = ?, scheduled_for = ?`.
    pub fn set_clause(&self) -> String {
        self.assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Bind the patch values, in the same order as [`set_clause`](Self::set_clause).
    ///
    /// Values pass through without coercion: numbers bind as numbers,
    /// strings as strings, `null` as SQL NULL. Arrays and objects bind as
    /// serialized JSON text, which is how list-valued columns are stored.
    pub fn bind_values<'q>(
        &'q self,
        mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        for (_, value) in &self.assignments {
            query = match value {
                Value::Null => query.bind(None::<String>),
                Value::Bool(b) => query.bind(*b as i32),
                Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
                Value::Number(n) => query.bind(n.as_f64()),
                Value::String(s) => query.bind(s.as_str()),
                other => query.bind(other.to_string()),
            };
        }
        query
    }

    #[cfg(test)]
    fn values(&self) -> Vec<&Value> {
        self.assignments.iter().map(|(_, value)| value).collect()
    }
}
