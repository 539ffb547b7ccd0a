//! Query filters over top-level document fields

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Field equals the given JSON value
    Eq { field: String, value: Value },
    /// Field is present and not JSON null
    NotNull { field: String },
    /// String field matches one of the values, ignoring ASCII case
    InIgnoreCase { field: String, values: Vec<String> },
}

impl Clause {
    fn matches(&self, body: &Value) -> bool {
        match self {
            Clause::Eq { field, value } => body.get(field) == Some(value),
            Clause::NotNull { field } => body.get(field).is_some_and(|v| !v.is_null()),
            Clause::InIgnoreCase { field, values } => body
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s.to_ascii_lowercase())
                .is_some_and(|s| values.iter().any(|v| *v == s)),
        }
    }
}

/// Conjunction of clauses; an empty filter matches everything
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn not_null(mut self, field: &str) -> Self {
        self.clauses.push(Clause::NotNull {
            field: field.to_string(),
        });
        self
    }

    pub fn in_ignore_case<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.clauses.push(Clause::InIgnoreCase {
            field: field.to_string(),
            values: values
                .into_iter()
                .map(|v| v.as_ref().to_ascii_lowercase())
                .collect(),
        });
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn matches(&self, body: &Value) -> bool {
        self.clauses.iter().all(|c| c.matches(body))
    }
}
