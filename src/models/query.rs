//! Query-related data models.
//!
//! This module defines statement parameters and query results.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data, `{"$bytes": "<base64>"}` in JSON
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Parse a CLI-style literal: `null`, `true`/`false`, integers, floats, else text.
    pub fn parse_literal(s: &str) -> Self {
        if s.eq_ignore_ascii_case("null") {
            Self::Null
        } else if s.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if s.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Ok(v) = s.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::String(s.to_string())
        }
    }
}

macro_rules! impl_from_param {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for QueryParam {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )+
    };
}

impl_from_param!(
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
);

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Binary data as a tagged base64 object.
///
/// A bare base64 string would deserialize as `QueryParam::String`, so bytes
/// are wrapped in `{"$bytes": "..."}` to survive a round trip.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        #[serde(rename = "$bytes")]
        bytes: String,
    }

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Tagged {
            bytes: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tagged = Tagged::deserialize(deserializer)?;
        STANDARD
            .decode(&tagged.bytes)
            .map_err(serde::de::Error::custom)
    }
}

/// One set of bound parameters.
///
/// `Positional` values bind to the backend's native placeholders (`$1` for
/// PostgreSQL, `?` for MySQL and SQLite). `Named` values bind to `:name`
/// placeholders, which are rewritten before the statement is sent.
///
/// Adding a named value to a non-empty positional set (or the reverse)
/// yields `Mixed`, which keeps every value but is rejected when the
/// statement is prepared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamSet {
    Positional(Vec<QueryParam>),
    Named(BTreeMap<String, QueryParam>),
    #[serde(skip)]
    Mixed {
        positional: Vec<QueryParam>,
        named: BTreeMap<String, QueryParam>,
    },
}

impl ParamSet {
    /// An empty named parameter set.
    pub fn named() -> Self {
        Self::Named(BTreeMap::new())
    }

    /// An empty positional parameter set.
    pub fn positional() -> Self {
        Self::Positional(Vec::new())
    }

    /// Add a named value. An empty positional set becomes named.
    pub fn with(self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        let (name, value) = (name.into(), value.into());
        match self {
            Self::Positional(values) if values.is_empty() => {
                Self::Named(BTreeMap::from([(name, value)]))
            }
            Self::Positional(positional) => Self::Mixed {
                positional,
                named: BTreeMap::from([(name, value)]),
            },
            Self::Named(mut map) => {
                map.insert(name, value);
                Self::Named(map)
            }
            Self::Mixed {
                positional,
                mut named,
            } => {
                named.insert(name, value);
                Self::Mixed { positional, named }
            }
        }
    }

    /// Append a positional value. An empty named set becomes positional.
    pub fn push(self, value: impl Into<QueryParam>) -> Self {
        let value = value.into();
        match self {
            Self::Named(map) if map.is_empty() => Self::Positional(vec![value]),
            Self::Named(named) => Self::Mixed {
                positional: vec![value],
                named,
            },
            Self::Positional(mut values) => {
                values.push(value);
                Self::Positional(values)
            }
            Self::Mixed {
                mut positional,
                named,
            } => {
                positional.push(value);
                Self::Mixed { positional, named }
            }
        }
    }

    /// True when positional and named values were combined.
    pub fn is_mixed(&self) -> bool {
        matches!(self, Self::Mixed { .. })
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(map) => map.len(),
            Self::Mixed { positional, named } => positional.len() + named.len(),
        }
    }

    /// Check if no values are bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<QueryParam>> for ParamSet {
    fn from(values: Vec<QueryParam>) -> Self {
        Self::Positional(values)
    }
}

impl From<BTreeMap<String, QueryParam>> for ParamSet {
    fn from(map: BTreeMap<String, QueryParam>) -> Self {
        Self::Named(map)
    }
}

/// SQL text bundled with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamSet>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: None,
        }
    }

    /// Bind a named parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        let params = self.params.take().unwrap_or_else(ParamSet::named);
        self.params = Some(params.with(name, value));
        self
    }

    /// Bind the next positional parameter.
    pub fn push(mut self, value: impl Into<QueryParam>) -> Self {
        let params = self.params.take().unwrap_or_else(ParamSet::positional);
        self.params = Some(params.push(value));
        self
    }

    /// Replace all parameters.
    pub fn with_params(mut self, params: ParamSet) -> Self {
        self.params = Some(params);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "INT8", "VARCHAR", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Every row produced by one statement execution, in database order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<JsonValue>>,
    pub rows_affected: u64,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty result.
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: 0,
            execution_time_ms,
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value at `row` for the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&JsonValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Iterate over the values of one column.
    pub fn column_values<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a JsonValue> + 'a {
        let idx = self.column_index(column);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec![
                ColumnMetadata::new("first_name", "TEXT"),
                ColumnMetadata::new("last_name", "TEXT"),
            ],
            rows: vec![
                vec![json!("Bob"), json!("Smith")],
                vec![json!("Ann"), json!("Lee")],
            ],
            rows_affected: 0,
            execution_time_ms: 3,
        }
    }

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(
            QueryParam::String("hello".to_string()).type_name(),
            "string"
        );
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(QueryParam::from(Some("x")), QueryParam::String("x".into()));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(QueryParam::parse_literal("NULL"), QueryParam::Null);
        assert_eq!(QueryParam::parse_literal("true"), QueryParam::Bool(true));
        assert_eq!(QueryParam::parse_literal("6"), QueryParam::Int(6));
        assert_eq!(QueryParam::parse_literal("2.5"), QueryParam::Float(2.5));
        assert_eq!(
            QueryParam::parse_literal("Bob"),
            QueryParam::String("Bob".to_string())
        );
    }

    #[test]
    fn test_param_set_builders() {
        let named = ParamSet::named().with("x", 1).with("y", 4);
        assert_eq!(named.len(), 2);
        assert!(matches!(named, ParamSet::Named(_)));

        let positional = ParamSet::positional().push(1).push("a");
        assert_eq!(positional.len(), 2);
        assert!(matches!(positional, ParamSet::Positional(_)));

        // Mixing keeps every value; prepare rejects the set later
        let mixed = ParamSet::named().with("x", 1).push(2);
        assert_eq!(mixed.len(), 2);
        assert!(mixed.is_mixed());

        let mixed = ParamSet::positional().push(1).with("y", 2).push(3);
        match mixed {
            ParamSet::Mixed { positional, named } => {
                assert_eq!(positional, vec![QueryParam::Int(1), QueryParam::Int(3)]);
                assert_eq!(named.get("y"), Some(&QueryParam::Int(2)));
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_statement_push_then_bind_keeps_both() {
        let stmt = Statement::new("SELECT ?, :y").push(1).bind("y", 2);
        let params = stmt.params.unwrap();
        assert_eq!(params.len(), 2);
        assert!(params.is_mixed());
    }

    #[test]
    fn test_bytes_json_round_trip() {
        let param = QueryParam::Bytes(vec![1, 2]);
        let value = serde_json::to_value(&param).unwrap();
        assert_eq!(value, json!({"$bytes": "AQI="}));
        let back: QueryParam = serde_json::from_value(value).unwrap();
        assert_eq!(back, param);

        let set: ParamSet =
            serde_json::from_value(json!({"data": {"$bytes": "AQI="}, "s": "AQI="})).unwrap();
        match set {
            ParamSet::Named(map) => {
                assert_eq!(map.get("data"), Some(&QueryParam::Bytes(vec![1, 2])));
                assert_eq!(map.get("s"), Some(&QueryParam::String("AQI=".into())));
            }
            other => panic!("unexpected params: {:?}", other),
        }

        let positional = ParamSet::Positional(vec![QueryParam::Bytes(vec![0xff]), 3.into()]);
        let text = serde_json::to_string(&positional).unwrap();
        assert_eq!(serde_json::from_str::<ParamSet>(&text).unwrap(), positional);
    }

    #[test]
    fn test_param_set_deserialize() {
        let named: ParamSet = serde_json::from_value(json!({"x": 1, "y": "a"})).unwrap();
        assert!(matches!(named, ParamSet::Named(_)));
        let positional: ParamSet = serde_json::from_value(json!([1, null, true])).unwrap();
        assert_eq!(
            positional,
            ParamSet::Positional(vec![
                QueryParam::Int(1),
                QueryParam::Null,
                QueryParam::Bool(true)
            ])
        );
    }

    #[test]
    fn test_statement_bind() {
        let stmt = Statement::new("SELECT x, y FROM some_table WHERE y > :y").bind("y", 6);
        match stmt.params {
            Some(ParamSet::Named(map)) => assert_eq!(map.get("y"), Some(&QueryParam::Int(6))),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_query_result_lookup() {
        let result = sample();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column_index("last_name"), Some(1));
        assert_eq!(result.get(0, "first_name"), Some(&json!("Bob")));
        assert_eq!(result.get(5, "first_name"), None);
        assert_eq!(result.get(0, "missing"), None);
        let firsts: Vec<_> = result.column_values("first_name").collect();
        assert_eq!(firsts, vec![&json!("Bob"), &json!("Ann")]);
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty(10);
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert_eq!(result.rows_affected, 0);
    }
}
