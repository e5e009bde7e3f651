use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A PuppetDB AST query.
///
/// Serializes to the nested-array form accepted by the `query` parameter of
/// the `/pdb/query/v4` endpoints, e.g. `["and", ["=", "certname", "web01"]]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    And(Vec<Query>),
    Or(Vec<Query>),
    Equals { field: String, value: Value },
    Regex { field: String, pattern: String },
    Null { field: String, is_null: bool },
    Extract {
        projections: Vec<Projection>,
        query: Option<Box<Query>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Field(String),
    Function(Function),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Vec<String>,
}

impl Query {
    pub fn and(children: Vec<Query>) -> Self {
        Query::And(children)
    }

    pub fn or(children: Vec<Query>) -> Self {
        Query::Or(children)
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Query::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Query::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn null(field: impl Into<String>, is_null: bool) -> Self {
        Query::Null {
            field: field.into(),
            is_null,
        }
    }

    pub fn extract(projections: Vec<Projection>, query: Option<Query>) -> Self {
        Query::Extract {
            projections,
            query: query.map(Box::new),
        }
    }

    /// `["extract", [["function", "count"]], query]`
    pub fn count(query: Option<Query>) -> Self {
        Query::extract(vec![Projection::Function(Function::new("count"))], query)
    }

    /// Conjunction of `children`, or `None` when there is nothing to constrain.
    ///
    /// PuppetDB rejects an `and` without operands, so callers that build a
    /// filter incrementally send no query at all in that case.
    pub fn all_of(children: Vec<Query>) -> Option<Self> {
        if children.is_empty() {
            None
        } else {
            Some(Query::And(children))
        }
    }

    /// Disjunction of equality checks on `field`, one per value.
    pub fn any_equals<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Query::Or(
            values
                .into_iter()
                .map(|value| Query::equals(field, value))
                .collect(),
        )
    }

    pub fn to_json(&self) -> Value {
        // Serializing into a Value cannot fail: all keys are strings.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Function {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Serialize for Query {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Query::And(children) | Query::Or(children) => {
                let op = if matches!(self, Query::And(_)) {
                    "and"
                } else {
                    "or"
                };
                let mut seq = serializer.serialize_seq(Some(children.len() + 1))?;
                seq.serialize_element(op)?;
                for child in children {
                    seq.serialize_element(child)?;
                }
                seq.end()
            }
            Query::Equals { field, value } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("=")?;
                seq.serialize_element(field)?;
                seq.serialize_element(value)?;
                seq.end()
            }
            Query::Regex { field, pattern } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("~")?;
                seq.serialize_element(field)?;
                seq.serialize_element(pattern)?;
                seq.end()
            }
            Query::Null { field, is_null } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("null?")?;
                seq.serialize_element(field)?;
                seq.serialize_element(is_null)?;
                seq.end()
            }
            Query::Extract { projections, query } => {
                let len = if query.is_some() { 3 } else { 2 };
                let mut seq = serializer.serialize_seq(Some(len))?;
                seq.serialize_element("extract")?;
                seq.serialize_element(projections)?;
                if let Some(query) = query {
                    seq.serialize_element(query)?;
                }
                seq.end()
            }
        }
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Projection::Field(name) => serializer.serialize_str(name),
            Projection::Function(function) => function.serialize(serializer),
        }
    }
}

impl Serialize for Function {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.args.len() + 2))?;
        seq.serialize_element("function")?;
        seq.serialize_element(&self.name)?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One entry of the `order_by` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub field: String,
    pub order: SortDirection,
}

impl Serialize for OrderItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("field", &self.field)?;
        map.serialize_entry("order", &self.order)?;
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    pub items: Vec<OrderItem>,
}

impl OrderBy {
    pub fn single(field: impl Into<String>, order: SortDirection) -> Self {
        OrderBy {
            items: vec![OrderItem {
                field: field.into(),
                order,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}
