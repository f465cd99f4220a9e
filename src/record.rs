//! Records flowing through the read and write paths.
//!
//! A [`Record`] is an ordered JSON object plus out-of-band metadata. The
//! metadata never appears in formatted output: `route` steers the record to a
//! destination subpath on the write path, and `source` records where a record
//! was read from on the read path.

use serde_json::{Map, Value};

/// Where a record was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub path: String,
    pub offset: u64,
    pub length: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Destination subpath override, honored when dynamic routing is enabled.
    pub route: Option<String>,
    pub source: Option<SourceInfo>,
}

/// An ordered mapping of field name to JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub data: Map<String, Value>,
    pub metadata: RecordMetadata,
}

impl Record {
    #[must_use]
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            metadata: RecordMetadata::default(),
        }
    }

    /// Build a record from a JSON value.
    ///
    /// Objects keep their fields; any other value is stored under `field`.
    #[must_use]
    pub fn from_value(value: Value, field: &str) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            other => {
                let mut map = Map::new();
                map.insert(field.to_string(), other);
                Self::new(map)
            }
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.metadata.route = Some(route.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.metadata.source = Some(source);
        self
    }

    /// The routing override, if any. Empty strings count as no override.
    #[must_use]
    pub fn route(&self) -> Option<&str> {
        self.metadata.route.as_deref().filter(|r| !r.is_empty())
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.data.insert(field.into(), value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(data: Map<String, Value>) -> Self {
        Self::new(data)
    }
}
