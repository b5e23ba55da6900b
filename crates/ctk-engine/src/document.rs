use crate::EngineError;
use serde::{Serialize, Serializer};
use serde_json::ser::PrettyFormatter;
use std::fmt;
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Table, TableLike};

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Json => f.write_str("JSON"),
            DocumentFormat::Toml => f.write_str("TOML"),
        }
    }
}

impl Serialize for DocumentFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml_edit::TomlError),
    #[error("top-level JSON value must be an object")]
    NotAnObject,
}

/// An engine's configuration, held in memory between read and write.
///
/// Key order is preserved on both parse and render, and removing a key
/// keeps the relative order of the remaining ones, so unrelated settings
/// round-trip untouched. TOML documents also keep their comments, blank
/// lines and indentation.
#[derive(Debug, Clone)]
pub enum ConfigDocument {
    Json(JsonMap),
    Toml(DocumentMut),
}

/// TOML documents compare by their rendered text.
impl PartialEq for ConfigDocument {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConfigDocument::Json(a), ConfigDocument::Json(b)) => a == b,
            (ConfigDocument::Toml(a), ConfigDocument::Toml(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl ConfigDocument {
    pub fn empty(format: DocumentFormat) -> Self {
        match format {
            DocumentFormat::Json => ConfigDocument::Json(JsonMap::new()),
            DocumentFormat::Toml => ConfigDocument::Toml(DocumentMut::new()),
        }
    }

    /// Parse file content; blank content is an empty document.
    pub fn parse(format: DocumentFormat, content: &str) -> Result<Self, DocumentError> {
        if content.trim().is_empty() {
            return Ok(Self::empty(format));
        }
        match format {
            DocumentFormat::Json => match serde_json::from_str(content)? {
                serde_json::Value::Object(map) => Ok(ConfigDocument::Json(map)),
                _ => Err(DocumentError::NotAnObject),
            },
            DocumentFormat::Toml => Ok(ConfigDocument::Toml(content.parse::<DocumentMut>()?)),
        }
    }

    /// Render in the engine's native syntax. JSON uses 4-space indentation
    /// and ends with a newline; TOML is written back with its original layout.
    pub fn render(&self) -> Result<String, DocumentError> {
        match self {
            ConfigDocument::Json(map) => {
                let mut buf = Vec::new();
                let formatter = PrettyFormatter::with_indent(b"    ");
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                map.serialize(&mut ser)?;
                let mut out = String::from_utf8_lossy(&buf).into_owned();
                out.push('\n');
                Ok(out)
            }
            ConfigDocument::Toml(doc) => Ok(doc.to_string()),
        }
    }

    pub fn format(&self) -> DocumentFormat {
        match self {
            ConfigDocument::Json(_) => DocumentFormat::Json,
            ConfigDocument::Toml(_) => DocumentFormat::Toml,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ConfigDocument::Json(map) => map.is_empty(),
            ConfigDocument::Toml(doc) => doc.as_table().is_empty(),
        }
    }

    pub(crate) fn json_mut(&mut self, engine: &'static str) -> Result<&mut JsonMap, EngineError> {
        match self {
            ConfigDocument::Json(map) => Ok(map),
            ConfigDocument::Toml(_) => Err(EngineError::FormatMismatch {
                engine,
                expected: DocumentFormat::Json,
                found: DocumentFormat::Toml,
            }),
        }
    }

    /// Root table of a TOML document.
    pub(crate) fn toml_mut(&mut self, engine: &'static str) -> Result<&mut Table, EngineError> {
        match self {
            ConfigDocument::Toml(doc) => Ok(doc.as_table_mut()),
            ConfigDocument::Json(_) => Err(EngineError::FormatMismatch {
                engine,
                expected: DocumentFormat::Toml,
                found: DocumentFormat::Json,
            }),
        }
    }
}

/// Get the object stored under `key`, inserting an empty one if absent.
pub(crate) fn json_object_mut<'a>(
    map: &'a mut JsonMap,
    key: &str,
) -> Result<&'a mut JsonMap, EngineError> {
    map.entry(key.to_owned())
        .or_insert_with(|| serde_json::Value::Object(JsonMap::new()))
        .as_object_mut()
        .ok_or_else(|| EngineError::Malformed {
            key: key.to_owned(),
            expected: "an object",
        })
}

/// Remove `key` without disturbing the order of the other entries.
pub(crate) fn remove_json_key(map: &mut JsonMap, key: &str) -> Option<serde_json::Value> {
    if !map.contains_key(key) {
        return None;
    }
    let mut removed = None;
    *map = std::mem::take(map)
        .into_iter()
        .filter_map(|(k, v)| {
            if k == key {
                removed = Some(v);
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    removed
}

/// A table that only gets a `[header]` once it holds plain values.
fn implicit_table() -> Item {
    let mut table = Table::new();
    table.set_implicit(true);
    Item::Table(table)
}

/// Walk (and create) nested tables along `path`. Inline tables are
/// followed like standard ones.
pub(crate) fn toml_table_mut<'a>(
    root: &'a mut dyn TableLike,
    path: &[&str],
) -> Result<&'a mut dyn TableLike, EngineError> {
    let mut current = root;
    for (i, key) in path.iter().enumerate() {
        if current.get(key).is_none() {
            current.insert(key, implicit_table());
        }
        current = current
            .get_mut(key)
            .and_then(Item::as_table_like_mut)
            .ok_or_else(|| malformed_table(&path[..=i]))?;
    }
    Ok(current)
}

/// Walk nested tables along `path` without creating anything.
pub(crate) fn toml_table_get_mut<'a>(
    root: &'a mut dyn TableLike,
    path: &[&str],
) -> Result<Option<&'a mut dyn TableLike>, EngineError> {
    let mut current = root;
    for (i, key) in path.iter().enumerate() {
        current = match current.get_mut(key) {
            None => return Ok(None),
            Some(item) => item
                .as_table_like_mut()
                .ok_or_else(|| malformed_table(&path[..=i]))?,
        };
    }
    Ok(Some(current))
}

/// Remove tables along `path` that are left empty, deepest first.
pub(crate) fn prune_empty_tables(table: &mut dyn TableLike, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let emptied = match table.get_mut(first).and_then(Item::as_table_like_mut) {
        Some(child) => {
            prune_empty_tables(&mut *child, rest);
            child.is_empty()
        }
        None => false,
    };
    if emptied {
        table.remove(first);
    }
}

/// Copy of `source` with fresh formatting, for placing under another key.
///
/// Header positions, comments and whitespace belong to where the source
/// sits in the file, so none of them are carried over.
pub(crate) fn detached_copy(source: &dyn TableLike) -> Table {
    let mut copy = Table::new();
    for (key, item) in source.iter() {
        let item = match item {
            Item::Table(child) => Item::Table(detached_copy(child)),
            Item::Value(value) => {
                let mut value = value.clone();
                value.decor_mut().clear();
                Item::Value(value)
            }
            other => other.clone(),
        };
        copy.insert(key, item);
    }
    copy
}

fn malformed_table(path: &[&str]) -> EngineError {
    EngineError::Malformed {
        key: path.join("."),
        expected: "a table",
    }
}
