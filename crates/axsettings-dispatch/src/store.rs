//! JSON file settings
//!
//! One value inside a JSON document, addressed by a JSON pointer. Writes
//! replace the file atomically: the new document is written to a temporary
//! file in the same directory and renamed over the original.

use crate::value::SettingValue;
use axsettings_core::{Error, ErrorCode};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid JSON pointer '{0}'")]
    Pointer(String),
    #[error("'{pointer}' in {} passes through a non-object value", path.display())]
    NotAnObject { path: PathBuf, pointer: String },
    #[error("value at '{pointer}' is not a scalar setting")]
    NotScalar { pointer: String },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        let code = match e {
            StoreError::Read { .. } => ErrorCode::ValueUnavailable,
            StoreError::Write { .. } => ErrorCode::ActionFailed,
            _ => ErrorCode::InvalidValue,
        };
        Error::new(code, e.to_string())
    }
}

type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub struct JsonFileStore {
    path: PathBuf,
    pointer: String,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, pointer: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pointer: pointer.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    /// `Ok(None)` when the file or the member does not exist yet.
    pub fn read(&self) -> StoreResult<Option<SettingValue>> {
        let Some(doc) = self.load()? else {
            return Ok(None);
        };
        match doc.pointer(&self.pointer) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => from_json(v)
                .map(Some)
                .ok_or_else(|| StoreError::NotScalar {
                    pointer: self.pointer.clone(),
                }),
        }
    }

    pub fn write(&self, value: &SettingValue) -> StoreResult<()> {
        let tokens = tokens(&self.pointer)?;
        let mut doc = self.load()?.unwrap_or_else(|| Value::Object(Map::new()));

        let not_object = || StoreError::NotAnObject {
            path: self.path.clone(),
            pointer: self.pointer.clone(),
        };
        let (last, parents) = tokens
            .split_last()
            .ok_or_else(|| StoreError::Pointer(self.pointer.clone()))?;
        let mut slot = &mut doc;
        for token in parents {
            slot = slot
                .as_object_mut()
                .ok_or_else(not_object)?
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        slot.as_object_mut()
            .ok_or_else(not_object)?
            .insert(last.clone(), to_json(value));

        self.persist(&doc)?;
        debug!(path = %self.path.display(), pointer = %self.pointer, %value, "wrote setting file");
        Ok(())
    }

    fn load(&self) -> StoreResult<Option<Value>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw).map(Some).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn persist(&self, doc: &Value) -> StoreResult<()> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        let body = serde_json::to_vec_pretty(doc).map_err(|e| write_err(e.into()))?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// Split a JSON pointer into unescaped reference tokens.
fn tokens(pointer: &str) -> StoreResult<Vec<String>> {
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(StoreError::Pointer(pointer.to_string()));
    };
    Ok(rest
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn from_json(v: &Value) -> Option<SettingValue> {
    match v {
        Value::Bool(b) => Some(SettingValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(SettingValue::Integer)
            .or_else(|| n.as_f64().map(SettingValue::Double)),
        Value::String(s) => Some(SettingValue::String(s.clone())),
        _ => None,
    }
}

fn to_json(v: &SettingValue) -> Value {
    match v {
        SettingValue::Bool(b) => Value::Bool(*b),
        SettingValue::Integer(i) => Value::from(*i),
        SettingValue::Double(d) => Value::from(*d),
        SettingValue::String(s) => Value::String(s.clone()),
    }
}
