//! Native setting accessors
//!
//! A native accessor reads and writes one preference without touching the
//! accessibility tree. `Ok(None)` from [`NativeAccessor::read`] means the
//! store has no value yet (common before the user first changes a setting);
//! it is treated as unknown, never as `false`.

use crate::value::{SettingValue, ValueTransform, ValueType};
use anyhow::{bail, Context};
use axsettings_core::{Error, Result};
use std::fmt;
use std::process::Command;
use tracing::debug;

pub trait NativeAccessor: Send + Sync {
    fn read(&self) -> Result<Option<SettingValue>>;
    fn write(&self, value: &SettingValue) -> Result<()>;
    /// Short description for logs and error context.
    fn describe(&self) -> String;
}

/// A key in a `defaults` domain, accessed through the `defaults` tool.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsAccessor {
    domain: String,
    key: String,
    value_type: ValueType,
    transform: Option<ValueTransform>,
}

impl DefaultsAccessor {
    pub fn new(domain: impl Into<String>, key: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
            value_type,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Option<ValueTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn run(&self, args: &[String]) -> anyhow::Result<std::process::Output> {
        debug!(domain = %self.domain, key = %self.key, ?args, "running defaults");
        Command::new("defaults")
            .args(args)
            .output()
            .context("Failed to run the defaults tool")
    }

    /// Logical value to store form.
    fn stored(&self, value: &SettingValue) -> SettingValue {
        match self.transform {
            Some(t) => t.apply(value),
            None => value.clone(),
        }
    }
}

impl NativeAccessor for DefaultsAccessor {
    fn read(&self) -> Result<Option<SettingValue>> {
        let args = ["read".to_string(), self.domain.clone(), self.key.clone()];
        let output = self.run(&args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("does not exist") {
                return Ok(None);
            }
            let reason = stderr.trim();
            let err = anyhow::anyhow!("defaults read {} {}: {}", self.domain, self.key, reason);
            return Err(err.into());
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        let value = parse_defaults_output(self.value_type, &raw)?;
        Ok(Some(self.stored(&value)))
    }

    fn write(&self, value: &SettingValue) -> Result<()> {
        let stored = self.stored(&value.coerce(self.value_type)?);
        let mut args = vec!["write".to_string(), self.domain.clone(), self.key.clone()];
        args.extend(write_args(&stored));

        let result: anyhow::Result<()> = (|| {
            let output = self.run(&args)?;
            if !output.status.success() {
                bail!("exit {}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim());
            }
            Ok(())
        })();
        result.map_err(|e| Error::action_failed("defaults write", &format!("{:#}", e)))
    }

    fn describe(&self) -> String {
        format!("defaults {} {}", self.domain, self.key)
    }
}

/// Parse what `defaults read` prints for a scalar.
pub fn parse_defaults_output(ty: ValueType, raw: &str) -> Result<SettingValue> {
    let raw = raw.trim();
    match ty {
        // `defaults` prints booleans as 1/0.
        ValueType::Boolean => match raw {
            "1" | "true" | "YES" => Ok(SettingValue::Bool(true)),
            "0" | "false" | "NO" => Ok(SettingValue::Bool(false)),
            _ => Err(Error::invalid_value(format!("'{}' is not a defaults boolean", raw))),
        },
        _ => SettingValue::parse(ty, raw),
    }
}

/// Type flag and value for `defaults write`.
pub fn write_args(value: &SettingValue) -> Vec<String> {
    let (flag, text) = match value {
        SettingValue::Bool(b) => ("-bool", b.to_string()),
        SettingValue::Integer(i) => ("-int", i.to_string()),
        SettingValue::Double(d) => ("-float", d.to_string()),
        SettingValue::String(s) => ("-string", s.clone()),
    };
    vec![flag.to_string(), text]
}

type ReadFn = Box<dyn Fn() -> Result<Option<SettingValue>> + Send + Sync>;
type WriteFn = Box<dyn Fn(&SettingValue) -> Result<()> + Send + Sync>;

/// Accessor backed by closures, for embedders with their own OS bindings.
pub struct FnAccessor {
    name: String,
    read: ReadFn,
    write: WriteFn,
}

impl FnAccessor {
    pub fn new<R, W>(name: impl Into<String>, read: R, write: W) -> Self
    where
        R: Fn() -> Result<Option<SettingValue>> + Send + Sync + 'static,
        W: Fn(&SettingValue) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            read: Box::new(read),
            write: Box::new(write),
        }
    }

    /// Read-only accessor; writes fail with `UNSUPPORTED`.
    pub fn reader<R>(name: impl Into<String>, read: R) -> Self
    where
        R: Fn() -> Result<Option<SettingValue>> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::new(name, read, move |_| {
            Err(Error::unsupported(format!("{} cannot be written natively", label)))
        })
    }
}

impl NativeAccessor for FnAccessor {
    fn read(&self) -> Result<Option<SettingValue>> {
        (self.read)()
    }

    fn write(&self, value: &SettingValue) -> Result<()> {
        (self.write)(value)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Debug for FnAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAccessor").field("name", &self.name).finish()
    }
}
