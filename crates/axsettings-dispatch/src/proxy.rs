//! Setting proxies
//!
//! Three ways of changing a setting behind one contract:
//!
//! 1. pre-check: read the current value and return [`ApplyOutcome::Unchanged`]
//!    if it already matches
//! 2. mutate through the native call, the file, or the settings pane
//! 3. verify by polling the same read path until the value matches or the
//!    deadline passes (`VERIFICATION_TIMEOUT`)
//!
//! A mutation is never repeated. Toggling a checkbox twice undoes it.

use crate::native::NativeAccessor;
use crate::store::JsonFileStore;
use crate::system_settings::{
    ColorFilterType, SettingsPane, SettingsView, SystemSettings, ZoomStyle,
};
use crate::value::SettingValue;
use axsettings_core::deadline::{self, Deadline};
use axsettings_core::{AutomationSession, Error, ErrorCode, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const SLIDER_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The value was already in place; nothing was touched.
    Unchanged,
    Applied,
}

/// A value as it appears in a pop-up or radio group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLabel {
    pub value: SettingValue,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionPreset {
    ColorFilterType,
    ZoomStyle,
}

/// Value/label pairs of a choice control. With no pairs the label is the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Options {
    Preset(OptionPreset),
    Labels(Vec<OptionLabel>),
}

impl Default for Options {
    fn default() -> Self {
        Options::Labels(Vec::new())
    }
}

impl Options {
    pub fn labels(&self) -> Vec<OptionLabel> {
        let pair = |raw: i64, label: &str| OptionLabel {
            value: SettingValue::Integer(raw),
            label: label.to_string(),
        };
        match self {
            Options::Labels(labels) => labels.clone(),
            Options::Preset(OptionPreset::ColorFilterType) => {
                ColorFilterType::ALL.iter().map(|t| pair(t.raw(), t.label())).collect()
            }
            Options::Preset(OptionPreset::ZoomStyle) => {
                ZoomStyle::ALL.iter().map(|s| pair(s.raw(), s.label())).collect()
            }
        }
    }

    fn label_for(&self, value: &SettingValue) -> Result<String> {
        let labels = self.labels();
        if labels.is_empty() {
            return value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::invalid_value(format!("Expected option text, got {}", value))
                });
        }
        labels
            .iter()
            .find(|o| o.value.matches(value))
            .map(|o| o.label.clone())
            .ok_or_else(|| {
                Error::unsupported(format!("{} is not one of the control's options", value))
                    .with_suggestions(labels.iter().map(|o| o.value.to_string()).collect())
            })
    }

    fn value_for(&self, label: &str) -> Result<SettingValue> {
        let labels = self.labels();
        if labels.is_empty() {
            return Ok(SettingValue::String(label.to_string()));
        }
        labels
            .into_iter()
            .find(|o| o.label == label)
            .map(|o| o.value)
            .ok_or_else(|| Error::value_unavailable(&format!("option '{}'", label)))
    }
}

/// Which control in the pane carries the setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ControlBinding {
    Checkbox {
        identifier: String,
    },
    Slider {
        identifier: String,
        /// Distance one increment moves the slider, when known up front.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
    },
    #[serde(rename = "popup")]
    PopUp {
        identifier: String,
        #[serde(default)]
        options: Options,
    },
    RadioGroup {
        identifier: String,
        #[serde(default)]
        options: Options,
    },
}

impl ControlBinding {
    pub fn identifier(&self) -> &str {
        match self {
            ControlBinding::Checkbox { identifier }
            | ControlBinding::Slider { identifier, .. }
            | ControlBinding::PopUp { identifier, .. }
            | ControlBinding::RadioGroup { identifier, .. } => identifier,
        }
    }

    /// Current value as shown by the control.
    pub fn read(&self, pane: &SettingsPane) -> Result<SettingValue> {
        match self {
            ControlBinding::Checkbox { identifier } => {
                Ok(SettingValue::Bool(pane.checkbox(identifier)?.get()?))
            }
            ControlBinding::Slider { identifier, .. } => {
                Ok(SettingValue::Double(pane.slider(identifier)?.get()?))
            }
            ControlBinding::PopUp { identifier, options } => {
                options.value_for(&pane.popup(identifier)?.get()?)
            }
            ControlBinding::RadioGroup { identifier, options } => {
                let selected = pane
                    .radio_group(identifier)?
                    .selected()?
                    .ok_or_else(|| {
                        Error::value_unavailable(&format!("selection of {}", identifier))
                    })?;
                options.value_for(&selected)
            }
        }
    }

    /// Drive the control toward `target`. Does not verify.
    ///
    /// For a slider that moved, returns the size of its last step.
    pub async fn write(
        &self,
        pane: &SettingsPane,
        target: &SettingValue,
        deadline: Deadline,
    ) -> Result<Option<f64>> {
        match self {
            ControlBinding::Checkbox { identifier } => {
                let on = target.as_bool().ok_or_else(|| {
                    Error::invalid_value(format!("Checkbox needs a boolean, got {}", target))
                })?;
                pane.checkbox(identifier)?.set(on)?;
                Ok(None)
            }
            ControlBinding::Slider { identifier, .. } => {
                let to = target.as_f64().ok_or_else(|| {
                    Error::invalid_value(format!("Slider needs a number, got {}", target))
                })?;
                let travel = pane.slider(identifier)?.step_toward(to, deadline).await?;
                debug!(identifier, ?travel, "slider moved");
                Ok(travel.step)
            }
            ControlBinding::PopUp { identifier, options } => {
                let label = options.label_for(target)?;
                pane.popup(identifier)?.set(&label, deadline).await?;
                Ok(None)
            }
            ControlBinding::RadioGroup { identifier, options } => {
                let label = options.label_for(target)?;
                pane.radio_group(identifier)?.select(&label)?;
                Ok(None)
            }
        }
    }

    /// Whether `current` already counts as `target`. With a known step, a
    /// slider within half a step of the target is as close as it can get.
    fn in_place(&self, current: &SettingValue, target: &SettingValue, step: Option<f64>) -> bool {
        if let (ControlBinding::Slider { .. }, Some(step), Some(c), Some(t)) =
            (self, step, current.as_f64(), target.as_f64())
        {
            return (c - t).abs() <= step / 2.0 + SLIDER_TOLERANCE;
        }
        current.matches(target)
    }

    /// Whether `observed` counts as the target after a write. Without a known
    /// step, reaching or crossing the target in the direction of travel counts.
    fn settled(
        &self,
        observed: &SettingValue,
        target: &SettingValue,
        start: Option<&SettingValue>,
        step: Option<f64>,
    ) -> bool {
        if let ControlBinding::Slider { .. } = self {
            if step.is_some() {
                return self.in_place(observed, target, step);
            }
            let start = start.and_then(|s| s.as_f64());
            if let (Some(o), Some(t), Some(s)) = (observed.as_f64(), target.as_f64(), start) {
                return if t >= s {
                    o >= t - SLIDER_TOLERANCE
                } else {
                    o <= t + SLIDER_TOLERANCE
                };
            }
        }
        observed.matches(target)
    }
}

/// A setting reached through a System Settings pane.
#[derive(Clone)]
pub struct TreeAutomation {
    pub view: SettingsView,
    pub control: ControlBinding,
    /// Native read path, used for the pre-check and verification instead of
    /// the control when present.
    pub reader: Option<Arc<dyn NativeAccessor>>,
    /// Slider step observed by the last write, shared across clones.
    learned_step: Arc<Mutex<Option<f64>>>,
}

impl TreeAutomation {
    pub fn new(view: SettingsView, control: ControlBinding) -> Self {
        Self {
            view,
            control,
            reader: None,
            learned_step: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn NativeAccessor>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Slider step size: declared in the binding, else learned from a write.
    pub fn slider_step(&self) -> Option<f64> {
        match &self.control {
            ControlBinding::Slider { step: Some(step), .. } => Some(*step),
            ControlBinding::Slider { .. } => *self.learned_step.lock(),
            _ => None,
        }
    }

    async fn apply(
        &self,
        session: &mut AutomationSession,
        target: &SettingValue,
        deadline: Deadline,
    ) -> Result<ApplyOutcome> {
        let step = self.slider_step();
        let mut start = None;
        if let Some(reader) = &self.reader {
            start = reader.read()?;
            if start.as_ref().is_some_and(|v| self.control.in_place(v, target, step)) {
                debug!(reader = %reader.describe(), %target, "already set");
                return Ok(ApplyOutcome::Unchanged);
            }
        }

        let pane = SystemSettings::open(self.view, session, deadline).await?;

        if self.reader.is_none() {
            let current = self.control.read(&pane)?;
            if self.control.in_place(&current, target, step) {
                debug!(control = self.control.identifier(), %target, "already set");
                return Ok(ApplyOutcome::Unchanged);
            }
            start = Some(current);
        }

        let what = format!("{} in {}", self.control.identifier(), self.view);
        time_left(&what, deadline)?;
        if let Some(moved) = self.control.write(&pane, target, deadline).await? {
            *self.learned_step.lock() = Some(moved);
        }
        let step = self.slider_step();

        verify(&what, deadline, || {
            let observed = match &self.reader {
                Some(reader) => reader.read()?,
                None => match pane.refresh().and_then(|p| self.control.read(&p)) {
                    Ok(v) => Some(v),
                    Err(e) if transient(&e) => None,
                    Err(e) => return Err(e),
                },
            };
            Ok(observed.is_some_and(|o| self.control.settled(&o, target, start.as_ref(), step)))
        })
        .await
    }

    async fn capture(
        &self,
        session: &mut AutomationSession,
        deadline: Deadline,
    ) -> Result<Option<SettingValue>> {
        if let Some(reader) = &self.reader {
            return reader.read();
        }
        let pane = SystemSettings::open(self.view, session, deadline).await?;
        self.control.read(&pane).map(Some)
    }
}

impl fmt::Debug for TreeAutomation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeAutomation")
            .field("view", &self.view)
            .field("control", &self.control)
            .field("reader", &self.reader.as_ref().map(|r| r.describe()))
            .finish()
    }
}

#[derive(Clone)]
pub enum SettingProxy {
    Native(Arc<dyn NativeAccessor>),
    File(JsonFileStore),
    Tree(TreeAutomation),
}

impl SettingProxy {
    pub fn describe(&self) -> String {
        match self {
            SettingProxy::Native(acc) => acc.describe(),
            SettingProxy::File(store) => format!("{}#{}", store.path().display(), store.pointer()),
            SettingProxy::Tree(t) => format!("{} in {}", t.control.identifier(), t.view),
        }
    }

    pub async fn apply(
        &self,
        session: &mut AutomationSession,
        target: &SettingValue,
        deadline: Deadline,
    ) -> Result<ApplyOutcome> {
        let outcome = match self {
            SettingProxy::Native(acc) => {
                if acc.read()?.is_some_and(|v| v.matches(target)) {
                    return Ok(ApplyOutcome::Unchanged);
                }
                time_left(&acc.describe(), deadline)?;
                acc.write(target)?;
                verify(&acc.describe(), deadline, || {
                    Ok(acc.read()?.is_some_and(|v| v.matches(target)))
                })
                .await?
            }
            SettingProxy::File(store) => {
                if store.read()?.is_some_and(|v| v.matches(target)) {
                    return Ok(ApplyOutcome::Unchanged);
                }
                time_left(&self.describe(), deadline)?;
                store.write(target)?;
                verify(&self.describe(), deadline, || {
                    Ok(store.read()?.is_some_and(|v| v.matches(target)))
                })
                .await?
            }
            SettingProxy::Tree(tree) => tree.apply(session, target, deadline).await?,
        };
        info!(proxy = %self.describe(), %target, ?outcome, "setting applied");
        Ok(outcome)
    }

    /// `Ok(None)` when the read path has no value yet.
    pub async fn capture(
        &self,
        session: &mut AutomationSession,
        deadline: Deadline,
    ) -> Result<Option<SettingValue>> {
        match self {
            SettingProxy::Native(acc) => acc.read(),
            SettingProxy::File(store) => Ok(store.read()?),
            SettingProxy::Tree(tree) => tree.capture(session, deadline).await,
        }
    }
}

impl fmt::Debug for SettingProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingProxy::Native(acc) => f.debug_tuple("Native").field(&acc.describe()).finish(),
            SettingProxy::File(store) => f.debug_tuple("File").field(store).finish(),
            SettingProxy::Tree(tree) => f.debug_tuple("Tree").field(tree).finish(),
        }
    }
}

/// The control may be mid-rebuild right after a change.
fn transient(e: &Error) -> bool {
    e.is(ErrorCode::StaleElement)
        || e.is(ErrorCode::ControlNotFound)
        || e.is(ErrorCode::ValueUnavailable)
}

/// Nothing is mutated once the deadline has passed.
fn time_left(what: &str, deadline: Deadline) -> Result<()> {
    if deadline.is_expired() {
        return Err(Error::new(
            ErrorCode::VerificationTimeout,
            format!("Deadline expired before changing {}", what),
        ));
    }
    Ok(())
}

async fn verify<F>(what: &str, deadline: Deadline, check: F) -> Result<ApplyOutcome>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    if deadline::try_wait_until(deadline, check).await? {
        Ok(ApplyOutcome::Applied)
    } else {
        Err(Error::verification_timeout(what, started.elapsed().as_millis() as u64))
    }
}
