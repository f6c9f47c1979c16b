//! Settings dispatcher: setting keys to proxies
//!
//! Every public call runs inside one [`AutomationSession`] and one deadline.
//! Applications the call had to launch are closed when it finishes; ones the
//! user already had open are left alone.

use crate::key::SettingKey;
use crate::proxy::{ApplyOutcome, SettingProxy};
use crate::value::{SettingValue, ValueType};
use axsettings_core::{Automation, AutomationSession, Deadline, Error, ErrorCode, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Work that makes applied changes take effect, such as asking a daemon to
/// reload its preferences. Finalizers are identified by name, so settings
/// sharing one run it once per batch.
#[derive(Clone)]
pub struct Finalizer {
    name: String,
    run: Arc<dyn Fn() -> Result<()> + Send + Sync>,
}

impl Finalizer {
    pub fn new(
        name: impl Into<String>,
        run: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Arc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<()> {
        debug!(finalizer = %self.name, "running finalizer");
        (self.run)()
    }
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredSetting {
    pub proxy: SettingProxy,
    pub value_type: ValueType,
    /// What the OS uses before anyone changes the setting.
    pub default: Option<SettingValue>,
    /// Runs after the setting actually changed.
    pub finalizer: Option<Finalizer>,
}

impl RegisteredSetting {
    pub fn new(proxy: SettingProxy, value_type: ValueType) -> Self {
        Self {
            proxy,
            value_type,
            default: None,
            finalizer: None,
        }
    }

    pub fn with_default(mut self, default: SettingValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }
}

/// Ordered key/value pairs applied within one session.
#[derive(Debug, Clone, Default)]
pub struct ApplyBatch {
    entries: Vec<(SettingKey, SettingValue)>,
}

impl ApplyBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: SettingKey, value: SettingValue) -> Self {
        self.entries.push((key, value));
        self
    }

    pub fn push(&mut self, key: SettingKey, value: SettingValue) {
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(SettingKey, SettingValue)> for ApplyBatch {
    fn from_iter<I: IntoIterator<Item = (SettingKey, SettingValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub key: SettingKey,
    pub value: SettingValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ApplyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    pub elapsed_ms: u64,
    pub at: DateTime<Utc>,
}

impl ApplyReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub reports: Vec<ApplyReport>,
    /// Finalizers run after the entries, each once.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub finalized: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub finalizer_errors: Vec<Error>,
    /// Applications launched for this batch and closed at its end.
    pub closed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<Error>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.reports.iter().all(ApplyReport::succeeded) && self.finalizer_errors.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ApplyReport> {
        self.reports.iter().filter(|r| !r.succeeded())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapturedSetting {
    pub key: SettingKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<SettingValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub captured: Vec<CapturedSetting>,
    pub at: DateTime<Utc>,
}

pub struct SettingsDispatcher {
    automation: Automation,
    settings: BTreeMap<SettingKey, RegisteredSetting>,
}

impl std::fmt::Debug for SettingsDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsDispatcher")
            .field("settings", &self.settings.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SettingsDispatcher {
    pub fn new(automation: Automation) -> Self {
        Self {
            automation,
            settings: BTreeMap::new(),
        }
    }

    pub fn automation(&self) -> &Automation {
        &self.automation
    }

    /// Register `key`, replacing any earlier registration.
    pub fn register(&mut self, key: SettingKey, setting: RegisteredSetting) -> &mut Self {
        self.settings.insert(key, setting);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &SettingKey> {
        self.settings.keys()
    }

    pub fn get(&self, key: &SettingKey) -> Option<&RegisteredSetting> {
        self.settings.get(key)
    }

    fn lookup(&self, key: &SettingKey) -> Result<&RegisteredSetting> {
        self.settings.get(key).ok_or_else(|| {
            Error::invalid_value(format!("Unknown setting '{}'", key))
                .with_suggestions(vec!["List the known settings with `axs keys`".to_string()])
        })
    }

    pub fn is_default(&self, key: &SettingKey, value: &SettingValue) -> bool {
        self.settings
            .get(key)
            .and_then(|s| s.default.as_ref())
            .is_some_and(|d| d.matches(value))
    }

    /// Apply one setting, then run its finalizer if the value changed.
    pub async fn apply(
        &self,
        key: &SettingKey,
        value: &SettingValue,
        deadline: Deadline,
    ) -> Result<ApplyOutcome> {
        let mut session = AutomationSession::begin(&self.automation);
        let result = self.apply_in(&mut session, key, value, deadline).await;
        let result = result.and_then(|outcome| {
            if outcome == ApplyOutcome::Applied {
                if let Some(finalizer) = self.get(key).and_then(|s| s.finalizer.as_ref()) {
                    finalizer.run()?;
                }
            }
            Ok(outcome)
        });
        finish(&mut session);
        result
    }

    /// Apply within a caller-owned session, e.g. one of several dependent steps.
    pub async fn apply_in(
        &self,
        session: &mut AutomationSession,
        key: &SettingKey,
        value: &SettingValue,
        deadline: Deadline,
    ) -> Result<ApplyOutcome> {
        let setting = self.lookup(key)?;
        let value = value.coerce(setting.value_type)?;
        setting.proxy.apply(session, &value, deadline).await.map_err(|e| {
            warn!(%key, error = %e, "apply failed");
            e
        })
    }

    pub async fn capture(&self, key: &SettingKey, deadline: Deadline) -> Result<SettingValue> {
        let mut session = AutomationSession::begin(&self.automation);
        let result = self.capture_in(&mut session, key, deadline).await;
        finish(&mut session);
        result
    }

    /// Current value, or the declared default when the store has none yet.
    pub async fn capture_in(
        &self,
        session: &mut AutomationSession,
        key: &SettingKey,
        deadline: Deadline,
    ) -> Result<SettingValue> {
        let setting = self.lookup(key)?;
        match setting.proxy.capture(session, deadline).await? {
            Some(value) => value.coerce(setting.value_type),
            None => setting
                .default
                .clone()
                .ok_or_else(|| Error::value_unavailable(&key.to_string())),
        }
    }

    /// Apply every entry in order under one session and one deadline.
    ///
    /// A failing entry does not stop the batch. Unknown keys are reported
    /// like any other failure. Finalizers of the entries that changed run
    /// after the last entry, once per name, in first-seen order.
    pub async fn apply_batch(&self, batch: &ApplyBatch, deadline: Deadline) -> BatchReport {
        let mut session = AutomationSession::begin(&self.automation);
        let mut reports = Vec::with_capacity(batch.len());
        let mut pending: Vec<&Finalizer> = Vec::new();

        for (key, value) in &batch.entries {
            let started = Instant::now();
            let result = self.apply_in(&mut session, key, value, deadline).await;
            if let (Ok(ApplyOutcome::Applied), Some(finalizer)) =
                (&result, self.get(key).and_then(|s| s.finalizer.as_ref()))
            {
                if pending.iter().all(|f| f.name != finalizer.name) {
                    pending.push(finalizer);
                }
            }
            let (outcome, error) = match result {
                Ok(o) => (Some(o), None),
                Err(e) => (None, Some(e)),
            };
            reports.push(ApplyReport {
                key: key.clone(),
                value: value.clone(),
                outcome,
                error,
                elapsed_ms: started.elapsed().as_millis() as u64,
                at: Utc::now(),
            });
        }

        let mut finalized = Vec::with_capacity(pending.len());
        let mut finalizer_errors = Vec::new();
        for finalizer in pending {
            match finalizer.run() {
                Ok(()) => finalized.push(finalizer.name.clone()),
                Err(e) => {
                    warn!(finalizer = %finalizer.name, error = %e, "finalizer failed");
                    finalizer_errors.push(e);
                }
            }
        }

        let (closed, cleanup_error) = match session.end() {
            Ok(closed) => (closed, None),
            Err(e) => (Vec::new(), Some(e)),
        };
        let report = BatchReport {
            reports,
            finalized,
            finalizer_errors,
            closed,
            cleanup_error,
        };
        info!(
            total = report.reports.len(),
            failed = report.failures().count(),
            "batch applied"
        );
        report
    }

    /// Capture `keys` under one session. With `capture_defaults` false,
    /// values equal to the declared default are left out.
    pub async fn capture_batch(
        &self,
        keys: &[SettingKey],
        capture_defaults: bool,
        deadline: Deadline,
    ) -> CaptureReport {
        let mut session = AutomationSession::begin(&self.automation);
        let mut captured = Vec::with_capacity(keys.len());

        for key in keys {
            match self.capture_in(&mut session, key, deadline).await {
                Ok(value) if !capture_defaults && self.is_default(key, &value) => {}
                Ok(value) => captured.push(CapturedSetting {
                    key: key.clone(),
                    value: Some(value),
                    error: None,
                }),
                Err(e) => captured.push(CapturedSetting {
                    key: key.clone(),
                    value: None,
                    error: Some(e),
                }),
            }
        }

        finish(&mut session);
        CaptureReport {
            captured,
            at: Utc::now(),
        }
    }
}

/// End the session; a cleanup failure does not undo what was applied.
fn finish(session: &mut AutomationSession) {
    if let Err(e) = session.end() {
        if !e.is(ErrorCode::AppNotRunning) {
            warn!(error = %e, "failed to close applications launched by this session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{FnAccessor, NativeAccessor};
    use axsettings_core::mock::MockWorkspace;
    use axsettings_core::EngineConfig;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn dispatcher() -> (SettingsDispatcher, Arc<Mutex<Option<SettingValue>>>) {
        let slot = Arc::new(Mutex::new(None));
        let (r, w) = (slot.clone(), slot.clone());
        let acc: Arc<dyn NativeAccessor> = Arc::new(FnAccessor::new(
            "cursor size",
            move || Ok(r.lock().clone()),
            move |v: &SettingValue| {
                *w.lock() = Some(v.clone());
                Ok(())
            },
        ));
        let automation = Automation::new(Arc::new(MockWorkspace::new()), EngineConfig::default());
        let mut d = SettingsDispatcher::new(automation);
        d.register(
            "com.apple.macos.display/cursor.size".parse().unwrap(),
            RegisteredSetting::new(SettingProxy::Native(acc), ValueType::Double)
                .with_default(SettingValue::Double(1.0)),
        );
        (d, slot)
    }

    #[tokio::test]
    async fn capture_falls_back_to_default() {
        let (d, slot) = dispatcher();
        let key: SettingKey = "com.apple.macos.display/cursor.size".parse().unwrap();
        let value = d.capture(&key, Deadline::after_ms(100)).await.unwrap();
        assert_eq!(value, SettingValue::Double(1.0));

        *slot.lock() = Some(SettingValue::Integer(3));
        let value = d.capture(&key, Deadline::after_ms(100)).await.unwrap();
        assert_eq!(value, SettingValue::Double(3.0));
    }

    #[tokio::test]
    async fn apply_coerces_to_declared_type() {
        let (d, slot) = dispatcher();
        let key: SettingKey = "com.apple.macos.display/cursor.size".parse().unwrap();
        let outcome = d
            .apply(&key, &SettingValue::Integer(2), Deadline::after_ms(200))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(*slot.lock(), Some(SettingValue::Double(2.0)));

        let err = d
            .apply(&key, &SettingValue::Bool(true), Deadline::after_ms(200))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidValue);
    }

    #[tokio::test]
    async fn batch_reports_unknown_keys_and_continues() {
        let (d, _) = dispatcher();
        let batch = ApplyBatch::new()
            .set("com.apple.macos.display/nope".parse().unwrap(), SettingValue::Bool(true))
            .set("com.apple.macos.display/cursor.size".parse().unwrap(), SettingValue::Double(4.0));

        let report = d.apply_batch(&batch, Deadline::after_ms(500)).await;
        assert!(!report.succeeded());
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.reports[1].outcome, Some(ApplyOutcome::Applied));
        assert!(report.closed.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["reports"][0]["error"]["code"], "INVALID_VALUE");
        assert_eq!(json["reports"][1]["key"], "com.apple.macos.display/cursor.size");
    }

    #[tokio::test]
    async fn capture_batch_can_skip_defaults() {
        let (d, _) = dispatcher();
        let keys: Vec<SettingKey> = vec!["com.apple.macos.display/cursor.size".parse().unwrap()];
        let report = d.capture_batch(&keys, false, Deadline::after_ms(100)).await;
        assert!(report.captured.is_empty());
        let report = d.capture_batch(&keys, true, Deadline::after_ms(100)).await;
        assert_eq!(report.captured[0].value, Some(SettingValue::Double(1.0)));
    }

    fn flag(name: &str) -> (SettingProxy, Arc<Mutex<Option<SettingValue>>>) {
        let slot = Arc::new(Mutex::new(Some(SettingValue::Bool(false))));
        let (r, w) = (slot.clone(), slot.clone());
        let acc: Arc<dyn NativeAccessor> = Arc::new(FnAccessor::new(
            name,
            move || Ok(r.lock().clone()),
            move |v: &SettingValue| {
                *w.lock() = Some(v.clone());
                Ok(())
            },
        ));
        (SettingProxy::Native(acc), slot)
    }

    #[tokio::test]
    async fn shared_finalizer_runs_once_per_batch_and_only_after_changes() {
        let (mut d, _) = dispatcher();
        let runs = Arc::new(Mutex::new(0));
        let counter = runs.clone();
        let reload = Finalizer::new("reload-universal-access", move || {
            *counter.lock() += 1;
            Ok(())
        });
        for name in ["contrast", "transparency"] {
            let (proxy, _) = flag(name);
            d.register(
                format!("com.apple.macos.display/{}", name).parse().unwrap(),
                RegisteredSetting::new(proxy, ValueType::Boolean).with_finalizer(reload.clone()),
            );
        }
        let batch = ApplyBatch::new()
            .set("com.apple.macos.display/contrast".parse().unwrap(), SettingValue::Bool(true))
            .set("com.apple.macos.display/transparency".parse().unwrap(), SettingValue::Bool(true));

        let report = d.apply_batch(&batch, Deadline::after_ms(500)).await;
        assert!(report.succeeded());
        assert_eq!(report.finalized, vec!["reload-universal-access".to_string()]);
        assert_eq!(*runs.lock(), 1);

        // Nothing changes the second time, so nothing needs finalizing.
        let report = d.apply_batch(&batch, Deadline::after_ms(500)).await;
        assert!(report.finalized.is_empty());
        assert_eq!(*runs.lock(), 1);
    }

    #[tokio::test]
    async fn failing_finalizer_is_reported_without_hiding_entries() {
        let (mut d, _) = dispatcher();
        let (proxy, slot) = flag("contrast");
        let key: SettingKey = "com.apple.macos.display/contrast".parse().unwrap();
        let broken = Finalizer::new("reload", || {
            Err(Error::action_failed("reload", "daemon not running"))
        });
        d.register(
            key.clone(),
            RegisteredSetting::new(proxy, ValueType::Boolean).with_finalizer(broken),
        );

        let batch = ApplyBatch::new().set(key.clone(), SettingValue::Bool(true));
        let report = d.apply_batch(&batch, Deadline::after_ms(500)).await;
        assert_eq!(report.reports[0].outcome, Some(ApplyOutcome::Applied));
        assert_eq!(report.finalizer_errors.len(), 1);
        assert!(!report.succeeded());
        assert_eq!(*slot.lock(), Some(SettingValue::Bool(true)));

        *slot.lock() = Some(SettingValue::Bool(false));
        let err = d
            .apply(&key, &SettingValue::Bool(true), Deadline::after_ms(500))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ActionFailed);
    }
}
