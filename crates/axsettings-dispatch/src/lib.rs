//! axsettings-dispatch - apply and capture OS settings
//!
//! Settings are addressed by [`SettingKey`] and reached through one of three
//! proxies: a native accessor, a JSON file, or a System Settings pane driven
//! through the accessibility tree. Every proxy follows the same contract:
//! skip when the value is already in place, mutate once, then verify within
//! the caller's deadline.
//!
//! ```no_run
//! use axsettings_dispatch::prelude::*;
//!
//! # async fn run() -> axsettings_core::Result<()> {
//! let dispatcher = Catalog::builtin()?.into_dispatcher(Automation::native())?;
//! let key: SettingKey = "com.apple.macos.display/contrast.enabled".parse()?;
//! dispatcher.apply(&key, &SettingValue::Bool(true), Deadline::after_ms(8000)).await?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod dispatch;
pub mod key;
pub mod native;
pub mod navigation;
pub mod proxy;
pub mod store;
pub mod system_settings;
pub mod value;

pub use catalog::Catalog;
pub use dispatch::{
    ApplyBatch, ApplyReport, BatchReport, Finalizer, RegisteredSetting, SettingsDispatcher,
};
pub use key::SettingKey;
pub use navigation::{NavState, NavigationResult, PaneNavigator};
pub use proxy::{ApplyOutcome, ControlBinding, SettingProxy, TreeAutomation};
pub use system_settings::{SettingsPane, SettingsView, SystemSettings};
pub use value::{SettingValue, ValueType};

pub mod prelude {
    pub use crate::catalog::Catalog;
    pub use crate::dispatch::{ApplyBatch, SettingsDispatcher};
    pub use crate::key::SettingKey;
    pub use crate::native::{DefaultsAccessor, FnAccessor, NativeAccessor};
    pub use crate::proxy::{ApplyOutcome, ControlBinding, SettingProxy};
    pub use crate::system_settings::{SettingsView, SystemSettings};
    pub use crate::value::{SettingValue, ValueType};
    pub use axsettings_core::{Automation, AutomationSession, Deadline};
}
