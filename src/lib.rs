//! Drive OS accessibility settings through the live accessibility tree
//!
//! Re-exports the two workspace libraries:
//!
//! - [`core`]: deadlines, the tree facade, control actuators and sessions
//! - [`dispatch`]: pane navigation, setting proxies, the dispatcher and catalogs
//!
//! ```no_run
//! use axsettings::prelude::*;
//!
//! # async fn run() -> axsettings::Result<()> {
//! let dispatcher = Catalog::builtin()?.into_dispatcher(Automation::native())?;
//! let key: SettingKey = "com.apple.macos.zoom/keyboardShortcuts.enabled".parse()?;
//! let outcome = dispatcher
//!     .apply(&key, &SettingValue::Bool(true), Deadline::after_ms(8000))
//!     .await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub use axsettings_core as core;
pub use axsettings_dispatch as dispatch;

pub use axsettings_core::{
    Automation, AutomationSession, Deadline, EngineConfig, Error, ErrorCode, Result,
};
pub use axsettings_dispatch::{
    Catalog, SettingKey, SettingValue, SettingsDispatcher, SystemSettings,
};

pub mod prelude {
    pub use axsettings_core::prelude::*;
    pub use axsettings_dispatch::prelude::*;
}
