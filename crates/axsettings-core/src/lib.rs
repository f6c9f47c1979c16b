//! axsettings-core - accessibility tree automation primitives
//!
//! Deadline-bounded polling, a typed facade over the live accessibility tree,
//! control actuators and a launch/attach/terminate session. Every wait in the
//! crate consumes one shared [`Deadline`]; every failure is a structured
//! [`Error`] with a stable code.
//!
//! ## Platform Support
//!
//! - **macOS**: Accessibility API via cidre
//! - **Other platforms**: calls fail with `UNSUPPORTED`; the `mock` feature
//!   provides an in-memory tree for tests and embedders

pub mod apps;
pub mod config;
pub mod controls;
pub mod deadline;
pub mod element;
pub mod error;
pub mod locator;
pub mod platform;
pub mod search;
pub mod selector;
pub mod session;
pub mod tree;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use apps::{Automation, AutomationApp};
pub use config::EngineConfig;
pub use deadline::Deadline;
pub use element::{Action, AttrValue, Attribute, Role, UIElement};
pub use error::{Error, ErrorCode, Result};
pub use locator::Locator;
pub use selector::Selector;
pub use session::AutomationSession;

pub mod prelude {
    pub use crate::apps::{Automation, AutomationApp};
    pub use crate::config::EngineConfig;
    pub use crate::controls::{
        Button, Checkbox, Control, PopUpButton, RadioGroup, Row, Slider, SplitGroup, Window,
    };
    pub use crate::deadline::{wait_until, Deadline};
    pub use crate::element::{Action, AttrValue, Attribute, Role, UIElement};
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::locator::Locator;
    pub use crate::selector::Selector;
    pub use crate::session::AutomationSession;
}
