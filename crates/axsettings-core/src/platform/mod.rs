//! Platform abstraction layer
//!
//! [`AxNode`] is one node of an accessibility tree, [`Workspace`] is process
//! control plus the trust check. The macOS backend talks to the AX API; other
//! platforms get a backend that reports every call as unsupported.

use crate::element::{Action, AttrValue, Attribute, Role, UIElement};
use crate::error::Result;
use std::any::Any;
use std::sync::Arc;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod unsupported;

#[cfg(target_os = "macos")]
pub use macos as current;

#[cfg(not(target_os = "macos"))]
pub use unsupported as current;

/// Every read may fail: nodes are live and can vanish between calls.
pub trait AxNode: Send + Sync {
    fn role(&self) -> Result<Role>;
    fn attribute(&self, attr: Attribute) -> Result<Option<AttrValue>>;
    fn set_attribute(&self, attr: Attribute, value: &AttrValue) -> Result<()>;
    fn children(&self) -> Result<Vec<Arc<dyn AxNode>>>;
    fn parent(&self) -> Result<Option<Arc<dyn AxNode>>>;
    fn perform(&self, action: Action) -> Result<()>;
    fn same_node(&self, other: &dyn AxNode) -> bool;
    fn as_any(&self) -> &dyn Any;

    fn main_window(&self) -> Result<Option<Arc<dyn AxNode>>> {
        for child in self.children()? {
            if child.role()? == Role::Window {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }
}

pub trait Workspace: Send + Sync {
    fn is_trusted(&self) -> bool;
    /// Show the system permission prompt. Returns the trust state afterwards.
    fn request_trust(&self) -> bool;
    fn running_pid(&self, bundle_id: &str) -> Result<Option<i32>>;
    /// Ask the OS to start the application. Does not wait for it.
    fn launch(&self, bundle_id: &str, hidden: bool) -> Result<()>;
    fn is_finished_launching(&self, pid: i32) -> bool;
    fn is_running(&self, pid: i32) -> bool;
    fn terminate(&self, pid: i32) -> Result<()>;
    fn app_element(&self, pid: i32) -> Result<UIElement>;
}

/// Workspace for the platform this binary was built for.
pub fn native() -> Arc<dyn Workspace> {
    current::workspace()
}
