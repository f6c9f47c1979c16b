//! Fallback for platforms without an accessibility backend yet.

use super::Workspace;
use crate::element::UIElement;
use crate::error::{Error, Result};
use std::sync::Arc;

const MESSAGE: &str = "Accessibility automation is only implemented for macOS";

pub fn workspace() -> Arc<dyn Workspace> {
    Arc::new(UnsupportedWorkspace)
}

pub struct UnsupportedWorkspace;

impl Workspace for UnsupportedWorkspace {
    fn is_trusted(&self) -> bool {
        false
    }

    fn request_trust(&self) -> bool {
        false
    }

    fn running_pid(&self, _bundle_id: &str) -> Result<Option<i32>> {
        Err(Error::unsupported(MESSAGE))
    }

    fn launch(&self, _bundle_id: &str, _hidden: bool) -> Result<()> {
        Err(Error::unsupported(MESSAGE))
    }

    fn is_finished_launching(&self, _pid: i32) -> bool {
        false
    }

    fn is_running(&self, _pid: i32) -> bool {
        false
    }

    fn terminate(&self, _pid: i32) -> Result<()> {
        Err(Error::unsupported(MESSAGE))
    }

    fn app_element(&self, _pid: i32) -> Result<UIElement> {
        Err(Error::unsupported(MESSAGE))
    }
}
