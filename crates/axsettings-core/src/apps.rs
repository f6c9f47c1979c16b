//! Launching, attaching to and terminating target applications

use crate::config::EngineConfig;
use crate::controls::{Control, Window};
use crate::deadline::{self, Deadline};
use crate::element::UIElement;
use crate::error::{Error, ErrorCode, Result};
use crate::platform::{self, Workspace};
use std::sync::Arc;
use tracing::{debug, info};

/// Explicit handle to the platform and engine settings, passed down the call chain.
#[derive(Clone)]
pub struct Automation {
    workspace: Arc<dyn Workspace>,
    config: EngineConfig,
}

impl Automation {
    pub fn new(workspace: Arc<dyn Workspace>, config: EngineConfig) -> Self {
        Self { workspace, config }
    }

    /// The backend for this platform with default settings.
    pub fn native() -> Self {
        Self::new(platform::native(), EngineConfig::default())
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_trusted(&self) -> bool {
        self.workspace.is_trusted()
    }

    pub fn request_authorization(&self) -> bool {
        self.workspace.request_trust()
    }

    /// Fail fast when the process may not use the accessibility API.
    pub fn ensure_authorized(&self) -> Result<()> {
        if self.workspace.is_trusted() {
            Ok(())
        } else {
            Err(Error::not_authorized())
        }
    }
}

/// A running application the engine can drive.
#[derive(Clone)]
pub struct AutomationApp {
    bundle_id: String,
    pid: i32,
    workspace: Arc<dyn Workspace>,
}

impl AutomationApp {
    /// Attach to a running instance, or fail with `AppNotRunning`.
    pub fn attach(automation: &Automation, bundle_id: &str) -> Result<Self> {
        let pid = automation
            .workspace
            .running_pid(bundle_id)?
            .ok_or_else(|| Error::app_not_running(bundle_id))?;
        Ok(Self {
            bundle_id: bundle_id.to_string(),
            pid,
            workspace: automation.workspace.clone(),
        })
    }

    /// Attach if running, otherwise launch. The flag is true when this call launched it.
    ///
    /// Returns as soon as the process has a pid. A launched app may still be
    /// starting up: record it before calling
    /// [`wait_until_finished_launching`](Self::wait_until_finished_launching),
    /// or use [`AutomationSession::launch_or_attach`].
    ///
    /// [`AutomationSession::launch_or_attach`]: crate::session::AutomationSession::launch_or_attach
    pub async fn launch_or_attach(
        automation: &Automation,
        bundle_id: &str,
        deadline: Deadline,
    ) -> Result<(Self, bool)> {
        match Self::attach(automation, bundle_id) {
            Ok(app) => {
                debug!(bundle_id, pid = app.pid, "attached to running application");
                return Ok((app, false));
            }
            Err(e) if e.is(ErrorCode::AppNotRunning) => {}
            Err(e) => return Err(e),
        }

        let ws = automation.workspace.clone();
        ws.launch(bundle_id, automation.config.launch_hidden)?;

        let mut pid = None;
        let started = deadline::try_wait_until(deadline, || {
            pid = ws.running_pid(bundle_id)?;
            Ok(pid.is_some())
        })
        .await?;
        let pid = match (started, pid) {
            (true, Some(pid)) => pid,
            _ => {
                return Err(Error::launch_failed(
                    bundle_id,
                    "process did not appear before the deadline",
                ))
            }
        };

        info!(bundle_id, pid, "launched application");
        Ok((
            Self {
                bundle_id: bundle_id.to_string(),
                pid,
                workspace: ws,
            },
            true,
        ))
    }

    pub async fn wait_until_finished_launching(&self, deadline: Deadline) -> Result<()> {
        if deadline::wait_until(deadline, || self.workspace.is_finished_launching(self.pid)).await {
            Ok(())
        } else {
            Err(Error::launch_failed(
                &self.bundle_id,
                "did not finish launching before the deadline",
            ))
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.workspace.is_running(self.pid)
    }

    /// Accessibility root of the application.
    pub fn element(&self) -> Result<UIElement> {
        self.workspace.app_element(self.pid)
    }

    pub fn main_window(&self) -> Result<Window> {
        let app = self.element()?;
        let window = app
            .node()
            .main_window()?
            .map(UIElement::new)
            .ok_or_else(|| self.no_main_window())?;
        Window::wrap(window)
    }

    pub async fn wait_until_main_window(&self, deadline: Deadline) -> Result<Window> {
        let mut window = None;
        deadline::try_wait_until(deadline, || match self.main_window() {
            Ok(w) => {
                window = Some(w);
                Ok(true)
            }
            Err(e) if e.is(ErrorCode::NotAuthorized) => Err(e),
            Err(_) => Ok(false),
        })
        .await?;
        window.ok_or_else(|| self.no_main_window())
    }

    fn no_main_window(&self) -> Error {
        Error::control_not_found(&format!("main window of {}", self.bundle_id))
    }

    pub fn terminate(&self) -> Result<()> {
        info!(bundle_id = %self.bundle_id, pid = self.pid, "terminating application");
        self.workspace.terminate(self.pid)
    }
}

impl std::fmt::Debug for AutomationApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationApp")
            .field("bundle_id", &self.bundle_id)
            .field("pid", &self.pid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Role;
    use crate::mock::{MockTree, MockWorkspace};
    use std::time::Duration;

    const BUNDLE: &str = "com.example.settings";

    fn app_tree() -> MockTree {
        let tree = MockTree::new();
        tree.add(tree.root_id(), Role::Window).title("General");
        tree
    }

    #[tokio::test]
    async fn attaches_without_launching() {
        let ws = MockWorkspace::new();
        let pid = ws.install_running(BUNDLE, app_tree());
        let automation = Automation::new(Arc::new(ws.clone()), EngineConfig::default());

        let (app, launched) =
            AutomationApp::launch_or_attach(&automation, BUNDLE, Deadline::after_ms(500))
                .await
                .unwrap();
        assert!(!launched);
        assert_eq!(app.pid(), pid);
        assert_eq!(ws.launch_count(), 0);
    }

    #[tokio::test]
    async fn launches_and_waits_for_main_window() {
        let ws = MockWorkspace::new();
        ws.install(BUNDLE, app_tree());
        ws.set_launch_delay(BUNDLE, Duration::from_millis(40));
        let automation = Automation::new(Arc::new(ws.clone()), EngineConfig::default());

        let (app, launched) =
            AutomationApp::launch_or_attach(&automation, BUNDLE, Deadline::after_ms(1000))
                .await
                .unwrap();
        assert!(launched);
        app.wait_until_finished_launching(Deadline::after_ms(500)).await.unwrap();
        let window = app.wait_until_main_window(Deadline::after_ms(200)).await.unwrap();
        assert_eq!(window.title().as_deref(), Some("General"));
    }

    #[tokio::test]
    async fn launch_returns_before_startup_finishes() {
        let ws = MockWorkspace::new();
        ws.install(BUNDLE, app_tree());
        ws.set_launch_delay(BUNDLE, Duration::from_millis(600));
        let automation = Automation::new(Arc::new(ws.clone()), EngineConfig::default());

        let (app, launched) =
            AutomationApp::launch_or_attach(&automation, BUNDLE, Deadline::after_ms(150))
                .await
                .unwrap();
        assert!(launched);
        let err = app
            .wait_until_finished_launching(Deadline::after_ms(50))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LaunchFailed);
        assert!(app.is_running());
    }

    #[tokio::test]
    async fn lookup_failure_is_not_treated_as_not_running() {
        let ws = MockWorkspace::new();
        ws.install(BUNDLE, app_tree());
        ws.set_lookup_error(Some(Error::not_authorized()));
        let automation = Automation::new(Arc::new(ws.clone()), EngineConfig::default());

        let err = AutomationApp::launch_or_attach(&automation, BUNDLE, Deadline::after_ms(200))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAuthorized);
        assert_eq!(ws.launch_count(), 0);
    }

    #[tokio::test]
    async fn unknown_bundle_fails_to_launch() {
        let ws = MockWorkspace::new();
        let automation = Automation::new(Arc::new(ws), EngineConfig::default());
        let err = AutomationApp::launch_or_attach(&automation, BUNDLE, Deadline::after_ms(100))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LaunchFailed);
    }

    #[test]
    fn untrusted_process_is_rejected_up_front() {
        let ws = MockWorkspace::new();
        ws.set_trusted(false);
        let automation = Automation::new(Arc::new(ws), EngineConfig::default());
        assert_eq!(automation.ensure_authorized().unwrap_err().code, ErrorCode::NotAuthorized);
    }
}
