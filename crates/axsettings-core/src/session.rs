//! Automation session: remembers which applications this script launched
//!
//! An application that was already running when the script attached to it is
//! never terminated by the session. Only applications recorded with
//! [`AutomationSession::mark_launched`] are closed by [`AutomationSession::end`].

use crate::apps::{Automation, AutomationApp};
use crate::deadline::Deadline;
use crate::error::Result;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Launched {
    bundle_id: String,
    pid: i32,
}

pub struct AutomationSession {
    automation: Automation,
    launched: Vec<Launched>,
}

impl AutomationSession {
    pub fn begin(automation: &Automation) -> Self {
        debug!("automation session started");
        Self {
            automation: automation.clone(),
            launched: Vec::new(),
        }
    }

    pub fn automation(&self) -> &Automation {
        &self.automation
    }

    pub fn mark_launched(&mut self, app: &AutomationApp) {
        if self.was_launched(app.bundle_id()) {
            return;
        }
        debug!(
            bundle_id = app.bundle_id(),
            pid = app.pid(),
            "marked as launched by session"
        );
        self.launched.push(Launched {
            bundle_id: app.bundle_id().to_string(),
            pid: app.pid(),
        });
    }

    /// Attach to `bundle_id` or launch it, then wait until it has finished
    /// launching. A launch is marked before the wait, so an app that starts
    /// too slowly for `deadline` is still closed by [`end`](Self::end).
    pub async fn launch_or_attach(
        &mut self,
        bundle_id: &str,
        deadline: Deadline,
    ) -> Result<(AutomationApp, bool)> {
        let (app, launched) =
            AutomationApp::launch_or_attach(&self.automation, bundle_id, deadline).await?;
        if launched {
            self.mark_launched(&app);
        }
        app.wait_until_finished_launching(deadline).await?;
        Ok((app, launched))
    }

    pub fn was_launched(&self, bundle_id: &str) -> bool {
        self.launched.iter().any(|l| l.bundle_id == bundle_id)
    }

    /// Terminate every application this session launched, then forget them.
    ///
    /// All marked applications are attempted even if one fails; the first
    /// error is returned. Calling `end` again is a no-op.
    pub fn end(&mut self) -> Result<Vec<String>> {
        let mut first_err = None;
        let mut closed = Vec::new();
        for app in self.launched.drain(..) {
            let ws = self.automation.workspace();
            if !ws.is_running(app.pid) {
                debug!(bundle_id = %app.bundle_id, "already gone");
                continue;
            }
            match ws.terminate(app.pid) {
                Ok(()) => closed.push(app.bundle_id),
                Err(e) => {
                    warn!(
                        bundle_id = %app.bundle_id,
                        error = %e,
                        "failed to terminate launched application"
                    );
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(closed),
        }
    }
}

impl Drop for AutomationSession {
    fn drop(&mut self) {
        if self.launched.is_empty() {
            return;
        }
        warn!(
            count = self.launched.len(),
            "session dropped without end(); closing launched applications"
        );
        let _ = self.end();
    }
}
