//! Pane navigation
//!
//! One destination is reached by a small state machine:
//!
//! ```text
//! Locating -> Activating -> AwaitingConfirmation -> Resolved
//!     \            \                  \
//!      `------------`------------------`--> Failed
//! ```
//!
//! Activation is never repeated: pressing an already activated control can
//! toggle it back. Anything that goes wrong ends in a single
//! `NAVIGATION_FAILED` error, except a missing accessibility permission,
//! which is passed through untouched.

use axsettings_core::controls::{Control, Row, Window};
use axsettings_core::deadline::{self, Deadline};
use axsettings_core::search;
use axsettings_core::{EngineConfig, Error, ErrorCode, Result, Role, UIElement};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How the control that opens a destination is found.
#[derive(Debug, Clone, PartialEq)]
pub enum Locate {
    Identifier(String),
    Label { role: Role, label: String },
    /// Match a leaf by identifier and activate its nearest `ancestor`.
    /// Used for virtualized lists, where the row is only reachable upward.
    Lineage { identifier: String, ancestor: Role },
}

/// The signal that the destination is showing.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    WindowTitle { title: String, prefix: bool },
    DetailText(String),
}

/// Where to search for the destination control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Window,
    Sidebar,
    Detail,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub name: String,
    pub locate: Locate,
    pub confirm: Confirmation,
    pub scope: Scope,
    /// If the row is already selected but the pane is not showing, walk
    /// back with the toolbar "Back" button instead of selecting it again.
    pub unwind_if_selected: bool,
}

impl Destination {
    pub fn new(name: impl Into<String>, locate: Locate, confirm: Confirmation) -> Self {
        Self {
            name: name.into(),
            locate,
            confirm,
            scope: Scope::Window,
            unwind_if_selected: false,
        }
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn unwinding(mut self) -> Self {
        self.unwind_if_selected = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavState {
    Locating,
    Activating,
    AwaitingConfirmation,
    Resolved,
    Failed,
}

/// The detail region after navigation. Re-resolve after any further
/// navigation; the UI may replace the region rather than update it.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    window: Window,
    detail: UIElement,
}

impl NavigationResult {
    pub fn resolve(window: &Window) -> Result<Self> {
        Ok(Self {
            window: window.clone(),
            detail: window.split_group()?.detail()?,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn detail(&self) -> &UIElement {
        &self.detail
    }

    pub fn refresh(&self) -> Result<Self> {
        Self::resolve(&self.window)
    }
}

pub struct PaneNavigator<'a> {
    config: &'a EngineConfig,
    trace: Vec<NavState>,
}

impl<'a> PaneNavigator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            trace: Vec::new(),
        }
    }

    /// Every state entered so far, across all destinations.
    pub fn trace(&self) -> &[NavState] {
        &self.trace
    }

    pub fn state(&self) -> Option<NavState> {
        self.trace.last().copied()
    }

    fn enter(&mut self, state: NavState, dest: &Destination) {
        debug!(destination = %dest.name, ?state, "navigation state");
        self.trace.push(state);
    }

    fn fail(&mut self, dest: &Destination, cause: Error) -> Error {
        let failed_in = self.state();
        self.trace.push(NavState::Failed);
        if cause.is(ErrorCode::NotAuthorized) {
            return cause;
        }
        warn!(destination = %dest.name, ?failed_in, error = %cause, "navigation failed");
        Error::navigation_failed(&dest.name, &cause.message).with_context(serde_json::json!({
            "destination": dest.name,
            "failed_in": failed_in,
            "cause": cause.code,
        }))
    }

    /// Visit each destination in order, all within one deadline.
    pub async fn follow(
        &mut self,
        window: &Window,
        route: &[Destination],
        deadline: Deadline,
    ) -> Result<NavigationResult> {
        for dest in route {
            self.navigate(window, dest, deadline).await?;
        }
        NavigationResult::resolve(window).map_err(|e| {
            Error::navigation_failed("detail pane", &e.message)
        })
    }

    pub async fn navigate(
        &mut self,
        window: &Window,
        dest: &Destination,
        deadline: Deadline,
    ) -> Result<NavigationResult> {
        let step = deadline.capped(self.config.step_timeout());

        self.enter(NavState::Locating, dest);
        if deadline.is_expired() {
            let cause = Error::new(
                ErrorCode::VerificationTimeout,
                "Deadline expired before navigation started",
            );
            return Err(self.fail(dest, cause));
        }
        let target = match self.locate(window, dest, step).await {
            Ok(t) => t,
            Err(e) => return Err(self.fail(dest, e)),
        };

        self.enter(NavState::Activating, dest);
        if let Err(e) = self.activate(window, dest, &target, step).await {
            return Err(self.fail(dest, e));
        }

        self.enter(NavState::AwaitingConfirmation, dest);
        if !deadline::wait_until(step, || confirmed(window, &dest.confirm)).await {
            let cause = Error::new(
                ErrorCode::VerificationTimeout,
                format!("{} did not appear", describe(&dest.confirm)),
            );
            return Err(self.fail(dest, cause));
        }

        match NavigationResult::resolve(window) {
            Ok(result) => {
                self.enter(NavState::Resolved, dest);
                info!(destination = %dest.name, "navigated");
                Ok(result)
            }
            Err(e) => Err(self.fail(dest, e)),
        }
    }

    async fn locate(
        &self,
        window: &Window,
        dest: &Destination,
        step: Deadline,
    ) -> Result<UIElement> {
        let mut found = None;
        deadline::try_wait_until(step, || match self.try_locate(window, dest) {
            Ok(Some(target)) => {
                found = Some(target);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) if e.is(ErrorCode::NotAuthorized) => Err(e),
            Err(_) => Ok(false),
        })
        .await?;
        found.ok_or_else(|| Error::control_not_found(&describe_locate(&dest.locate)))
    }

    fn try_locate(&self, window: &Window, dest: &Destination) -> Result<Option<UIElement>> {
        let root = match dest.scope {
            Scope::Window => window.element().clone(),
            Scope::Sidebar => window.split_group()?.sidebar()?,
            Scope::Detail => window.split_group()?.detail()?,
        };
        let depth = self.config.search_depth;

        Ok(match &dest.locate {
            Locate::Identifier(id) => search::first_descendant(
                &root,
                |e| e.identifier().as_deref() == Some(id.as_str()),
                depth,
            ),
            Locate::Label { role, label } => search::first_descendant(
                &root,
                |e| e.has_role(role) && e.label().as_deref() == Some(label.as_str()),
                depth,
            ),
            Locate::Lineage { identifier, ancestor } => search::first_descendant_with_lineage(
                &root,
                |e| e.identifier().as_deref() == Some(identifier.as_str()),
                depth,
            )
            .and_then(|lineage| lineage.nearest(ancestor).cloned()),
        })
    }

    async fn activate(
        &self,
        window: &Window,
        dest: &Destination,
        target: &UIElement,
        step: Deadline,
    ) -> Result<()> {
        if !target.has_role(&Role::Row) {
            return target.press();
        }

        let row = Row::wrap(target.clone())?;
        if !row.is_selected()? {
            return row.select();
        }
        if confirmed(window, &dest.confirm) {
            debug!(destination = %dest.name, "already showing");
            return Ok(());
        }
        if dest.unwind_if_selected {
            return self.unwind(window, dest, step).await;
        }
        row.select()
    }

    /// Press "Back" until the destination shows, a bounded number of times.
    async fn unwind(&self, window: &Window, dest: &Destination, step: Deadline) -> Result<()> {
        for press in 0..self.config.back_press_limit {
            if confirmed(window, &dest.confirm) {
                return Ok(());
            }
            let back = window
                .back_button()
                .ok_or_else(|| Error::control_not_found("toolbar Back button"))?;
            let before = window.title();
            debug!(destination = %dest.name, press, ?before, "pressing Back");
            back.press()?;
            let settle = step.capped(self.config.back_press_settle());
            deadline::wait_until(settle, || window.title() != before).await;
            if step.is_expired() {
                break;
            }
        }
        Ok(())
    }
}

/// Whether `confirm` currently holds in `window`.
pub fn confirmed(window: &Window, confirm: &Confirmation) -> bool {
    match confirm {
        Confirmation::WindowTitle { title, prefix } => match window.title() {
            Some(t) if *prefix => t.starts_with(title.as_str()),
            Some(t) => t == *title,
            None => false,
        },
        Confirmation::DetailText(text) => {
            let Ok(detail) = window.split_group().and_then(|s| s.detail()) else {
                return false;
            };
            search::first_descendant(
                &detail,
                |e| {
                    e.has_role(&Role::StaticText)
                        && (e.value_text().as_deref() == Some(text.as_str())
                            || e.title().as_deref() == Some(text.as_str()))
                },
                8,
            )
            .is_some()
        }
    }
}

fn describe(confirm: &Confirmation) -> String {
    match confirm {
        Confirmation::WindowTitle { title, prefix: true } => {
            format!("window title starting with '{}'", title)
        }
        Confirmation::WindowTitle { title, .. } => format!("window title '{}'", title),
        Confirmation::DetailText(text) => format!("text '{}' in detail pane", text),
    }
}

fn describe_locate(locate: &Locate) -> String {
    match locate {
        Locate::Identifier(id) => format!("id:{}", id),
        Locate::Label { role, label } => format!("role:{} AND label:{}", role, label),
        Locate::Lineage { identifier, ancestor } => {
            format!("{} containing id:{}", ancestor, identifier)
        }
    }
}
