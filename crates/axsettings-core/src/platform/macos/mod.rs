//! macOS platform implementation
//!
//! Accessibility API (AX) via cidre; process control via `open`, System
//! Events and signals.

use super::{AxNode, Workspace};
use crate::element::{Action, AttrValue, Attribute, Role, UIElement};
use crate::error::{Error, Result};
use anyhow::Context;
use cidre::arc::R;
use cidre::{ax, cf};
use std::any::Any;
use std::process::Command;
use std::sync::Arc;

// AXError codes we branch on.
const AX_INVALID_ELEMENT: &str = "-25202";
const AX_ATTRIBUTE_UNSUPPORTED: &str = "-25205";
const AX_API_DISABLED: &str = "-25211";
const AX_NO_VALUE: &str = "-25212";

pub fn workspace() -> Arc<dyn Workspace> {
    Arc::new(MacWorkspace)
}

pub fn has_accessibility() -> bool {
    ax::is_process_trusted()
}

pub fn request_accessibility() -> bool {
    ax::is_process_trusted_with_prompt(true)
}

pub struct MacNode {
    el: R<ax::UiElement>,
}

// SAFETY: AXUIElementRef is an immutable CF handle; the AX API may be called
// from any thread and serializes access to the target process itself.
unsafe impl Send for MacNode {}
unsafe impl Sync for MacNode {}

impl MacNode {
    pub fn new(el: R<ax::UiElement>) -> Self {
        Self { el }
    }

    fn wrap(el: R<ax::UiElement>) -> Arc<dyn AxNode> {
        Arc::new(Self::new(el))
    }

    fn describe(&self) -> String {
        role_name(&self.el).unwrap_or_else(|| "element".to_string())
    }

    fn raw_attr(&self, name: &str) -> std::result::Result<Option<R<cf::Type>>, Error> {
        let key = cf::String::from_str(name);
        // ax::Attr is a transparent wrapper around cf::String.
        let attr: &ax::Attr = unsafe { std::mem::transmute(key.as_ref()) };
        match self.el.attr_value(attr) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                let code = format!("{:?}", e);
                if code.contains(AX_NO_VALUE) || code.contains(AX_ATTRIBUTE_UNSUPPORTED) {
                    Ok(None)
                } else {
                    Err(classify(&code, &self.describe(), name))
                }
            }
        }
    }

    fn element_attr(&self, name: &str) -> Result<Option<Arc<dyn AxNode>>> {
        Ok(self.raw_attr(name)?.and_then(|v| {
            if v.get_type_id() == ax::UiElement::type_id() {
                let el: &ax::UiElement = unsafe { std::mem::transmute(&*v) };
                Some(Self::wrap(el.retained()))
            } else {
                None
            }
        }))
    }
}

fn classify(code: &str, element: &str, what: &str) -> Error {
    if code.contains(AX_INVALID_ELEMENT) {
        Error::stale_element(element)
    } else if code.contains(AX_API_DISABLED) {
        Error::not_authorized()
    } else {
        Error::action_failed(what, code)
    }
}

fn role_name(el: &ax::UiElement) -> Option<String> {
    el.role().ok().map(|r| extract_role_name(&r))
}

/// Pull `AXSomething` out of the role's debug representation.
fn extract_role_name(role: &R<ax::Role>) -> String {
    let debug = format!("{:?}", role);
    if let Some(start) = debug.find("AX") {
        let rest = &debug[start..];
        let end = rest
            .find(|c| c == ')' || c == '"' || c == '}')
            .unwrap_or(rest.len());
        return rest[..end].to_string();
    }
    "Unknown".to_string()
}

fn to_attr_value(v: &cf::Type) -> Option<AttrValue> {
    let type_id = v.get_type_id();
    if type_id == cf::String::type_id() {
        let s: &cf::String = unsafe { std::mem::transmute(v) };
        Some(AttrValue::Text(s.to_string()))
    } else if type_id == cf::Boolean::type_id() {
        let b: &cf::Boolean = unsafe { std::mem::transmute(v) };
        Some(AttrValue::Bool(b.value()))
    } else if type_id == cf::Number::type_id() {
        let n: &cf::Number = unsafe { std::mem::transmute(v) };
        n.to_f64().map(AttrValue::Number)
    } else {
        None
    }
}

impl AxNode for MacNode {
    fn role(&self) -> Result<Role> {
        match self.el.role() {
            Ok(r) => Ok(Role::from_ax(&extract_role_name(&r))),
            Err(e) => Err(classify(&format!("{:?}", e), "element", "AXRole")),
        }
    }

    fn attribute(&self, attr: Attribute) -> Result<Option<AttrValue>> {
        Ok(self
            .raw_attr(attr.as_ax())?
            .and_then(|v| to_attr_value(&v)))
    }

    fn set_attribute(&self, attr: Attribute, value: &AttrValue) -> Result<()> {
        let key = cf::String::from_str(attr.as_ax());
        let key: &ax::Attr = unsafe { std::mem::transmute(key.as_ref()) };
        let mut el = self.el.retained();
        let res = match value {
            AttrValue::Bool(b) => {
                let v = if *b {
                    cf::Boolean::value_true()
                } else {
                    cf::Boolean::value_false()
                };
                el.set_attr(key, v)
            }
            AttrValue::Number(n) => el.set_attr(key, &cf::Number::from_f64(*n)),
            AttrValue::Text(t) => el.set_attr(key, &cf::String::from_str(t)),
        };
        res.map_err(|e| classify(&format!("{:?}", e), &self.describe(), attr.as_ax()))
    }

    fn children(&self) -> Result<Vec<Arc<dyn AxNode>>> {
        match self.el.children() {
            Ok(children) => Ok(children.iter().map(|c| Self::wrap(c.retained())).collect()),
            Err(e) => {
                let code = format!("{:?}", e);
                if code.contains(AX_NO_VALUE) || code.contains(AX_ATTRIBUTE_UNSUPPORTED) {
                    Ok(Vec::new())
                } else {
                    Err(classify(&code, &self.describe(), "AXChildren"))
                }
            }
        }
    }

    fn parent(&self) -> Result<Option<Arc<dyn AxNode>>> {
        self.element_attr("AXParent")
    }

    fn perform(&self, action: Action) -> Result<()> {
        let name = cf::String::from_str(action.as_ax());
        let action_ref: &ax::Action = unsafe { std::mem::transmute(name.as_ref()) };
        self.el
            .perform_action(action_ref)
            .map_err(|e| classify(&format!("{:?}", e), &self.describe(), action.as_ax()))
    }

    fn same_node(&self, other: &dyn AxNode) -> bool {
        other
            .as_any()
            .downcast_ref::<MacNode>()
            .map(|o| self.el.equal(&o.el))
            .unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn main_window(&self) -> Result<Option<Arc<dyn AxNode>>> {
        self.element_attr("AXMainWindow")
    }
}

pub struct MacWorkspace;

impl MacWorkspace {
    fn osascript(script: &str) -> anyhow::Result<Option<String>> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .context("Failed to run osascript")?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    }
}

impl Workspace for MacWorkspace {
    fn is_trusted(&self) -> bool {
        has_accessibility()
    }

    fn request_trust(&self) -> bool {
        request_accessibility()
    }

    fn running_pid(&self, bundle_id: &str) -> Result<Option<i32>> {
        let script = format!(
            concat!(
                r#"tell application "System Events" to get unix id of "#,
                r#"first process whose bundle identifier is "{}""#
            ),
            bundle_id.replace('"', "\\\"")
        );
        let pid = Self::osascript(&script)?.and_then(|out| out.parse::<i32>().ok());
        Ok(pid)
    }

    fn launch(&self, bundle_id: &str, hidden: bool) -> Result<()> {
        let mut cmd = Command::new("open");
        if hidden {
            cmd.args(["-g", "-j"]);
        }
        let status = cmd
            .arg("-b")
            .arg(bundle_id)
            .status()
            .context("Failed to spawn 'open'")?;
        if !status.success() {
            return Err(Error::launch_failed(bundle_id, "'open' returned non-zero exit status"));
        }
        Ok(())
    }

    fn is_finished_launching(&self, pid: i32) -> bool {
        ax::UiElement::with_app_pid(pid).role().is_ok()
    }

    fn is_running(&self, pid: i32) -> bool {
        unsafe { libc::kill(pid, 0) == 0 }
    }

    fn terminate(&self, pid: i32) -> Result<()> {
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            return Err(Error::from(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn app_element(&self, pid: i32) -> Result<UIElement> {
        if !has_accessibility() {
            return Err(Error::not_authorized());
        }
        let app = ax::UiElement::with_app_pid(pid);
        app.role()
            .map_err(|e| classify(&format!("{:?}", e), "application", "AXRole"))?;
        Ok(UIElement::new(MacNode::wrap(app)))
    }
}
