//! UI element handle with typed roles and attributes

use crate::error::{Error, Result};
use crate::platform::AxNode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Closed set of roles the engine reasons about. Anything else is `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Application,
    Window,
    Sheet,
    Group,
    Button,
    CheckBox,
    Slider,
    PopUpButton,
    Menu,
    MenuItem,
    RadioGroup,
    RadioButton,
    Row,
    Cell,
    StaticText,
    SplitGroup,
    Splitter,
    Toolbar,
    ScrollArea,
    Outline,
    Table,
    List,
    TextField,
    Image,
    Other(String),
}

impl Role {
    const KNOWN: &'static [(Role, &'static str)] = &[
        (Role::Application, "AXApplication"),
        (Role::Window, "AXWindow"),
        (Role::Sheet, "AXSheet"),
        (Role::Group, "AXGroup"),
        (Role::Button, "AXButton"),
        (Role::CheckBox, "AXCheckBox"),
        (Role::Slider, "AXSlider"),
        (Role::PopUpButton, "AXPopUpButton"),
        (Role::Menu, "AXMenu"),
        (Role::MenuItem, "AXMenuItem"),
        (Role::RadioGroup, "AXRadioGroup"),
        (Role::RadioButton, "AXRadioButton"),
        (Role::Row, "AXRow"),
        (Role::Cell, "AXCell"),
        (Role::StaticText, "AXStaticText"),
        (Role::SplitGroup, "AXSplitGroup"),
        (Role::Splitter, "AXSplitter"),
        (Role::Toolbar, "AXToolbar"),
        (Role::ScrollArea, "AXScrollArea"),
        (Role::Outline, "AXOutline"),
        (Role::Table, "AXTable"),
        (Role::List, "AXList"),
        (Role::TextField, "AXTextField"),
        (Role::Image, "AXImage"),
    ];

    /// Accepts both `AXCheckBox` and `CheckBox`, case-insensitively.
    pub fn from_ax(name: &str) -> Self {
        let bare = name.strip_prefix("AX").unwrap_or(name);
        Self::KNOWN
            .iter()
            .find(|(_, ax)| ax[2..].eq_ignore_ascii_case(bare))
            .map(|(role, _)| role.clone())
            .unwrap_or_else(|| Role::Other(name.to_string()))
    }

    pub fn as_ax(&self) -> String {
        match self {
            Role::Other(name) => name.clone(),
            known => Self::KNOWN
                .iter()
                .find(|(role, _)| role == known)
                .map(|(_, ax)| ax.to_string())
                .unwrap_or_default(),
        }
    }

    /// Role name without the `AX` prefix.
    pub fn name(&self) -> String {
        let ax = self.as_ax();
        ax.strip_prefix("AX").map(str::to_string).unwrap_or(ax)
    }

    /// Whether `attr` is meaningful for nodes of this role.
    pub fn supports(&self, attr: Attribute) -> bool {
        match attr {
            Attribute::MinValue | Attribute::MaxValue => {
                matches!(self, Role::Slider | Role::Other(_))
            }
            Attribute::Selected => matches!(
                self,
                Role::Row | Role::Cell | Role::RadioButton | Role::MenuItem | Role::Other(_)
            ),
            Attribute::Value => !matches!(
                self,
                Role::Application | Role::Window | Role::Sheet | Role::Menu | Role::Toolbar
            ),
            _ => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Title,
    Description,
    Value,
    MinValue,
    MaxValue,
    Enabled,
    Selected,
    Identifier,
    RoleDescription,
}

impl Attribute {
    pub fn as_ax(&self) -> &'static str {
        match self {
            Attribute::Title => "AXTitle",
            Attribute::Description => "AXDescription",
            Attribute::Value => "AXValue",
            Attribute::MinValue => "AXMinValue",
            Attribute::MaxValue => "AXMaxValue",
            Attribute::Enabled => "AXEnabled",
            Attribute::Selected => "AXSelected",
            Attribute::Identifier => "AXIdentifier",
            Attribute::RoleDescription => "AXRoleDescription",
        }
    }
}

/// Tagged attribute value as read from the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttrValue {
    /// Checkboxes report their state as 0/1, so numbers count too.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            AttrValue::Number(n) => Some(*n != 0.0),
            AttrValue::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttrValue::Text(t) => t.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<&str> for AttrValue {
    fn from(t: &str) -> Self {
        AttrValue::Text(t.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(t: String) -> Self {
        AttrValue::Text(t)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Press,
    Increment,
    Decrement,
    ShowMenu,
    Pick,
    Cancel,
    Confirm,
}

impl Action {
    pub fn as_ax(&self) -> &'static str {
        match self {
            Action::Press => "AXPress",
            Action::Increment => "AXIncrement",
            Action::Decrement => "AXDecrement",
            Action::ShowMenu => "AXShowMenu",
            Action::Pick => "AXPick",
            Action::Cancel => "AXCancel",
            Action::Confirm => "AXConfirm",
        }
    }
}

/// Handle to one live node. Cheap to clone; may go stale at any time.
#[derive(Clone)]
pub struct UIElement {
    inner: Arc<dyn AxNode>,
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UIElement {
    pub fn new(inner: Arc<dyn AxNode>) -> Self {
        Self { inner, index: None }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn node(&self) -> &dyn AxNode {
        self.inner.as_ref()
    }

    pub fn role(&self) -> Result<Role> {
        self.inner.role()
    }

    /// Role, or `None` if the node went away. For search predicates.
    pub fn role_lossy(&self) -> Option<Role> {
        self.inner.role().ok()
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.role_lossy().as_ref() == Some(role)
    }

    /// Typed attribute read. `Ok(None)` means the node has no value for it.
    pub fn attribute(&self, attr: Attribute) -> Result<Option<AttrValue>> {
        let role = self.inner.role()?;
        if !role.supports(attr) {
            return Err(Error::invalid_attribute(attr.as_ax(), &role.name()));
        }
        self.inner.attribute(attr)
    }

    pub fn set_attribute(&self, attr: Attribute, value: AttrValue) -> Result<()> {
        let role = self.inner.role()?;
        if !role.supports(attr) {
            return Err(Error::invalid_attribute(attr.as_ax(), &role.name()));
        }
        self.inner.set_attribute(attr, &value)
    }

    /// Numeric attribute, erroring when absent or not a number.
    pub fn number(&self, attr: Attribute) -> Result<f64> {
        self.attribute(attr)?
            .and_then(|v| v.as_f64())
            .ok_or_else(|| Error::value_unavailable(&format!("{} of {}", attr.as_ax(), self)))
    }

    pub fn flag(&self, attr: Attribute) -> Result<bool> {
        self.attribute(attr)?
            .and_then(|v| v.as_bool())
            .ok_or_else(|| Error::value_unavailable(&format!("{} of {}", attr.as_ax(), self)))
    }

    fn text_attr(&self, attr: Attribute) -> Option<String> {
        match self.inner.attribute(attr) {
            Ok(Some(AttrValue::Text(t))) => Some(t),
            Ok(Some(other)) if attr == Attribute::Value => Some(other.to_string()),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<String> {
        self.text_attr(Attribute::Title)
    }

    pub fn description(&self) -> Option<String> {
        self.text_attr(Attribute::Description)
    }

    pub fn identifier(&self) -> Option<String> {
        self.text_attr(Attribute::Identifier)
    }

    /// Value rendered as text, whatever its underlying type.
    pub fn value_text(&self) -> Option<String> {
        self.text_attr(Attribute::Value)
    }

    /// Visible label: title, then description, then value.
    pub fn label(&self) -> Option<String> {
        self.title()
            .filter(|t| !t.is_empty())
            .or_else(|| self.description().filter(|d| !d.is_empty()))
            .or_else(|| self.value_text())
    }

    pub fn children(&self) -> Vec<UIElement> {
        self.try_children().unwrap_or_default()
    }

    pub fn try_children(&self) -> Result<Vec<UIElement>> {
        Ok(self
            .inner
            .children()?
            .into_iter()
            .map(UIElement::new)
            .collect())
    }

    /// Structural parent. Virtualized rows may not report one.
    pub fn parent(&self) -> Option<UIElement> {
        self.inner.parent().ok().flatten().map(UIElement::new)
    }

    pub fn perform(&self, action: Action) -> Result<()> {
        tracing::debug!(element = %self, action = action.as_ax(), "perform");
        self.inner.perform(action)
    }

    pub fn press(&self) -> Result<()> {
        self.perform(Action::Press)
    }

    pub fn same_as(&self, other: &UIElement) -> bool {
        self.inner.same_node(other.inner.as_ref())
    }

    pub fn info(&self) -> ElementInfo {
        ElementInfo {
            index: self.index,
            role: self
                .role_lossy()
                .map(|r| r.name())
                .unwrap_or_else(|| "Unknown".to_string()),
            identifier: self.identifier(),
            title: self.title(),
            value: self.value_text(),
            description: self.description(),
        }
    }
}

impl fmt::Display for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = self
            .role_lossy()
            .map(|r| r.name())
            .unwrap_or_else(|| "?".to_string());
        match self.identifier().or_else(|| self.label()) {
            Some(name) => write!(f, "{}({})", role, name),
            None => f.write_str(&role),
        }
    }
}

impl fmt::Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("role", &self.role_lossy())
            .field("identifier", &self.identifier())
            .field("title", &self.title())
            .finish()
    }
}
