//! Typed control actuators
//!
//! Each actuator wraps one element and exposes the smallest set of reads and
//! mutations for its logical state. Locating a control that is not there is
//! `ControlNotFound`; a control that is there but refuses is `ActionFailed`.

use crate::deadline::{self, Deadline};
use crate::element::{Action, AttrValue, Attribute, Role, UIElement};
use crate::error::{Error, ErrorCode, Result};
use crate::locator::Locator;
use crate::search::{self, DEFAULT_DEPTH};
use crate::selector::Selector;
use serde::Serialize;
use tracing::debug;

pub trait Control: Sized {
    const ROLE: Role;

    fn from_element_unchecked(element: UIElement) -> Self;
    fn element(&self) -> &UIElement;

    /// Wrap `element` if it has the expected role.
    fn wrap(element: UIElement) -> Result<Self> {
        let role = element.role()?;
        if role != Self::ROLE {
            return Err(Error::control_not_found(&format!(
                "{} (found {} instead)",
                Self::ROLE,
                role
            )));
        }
        Ok(Self::from_element_unchecked(element))
    }

    /// First descendant of `root` with this role and identifier.
    fn locate(root: &UIElement, identifier: &str) -> Result<Self> {
        let selector = Selector::role(&Self::ROLE).and(Selector::identifier(identifier));
        Locator::new(root.clone(), selector)
            .find_first()
            .map(Self::from_element_unchecked)
    }

    /// First descendant of `root` with this role whose title or description is `label`.
    fn locate_labeled(root: &UIElement, label: &str) -> Result<Self> {
        let selector = Selector::role(&Self::ROLE).and(Selector::label(label));
        Locator::new(root.clone(), selector)
            .find_first()
            .map(Self::from_element_unchecked)
    }
}

macro_rules! control {
    ($name:ident, $role:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name(UIElement);

        impl Control for $name {
            const ROLE: Role = $role;

            fn from_element_unchecked(element: UIElement) -> Self {
                Self(element)
            }

            fn element(&self) -> &UIElement {
                &self.0
            }
        }
    };
}

control!(Checkbox, Role::CheckBox);
control!(Slider, Role::Slider);
control!(PopUpButton, Role::PopUpButton);
control!(RadioGroup, Role::RadioGroup);
control!(Row, Role::Row);
control!(Button, Role::Button);
control!(SplitGroup, Role::SplitGroup);
control!(Window, Role::Window);

impl Checkbox {
    pub fn get(&self) -> Result<bool> {
        self.0.flag(Attribute::Value)
    }

    /// Press only when the current state differs. Does not wait for the change.
    pub fn set(&self, on: bool) -> Result<()> {
        if self.get()? == on {
            debug!(checkbox = %self.0, on, "already in requested state");
            return Ok(());
        }
        self.0.press()
    }
}

/// How far a slider was moved to reach its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SliderTravel {
    pub increments: usize,
    pub decrements: usize,
    /// Size of the last observed step, once the slider has moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

const STEP_TOLERANCE: f64 = 1e-9;

impl Slider {
    pub fn get(&self) -> Result<f64> {
        self.0.number(Attribute::Value)
    }

    pub fn min(&self) -> Result<f64> {
        self.0.number(Attribute::MinValue)
    }

    pub fn max(&self) -> Result<f64> {
        self.0.number(Attribute::MaxValue)
    }

    pub fn increment(&self) -> Result<()> {
        self.0.perform(Action::Increment)
    }

    pub fn decrement(&self) -> Result<()> {
        self.0.perform(Action::Decrement)
    }

    /// Step toward `target` and stop on the reachable value nearest to it.
    ///
    /// Direct assignment of the value is not honoured by every OS release,
    /// so this only ever increments or decrements. Each step waits for the
    /// value to move before the next one. Stepping stops once the value
    /// reaches or crosses the target; if the value before the crossing was
    /// strictly closer, one step back is taken. On a tie the crossed value is
    /// kept.
    pub async fn step_toward(&self, target: f64, deadline: Deadline) -> Result<SliderTravel> {
        let (min, max) = (self.min()?, self.max()?);
        if target < min || target > max {
            return Err(Error::unsupported(format!(
                "Slider target {} is outside [{}, {}]",
                target, min, max
            ))
            .with_context(serde_json::json!({ "slider": self.0.info() })));
        }

        let mut travel = SliderTravel::default();
        let mut current = self.get()?;
        let up = target > current;
        let mut before = None;

        while (up && current < target) || (!up && current > target) {
            before = Some(current);
            current = self.nudge(up, current, target, &mut travel, deadline).await?;
        }

        if let Some(before) = before {
            if (before - target).abs() + STEP_TOLERANCE < (current - target).abs() {
                current = self.nudge(!up, current, target, &mut travel, deadline).await?;
            }
        }

        debug!(slider = %self.0, target, value = current, ?travel, "slider settled");
        Ok(travel)
    }

    /// One increment or decrement, then wait for the value to move.
    async fn nudge(
        &self,
        up: bool,
        from: f64,
        target: f64,
        travel: &mut SliderTravel,
        deadline: Deadline,
    ) -> Result<f64> {
        if deadline.is_expired() {
            return Err(Error::new(
                ErrorCode::VerificationTimeout,
                format!("Deadline expired before slider reached {} (at {})", target, from),
            ));
        }
        if up {
            self.increment()?;
            travel.increments += 1;
        } else {
            self.decrement()?;
            travel.decrements += 1;
        }

        let mut observed = from;
        let moved = deadline::try_wait_until(deadline, || {
            observed = self.get()?;
            Ok(observed != from)
        })
        .await?;
        if !moved {
            return Err(Error::action_failed(
                if up { "increment" } else { "decrement" },
                &format!("slider stayed at {}", from),
            ));
        }
        travel.step = Some((observed - from).abs());
        Ok(observed)
    }
}

impl PopUpButton {
    /// The option currently shown.
    pub fn get(&self) -> Result<String> {
        match self.0.attribute(Attribute::Value)? {
            Some(AttrValue::Text(t)) => Ok(t),
            _ => self
                .0
                .title()
                .ok_or_else(|| Error::value_unavailable(&self.0.to_string())),
        }
    }

    /// Choose the menu item whose display text is exactly `option`.
    pub async fn set(&self, option: &str, deadline: Deadline) -> Result<()> {
        if self.get()? == option {
            debug!(popup = %self.0, option, "already showing option");
            return Ok(());
        }

        self.0.press()?;
        let item = Locator::new(
            self.0.clone(),
            Selector::role(&Role::MenuItem).and(Selector::title(option)),
        )
        .depth(3)
        .wait(deadline)
        .await;

        match item {
            Ok(item) => item.press(),
            Err(e) => {
                // Leave the menu closed before reporting.
                if let Some(menu) = search::first_child(&self.0, &Role::Menu) {
                    let _ = menu.perform(Action::Cancel);
                }
                Err(e)
            }
        }
    }

    pub fn options(&self) -> Vec<String> {
        search::all_descendants(&self.0, |e| e.has_role(&Role::MenuItem), 3)
            .into_iter()
            .filter_map(|e| e.title())
            .collect()
    }
}

impl RadioGroup {
    fn buttons(&self) -> Vec<UIElement> {
        search::children_with_role(&self.0, &Role::RadioButton)
    }

    pub fn selected(&self) -> Result<Option<String>> {
        for button in self.buttons() {
            if button.flag(Attribute::Value).unwrap_or(false) {
                return Ok(button.label());
            }
        }
        Ok(None)
    }

    pub fn labels(&self) -> Vec<String> {
        self.buttons().into_iter().filter_map(|b| b.label()).collect()
    }

    /// Press the child radio button labelled `label`.
    pub fn select(&self, label: &str) -> Result<()> {
        if self.selected()?.as_deref() == Some(label) {
            return Ok(());
        }
        let button = self
            .buttons()
            .into_iter()
            .find(|b| b.label().as_deref() == Some(label))
            .ok_or_else(|| {
                Error::control_not_found(&format!("radio button '{}'", label))
                    .with_context(serde_json::json!({ "available": self.labels() }))
            })?;
        button.press()
    }
}

impl Row {
    pub fn is_selected(&self) -> Result<bool> {
        Ok(self
            .0
            .attribute(Attribute::Selected)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub fn select(&self) -> Result<()> {
        self.0.set_attribute(Attribute::Selected, AttrValue::Bool(true))
    }
}

impl Button {
    pub fn press(&self) -> Result<()> {
        self.0.press()
    }
}

impl SplitGroup {
    /// Children grouped into the regions between splitters.
    pub fn sections(&self) -> Vec<Vec<UIElement>> {
        let mut sections = vec![Vec::new()];
        for child in self.0.children() {
            if child.has_role(&Role::Splitter) {
                sections.push(Vec::new());
            } else if let Some(last) = sections.last_mut() {
                last.push(child);
            }
        }
        sections.retain(|s| !s.is_empty());
        sections
    }

    fn region(&self, section: Option<&Vec<UIElement>>, name: &str) -> Result<UIElement> {
        section
            .and_then(|s| {
                s.iter()
                    .find(|e| e.has_role(&Role::Group))
                    .or_else(|| s.first())
                    .cloned()
            })
            .ok_or_else(|| Error::control_not_found(&format!("{} of split view", name)))
    }

    pub fn sidebar(&self) -> Result<UIElement> {
        let sections = self.sections();
        if sections.len() < 2 {
            return Err(Error::control_not_found("sidebar of split view"));
        }
        self.region(sections.first(), "sidebar")
    }

    pub fn detail(&self) -> Result<UIElement> {
        self.region(self.sections().last(), "detail")
    }
}

impl Window {
    pub fn title(&self) -> Option<String> {
        self.0.title()
    }

    /// The main split view: window > group > split group in System Settings.
    pub fn split_group(&self) -> Result<SplitGroup> {
        search::first_descendant(&self.0, |e| e.has_role(&Role::SplitGroup), 4)
            .map(SplitGroup)
            .ok_or_else(|| Error::control_not_found("split view in window"))
    }

    /// The toolbar "Back" button, if the window has one.
    pub fn back_button(&self) -> Option<Button> {
        let back = Selector::role(&Role::Button).and(Selector::description("Back"));
        search::first_descendant(&self.0, |e| back.matches(e), DEFAULT_DEPTH).map(Button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Effect, MockTree, Trigger};

    fn slider_tree(value: f64) -> (MockTree, crate::mock::NodeId) {
        let tree = MockTree::new();
        let id = tree
            .add(tree.root_id(), Role::Slider)
            .identifier("AX_CURSOR_SIZE")
            .value(value)
            .range(0.0, 10.0)
            .on(Trigger::Perform(Action::Increment), Effect::step(1.0))
            .on(Trigger::Perform(Action::Decrement), Effect::step(-1.0))
            .id();
        (tree, id)
    }

    #[test]
    fn checkbox_presses_only_when_different() {
        let tree = MockTree::new();
        let id = tree
            .add(tree.root_id(), Role::CheckBox)
            .identifier("AX_REDUCE_MOTION")
            .value(true)
            .on(Trigger::Perform(Action::Press), Effect::toggle())
            .id();
        let cb = Checkbox::locate(&tree.root(), "AX_REDUCE_MOTION").unwrap();

        cb.set(true).unwrap();
        assert_eq!(tree.mutations(), 0);
        cb.set(false).unwrap();
        assert_eq!(tree.performed(id, Action::Press), 1);
        assert!(!cb.get().unwrap());
    }

    #[test]
    fn wrong_role_is_control_not_found() {
        let tree = MockTree::new();
        let id = tree.add(tree.root_id(), Role::Button).id();
        let err = Checkbox::wrap(tree.element(id)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ControlNotFound);
        let err = Slider::locate(&tree.root(), "AX_CURSOR_SIZE").unwrap_err();
        assert_eq!(err.code, ErrorCode::ControlNotFound);
    }

    #[tokio::test]
    async fn slider_steps_up_exactly_to_target() {
        let (tree, id) = slider_tree(3.0);
        let slider = Slider::locate(&tree.root(), "AX_CURSOR_SIZE").unwrap();

        let travel = slider.step_toward(7.0, Deadline::after_ms(2000)).await.unwrap();
        assert_eq!(
            travel,
            SliderTravel {
                increments: 4,
                decrements: 0,
                step: Some(1.0)
            }
        );
        assert_eq!(tree.performed(id, Action::Increment), 4);
        assert_eq!(tree.performed(id, Action::Decrement), 0);
        assert_eq!(slider.get().unwrap(), 7.0);
    }

    #[tokio::test]
    async fn slider_keeps_crossed_value_when_it_is_nearest() {
        let tree = MockTree::new();
        let id = tree
            .add(tree.root_id(), Role::Slider)
            .value(1.0)
            .range(0.0, 4.0)
            .on(Trigger::Perform(Action::Decrement), Effect::step(-0.75))
            .id();
        let slider = Slider::wrap(tree.element(id)).unwrap();

        let travel = slider.step_toward(0.4, Deadline::after_ms(2000)).await.unwrap();
        assert_eq!(travel.decrements, 1);
        assert_eq!(travel.increments, 0);
        assert_eq!(slider.get().unwrap(), 0.25);
    }

    #[tokio::test]
    async fn slider_steps_back_when_the_value_before_the_crossing_was_nearer() {
        let (tree, id) = slider_tree(3.0);
        let slider = Slider::locate(&tree.root(), "AX_CURSOR_SIZE").unwrap();

        let travel = slider.step_toward(6.2, Deadline::after_ms(2000)).await.unwrap();
        assert_eq!((travel.increments, travel.decrements), (4, 1));
        assert_eq!(tree.performed(id, Action::Decrement), 1);
        assert_eq!(slider.get().unwrap(), 6.0);

        // Halfway between two steps the crossed value stays.
        let (tree, id) = slider_tree(3.0);
        let slider = Slider::locate(&tree.root(), "AX_CURSOR_SIZE").unwrap();
        slider.step_toward(6.5, Deadline::after_ms(2000)).await.unwrap();
        assert_eq!(slider.get().unwrap(), 7.0);
        assert_eq!(tree.performed(id, Action::Decrement), 0);
    }

    #[tokio::test]
    async fn slider_target_out_of_range_is_unsupported() {
        let (tree, _) = slider_tree(3.0);
        let slider = Slider::locate(&tree.root(), "AX_CURSOR_SIZE").unwrap();
        let err = slider.step_toward(11.0, Deadline::after_ms(500)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unsupported);
        assert_eq!(tree.mutations(), 0);
    }

    #[tokio::test]
    async fn slider_that_does_not_move_fails_the_action() {
        let tree = MockTree::new();
        let id = tree
            .add(tree.root_id(), Role::Slider)
            .value(2.0)
            .range(0.0, 10.0)
            .id();
        let slider = Slider::wrap(tree.element(id)).unwrap();
        let err = slider.step_toward(5.0, Deadline::after_ms(100)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ActionFailed);
        assert_eq!(tree.performed(id, Action::Increment), 1);
    }

    #[tokio::test]
    async fn popup_picks_by_display_text() {
        let tree = MockTree::new();
        let (popup_id, items) = tree.popup(
            tree.root_id(),
            "AX_COLOR_FILTER_TYPE",
            &["Grayscale", "Red/Green filter (Protanopia)", "Color Tint"],
            "Grayscale",
        );
        let popup = PopUpButton::locate(&tree.root(), "AX_COLOR_FILTER_TYPE").unwrap();

        popup.set("Color Tint", Deadline::after_ms(500)).await.unwrap();
        assert_eq!(popup.get().unwrap(), "Color Tint");
        assert_eq!(tree.performed(popup_id, Action::Press), 1);
        assert_eq!(tree.performed(items[2], Action::Press), 1);

        let err = popup.set("Sepia", Deadline::after_ms(60)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ControlNotFound);
        assert_eq!(tree.count(Action::Cancel), 1);
    }

    #[test]
    fn radio_group_selects_by_label() {
        let tree = MockTree::new();
        let modes = ["Classic", "Smart"];
        let (_, buttons) =
            tree.radio_group(tree.root_id(), "AX_INVERT_COLOR_MODE", &modes, Some("Smart"));
        let group = RadioGroup::locate(&tree.root(), "AX_INVERT_COLOR_MODE").unwrap();

        assert_eq!(group.selected().unwrap().as_deref(), Some("Smart"));
        group.select("Smart").unwrap();
        assert_eq!(tree.mutations(), 0);

        group.select("Classic").unwrap();
        assert_eq!(group.selected().unwrap().as_deref(), Some("Classic"));
        assert_eq!(tree.performed(buttons[0], Action::Press), 1);

        let err = group.select("Inverted").unwrap_err();
        assert_eq!(err.code, ErrorCode::ControlNotFound);
    }

    #[test]
    fn rejected_press_is_action_failed() {
        let tree = MockTree::new();
        tree.add(tree.root_id(), Role::CheckBox)
            .identifier("AX_FIND_CURSOR")
            .value(false)
            .rejecting(Action::Press);
        let cb = Checkbox::locate(&tree.root(), "AX_FIND_CURSOR").unwrap();
        assert_eq!(cb.set(true).unwrap_err().code, ErrorCode::ActionFailed);
    }

    #[test]
    fn split_group_sections_split_at_splitters() {
        let tree = MockTree::new();
        let split = tree.add(tree.root_id(), Role::SplitGroup).id();
        let sidebar = tree.add(split, Role::Group).identifier("sidebar").id();
        tree.add(split, Role::Splitter);
        let detail = tree.add(split, Role::Group).identifier("detail").id();

        let group = SplitGroup::wrap(tree.element(split)).unwrap();
        assert_eq!(group.sections().len(), 2);
        assert!(group.sidebar().unwrap().same_as(&tree.element(sidebar)));
        assert!(group.detail().unwrap().same_as(&tree.element(detail)));
    }

    #[test]
    fn row_select_assigns_selected() {
        let tree = MockTree::new();
        let id = tree.add(tree.root_id(), Role::Row).selected(false).id();
        let row = Row::wrap(tree.element(id)).unwrap();
        assert!(!row.is_selected().unwrap());
        row.select().unwrap();
        assert!(row.is_selected().unwrap());
    }

    #[test]
    fn window_finds_back_button() {
        let tree = MockTree::new();
        let win = tree.add(tree.root_id(), Role::Window).title("Display").id();
        let toolbar = tree.add(win, Role::Toolbar).id();
        tree.add(toolbar, Role::Button).description("Back");
        let window = Window::wrap(tree.element(win)).unwrap();
        assert!(window.back_button().is_some());
        assert_eq!(window.title().as_deref(), Some("Display"));
    }
}
