//! In-memory accessibility tree and workspace
//!
//! `MockTree` behaves like a live tree: nodes can be mutated or removed from
//! outside, actions trigger (optionally delayed) effects, and virtualized
//! nodes can hide their parent link. Every perform and assignment is logged.

use crate::element::{Action, AttrValue, Attribute, Role, UIElement};
use crate::error::{Error, Result};
use crate::platform::{AxNode, Workspace};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Perform(Action),
    Assign(Attribute),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Perform(Action),
    Assign(Attribute, AttrValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub node: NodeId,
    pub interaction: Interaction,
}

/// What happens to the tree after a trigger fires.
#[derive(Debug, Clone)]
pub struct Effect {
    kind: EffectKind,
    delay: Duration,
}

#[derive(Debug, Clone)]
enum EffectKind {
    /// Flip the boolean value of the target (the triggering node if `None`).
    Toggle(Option<NodeId>),
    /// Add to the numeric value, clamped to min/max when present.
    Step(Option<NodeId>, f64),
    Set(NodeId, Attribute, AttrValue),
    Remove(NodeId),
}

impl Effect {
    pub fn toggle() -> Self {
        Self::now(EffectKind::Toggle(None))
    }

    pub fn step(by: f64) -> Self {
        Self::now(EffectKind::Step(None, by))
    }

    pub fn set(target: NodeId, attr: Attribute, value: impl Into<AttrValue>) -> Self {
        Self::now(EffectKind::Set(target, attr, value.into()))
    }

    pub fn remove(target: NodeId) -> Self {
        Self::now(EffectKind::Remove(target))
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn now(kind: EffectKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
        }
    }
}

struct NodeData {
    role: Role,
    attrs: HashMap<Attribute, AttrValue>,
    children: Vec<usize>,
    parent: Option<usize>,
    linked: bool,
    removed: bool,
    effects: Vec<(Trigger, Effect)>,
    rejects: Vec<Action>,
}

impl NodeData {
    fn new(role: Role, parent: Option<usize>) -> Self {
        Self {
            role,
            attrs: HashMap::new(),
            children: Vec::new(),
            parent,
            linked: true,
            removed: false,
            effects: Vec::new(),
            rejects: Vec::new(),
        }
    }
}

struct Pending {
    due: Instant,
    source: usize,
    kind: EffectKind,
}

struct State {
    nodes: Vec<NodeData>,
    log: Vec<InteractionRecord>,
    pending: Vec<Pending>,
}

impl State {
    /// Apply every delayed effect whose time has come, oldest first.
    fn settle(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|p| p.due <= now);
        self.pending = later;
        let mut due = due;
        due.sort_by_key(|p| p.due);
        for p in due {
            self.apply(p.source, &p.kind);
        }
    }

    fn alive(&self, id: usize) -> Result<&NodeData> {
        match self.nodes.get(id) {
            Some(n) if !n.removed => Ok(n),
            _ => Err(Error::stale_element(&format!("mock node {}", id))),
        }
    }

    fn fire(&mut self, source: usize, trigger: Trigger) {
        let effects: Vec<Effect> = self.nodes[source]
            .effects
            .iter()
            .filter(|(t, _)| *t == trigger)
            .map(|(_, e)| e.clone())
            .collect();
        for effect in effects {
            if effect.delay.is_zero() {
                self.apply(source, &effect.kind);
            } else {
                self.pending.push(Pending {
                    due: Instant::now() + effect.delay,
                    source,
                    kind: effect.kind,
                });
            }
        }
    }

    fn apply(&mut self, source: usize, kind: &EffectKind) {
        match kind {
            EffectKind::Toggle(target) => {
                let id = target.map(|t| t.0).unwrap_or(source);
                let node = &mut self.nodes[id];
                let current = node
                    .attrs
                    .get(&Attribute::Value)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                node.attrs.insert(Attribute::Value, AttrValue::Bool(!current));
            }
            EffectKind::Step(target, by) => {
                let id = target.map(|t| t.0).unwrap_or(source);
                let node = &mut self.nodes[id];
                let num = |a: Attribute| node.attrs.get(&a).and_then(|v| v.as_f64());
                let mut next = num(Attribute::Value).unwrap_or(0.0) + by;
                if let Some(max) = num(Attribute::MaxValue) {
                    next = next.min(max);
                }
                if let Some(min) = num(Attribute::MinValue) {
                    next = next.max(min);
                }
                node.attrs.insert(Attribute::Value, AttrValue::Number(next));
            }
            EffectKind::Set(target, attr, value) => {
                self.nodes[target.0].attrs.insert(*attr, value.clone());
            }
            EffectKind::Remove(target) => self.remove(target.0),
        }
    }

    fn remove(&mut self, id: usize) {
        let children = std::mem::take(&mut self.nodes[id].children);
        self.nodes[id].removed = true;
        for child in children {
            self.remove(child);
        }
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|c| *c != id);
        }
    }
}

/// Shared handle to a mock tree. Clones see the same nodes.
#[derive(Clone)]
pub struct MockTree {
    state: Arc<Mutex<State>>,
}

pub struct MockNode {
    state: Arc<Mutex<State>>,
    id: usize,
}

impl MockTree {
    /// A tree with a single `Application` root.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                nodes: vec![NodeData::new(Role::Application, None)],
                log: Vec::new(),
                pending: Vec::new(),
            })),
        }
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> UIElement {
        self.element(self.root_id())
    }

    pub fn element(&self, id: NodeId) -> UIElement {
        UIElement::new(Arc::new(MockNode {
            state: self.state.clone(),
            id: id.0,
        }))
    }

    pub fn add(&self, parent: NodeId, role: Role) -> NodeBuilder<'_> {
        let mut state = self.state.lock();
        let id = state.nodes.len();
        state.nodes.push(NodeData::new(role, Some(parent.0)));
        state.nodes[parent.0].children.push(id);
        NodeBuilder {
            tree: self,
            id: NodeId(id),
        }
    }

    pub fn on(&self, id: NodeId, trigger: Trigger, effect: Effect) {
        self.state.lock().nodes[id.0].effects.push((trigger, effect));
    }

    /// External change, not logged as an interaction.
    pub fn set(&self, id: NodeId, attr: Attribute, value: impl Into<AttrValue>) {
        let mut state = self.state.lock();
        state.settle();
        state.nodes[id.0].attrs.insert(attr, value.into());
    }

    pub fn get(&self, id: NodeId, attr: Attribute) -> Option<AttrValue> {
        let mut state = self.state.lock();
        state.settle();
        state.nodes[id.0].attrs.get(&attr).cloned()
    }

    pub fn remove(&self, id: NodeId) {
        self.state.lock().remove(id.0);
    }

    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.state.lock().log.clone()
    }

    /// Number of times `action` was performed on `id`.
    pub fn performed(&self, id: NodeId, action: Action) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.node == id && r.interaction == Interaction::Perform(action))
            .count()
    }

    /// Number of times `action` was performed anywhere in the tree.
    pub fn count(&self, action: Action) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.interaction == Interaction::Perform(action))
            .count()
    }

    /// Performs and assignments, i.e. everything that could change the UI.
    pub fn mutations(&self) -> usize {
        self.state.lock().log.len()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// A radio group whose buttons deselect their siblings when pressed.
    pub fn radio_group(
        &self,
        parent: NodeId,
        identifier: &str,
        labels: &[&str],
        selected: Option<&str>,
    ) -> (NodeId, Vec<NodeId>) {
        let group = self.add(parent, Role::RadioGroup).identifier(identifier).id();
        let buttons: Vec<NodeId> = labels
            .iter()
            .map(|label| {
                self.add(group, Role::RadioButton)
                    .title(label)
                    .value(selected == Some(*label))
                    .id()
            })
            .collect();
        for &pressed in &buttons {
            for &other in &buttons {
                self.on(
                    pressed,
                    Trigger::Perform(Action::Press),
                    Effect::set(other, Attribute::Value, other == pressed),
                );
            }
        }
        (group, buttons)
    }

    /// A pop-up button with its menu; picking an item changes the shown value.
    pub fn popup(
        &self,
        parent: NodeId,
        identifier: &str,
        options: &[&str],
        selected: &str,
    ) -> (NodeId, Vec<NodeId>) {
        let popup = self
            .add(parent, Role::PopUpButton)
            .identifier(identifier)
            .value(selected)
            .id();
        let menu = self.add(popup, Role::Menu).id();
        let items = options
            .iter()
            .map(|label| {
                self.add(menu, Role::MenuItem)
                    .title(label)
                    .on(
                        Trigger::Perform(Action::Press),
                        Effect::set(popup, Attribute::Value, *label),
                    )
                    .id()
            })
            .collect();
        (popup, items)
    }
}

impl Default for MockTree {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NodeBuilder<'a> {
    tree: &'a MockTree,
    id: NodeId,
}

impl NodeBuilder<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn attr(self, attr: Attribute, value: impl Into<AttrValue>) -> Self {
        self.tree.state.lock().nodes[self.id.0].attrs.insert(attr, value.into());
        self
    }

    pub fn title(self, title: &str) -> Self {
        self.attr(Attribute::Title, title)
    }

    pub fn identifier(self, identifier: &str) -> Self {
        self.attr(Attribute::Identifier, identifier)
    }

    pub fn description(self, description: &str) -> Self {
        self.attr(Attribute::Description, description)
    }

    pub fn value(self, value: impl Into<AttrValue>) -> Self {
        self.attr(Attribute::Value, value)
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.attr(Attribute::MinValue, min).attr(Attribute::MaxValue, max)
    }

    pub fn selected(self, selected: bool) -> Self {
        self.attr(Attribute::Selected, selected)
    }

    /// Hide the parent link, like a recycled row in a virtualized list.
    pub fn detached(self) -> Self {
        self.tree.state.lock().nodes[self.id.0].linked = false;
        self
    }

    pub fn on(self, trigger: Trigger, effect: Effect) -> Self {
        self.tree.on(self.id, trigger, effect);
        self
    }

    /// Make `action` fail on this node.
    pub fn rejecting(self, action: Action) -> Self {
        self.tree.state.lock().nodes[self.id.0].rejects.push(action);
        self
    }
}

impl MockNode {
    fn node(&self, id: usize) -> Arc<dyn AxNode> {
        Arc::new(MockNode {
            state: self.state.clone(),
            id,
        })
    }
}

impl AxNode for MockNode {
    fn role(&self) -> Result<Role> {
        let mut state = self.state.lock();
        state.settle();
        Ok(state.alive(self.id)?.role.clone())
    }

    fn attribute(&self, attr: Attribute) -> Result<Option<AttrValue>> {
        let mut state = self.state.lock();
        state.settle();
        Ok(state.alive(self.id)?.attrs.get(&attr).cloned())
    }

    fn set_attribute(&self, attr: Attribute, value: &AttrValue) -> Result<()> {
        let mut state = self.state.lock();
        state.settle();
        state.alive(self.id)?;
        state.log.push(InteractionRecord {
            node: NodeId(self.id),
            interaction: Interaction::Assign(attr, value.clone()),
        });
        state.nodes[self.id].attrs.insert(attr, value.clone());
        state.fire(self.id, Trigger::Assign(attr));
        Ok(())
    }

    fn children(&self) -> Result<Vec<Arc<dyn AxNode>>> {
        let mut state = self.state.lock();
        state.settle();
        let children = state.alive(self.id)?.children.clone();
        Ok(children.into_iter().map(|c| self.node(c)).collect())
    }

    fn parent(&self) -> Result<Option<Arc<dyn AxNode>>> {
        let mut state = self.state.lock();
        state.settle();
        let node = state.alive(self.id)?;
        Ok(if node.linked {
            node.parent.map(|p| self.node(p))
        } else {
            None
        })
    }

    fn perform(&self, action: Action) -> Result<()> {
        let mut state = self.state.lock();
        state.settle();
        state.alive(self.id)?;
        state.log.push(InteractionRecord {
            node: NodeId(self.id),
            interaction: Interaction::Perform(action),
        });
        if state.nodes[self.id].rejects.contains(&action) {
            return Err(Error::action_failed(action.as_ax(), "rejected by mock node"));
        }
        state.fire(self.id, Trigger::Perform(action));
        Ok(())
    }

    fn same_node(&self, other: &dyn AxNode) -> bool {
        other
            .as_any()
            .downcast_ref::<MockNode>()
            .map(|o| Arc::ptr_eq(&self.state, &o.state) && o.id == self.id)
            .unwrap_or(false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MockApp {
    tree: MockTree,
    pid: Option<i32>,
    launched_at: Option<Instant>,
    launch_delay: Duration,
}

struct WorkspaceState {
    trusted: bool,
    apps: HashMap<String, MockApp>,
    next_pid: i32,
    launches: Vec<String>,
    terminations: Vec<i32>,
    lookup_error: Option<Error>,
}

/// Process control double. Installed apps share their `MockTree` across launches.
#[derive(Clone)]
pub struct MockWorkspace {
    state: Arc<Mutex<WorkspaceState>>,
}

impl MockWorkspace {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WorkspaceState {
                trusted: true,
                apps: HashMap::new(),
                next_pid: 500,
                launches: Vec::new(),
                terminations: Vec::new(),
                lookup_error: None,
            })),
        }
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.state.lock().trusted = trusted;
    }

    /// Make an app launchable, not running yet.
    pub fn install(&self, bundle_id: &str, tree: MockTree) {
        self.state.lock().apps.insert(
            bundle_id.to_string(),
            MockApp {
                tree,
                pid: None,
                launched_at: None,
                launch_delay: Duration::ZERO,
            },
        );
    }

    /// Install an app that the user already has open.
    pub fn install_running(&self, bundle_id: &str, tree: MockTree) -> i32 {
        self.install(bundle_id, tree);
        let mut state = self.state.lock();
        let pid = state.next_pid;
        state.next_pid += 1;
        if let Some(app) = state.apps.get_mut(bundle_id) {
            app.pid = Some(pid);
            app.launched_at = Some(Instant::now());
        }
        pid
    }

    pub fn set_launch_delay(&self, bundle_id: &str, delay: Duration) {
        if let Some(app) = self.state.lock().apps.get_mut(bundle_id) {
            app.launch_delay = delay;
        }
    }

    /// Make every pid lookup fail with `error`, as a broken process query would.
    pub fn set_lookup_error(&self, error: Option<Error>) {
        self.state.lock().lookup_error = error;
    }

    pub fn pid_of(&self, bundle_id: &str) -> Option<i32> {
        self.state.lock().apps.get(bundle_id).and_then(|a| a.pid)
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().launches.len()
    }

    pub fn terminations(&self) -> Vec<i32> {
        self.state.lock().terminations.clone()
    }
}

impl Default for MockWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace for MockWorkspace {
    fn is_trusted(&self) -> bool {
        self.state.lock().trusted
    }

    fn request_trust(&self) -> bool {
        self.is_trusted()
    }

    fn running_pid(&self, bundle_id: &str) -> Result<Option<i32>> {
        if let Some(e) = &self.state.lock().lookup_error {
            return Err(e.clone());
        }
        Ok(self.pid_of(bundle_id))
    }

    fn launch(&self, bundle_id: &str, _hidden: bool) -> Result<()> {
        let mut state = self.state.lock();
        let pid = state.next_pid;
        let app = state
            .apps
            .get_mut(bundle_id)
            .ok_or_else(|| Error::launch_failed(bundle_id, "not installed"))?;
        if app.pid.is_some() {
            return Ok(());
        }
        app.pid = Some(pid);
        app.launched_at = Some(Instant::now());
        state.next_pid += 1;
        state.launches.push(bundle_id.to_string());
        Ok(())
    }

    fn is_finished_launching(&self, pid: i32) -> bool {
        self.state
            .lock()
            .apps
            .values()
            .find(|a| a.pid == Some(pid))
            .and_then(|a| a.launched_at.map(|t| t.elapsed() >= a.launch_delay))
            .unwrap_or(false)
    }

    fn is_running(&self, pid: i32) -> bool {
        self.state.lock().apps.values().any(|a| a.pid == Some(pid))
    }

    fn terminate(&self, pid: i32) -> Result<()> {
        let mut state = self.state.lock();
        let app = state
            .apps
            .values_mut()
            .find(|a| a.pid == Some(pid))
            .ok_or_else(|| Error::app_not_running(&pid.to_string()))?;
        app.pid = None;
        app.launched_at = None;
        state.terminations.push(pid);
        Ok(())
    }

    fn app_element(&self, pid: i32) -> Result<UIElement> {
        let state = self.state.lock();
        if !state.trusted {
            return Err(Error::not_authorized());
        }
        state
            .apps
            .values()
            .find(|a| a.pid == Some(pid))
            .map(|a| a.tree.root())
            .ok_or_else(|| Error::app_not_running(&pid.to_string()))
    }
}
