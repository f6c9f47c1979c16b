//! End-to-end behaviour against an in-memory System Settings.

use axsettings_core::mock::{Effect, Interaction, MockTree, MockWorkspace, NodeId, Trigger};
use axsettings_core::{
    Action, Attribute, Automation, AutomationSession, Deadline, EngineConfig, Error, ErrorCode,
    Role,
};
use axsettings_dispatch::native::FnAccessor;
use axsettings_dispatch::proxy::{ApplyOutcome, ControlBinding, SettingProxy, TreeAutomation};
use axsettings_dispatch::system_settings::{
    ids, AccessibilitySection, Category, SettingsView, SystemSettings, BUNDLE_ID,
};
use axsettings_dispatch::{
    ApplyBatch, Catalog, RegisteredSetting, SettingKey, SettingValue, SettingsDispatcher, ValueType,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const CATALOG: &str = r#"{"solutions": [{"id": "com.apple.macos.display", "settings": [
    {"name": "contrast.enabled", "type": "boolean", "default": false,
     "handler": {"type": "ui", "view": "accessibility/display",
                 "control": {"kind": "checkbox", "identifier": "AX_INCREASE_CONTRAST"}}},
    {"name": "transparency.reduced", "type": "boolean", "default": false,
     "handler": {"type": "ui", "view": "accessibility/display",
                 "control": {"kind": "checkbox", "identifier": "AX_REDUCE_TRANSPARENCY"}}},
    {"name": "pointer.size", "type": "double", "default": 1.0,
     "handler": {"type": "ui", "view": "accessibility/display",
                 "control": {"kind": "slider", "identifier": "AX_CURSOR_SIZE"}}}
]}]}"#;

const CONTRAST: &str = "com.apple.macos.display/contrast.enabled";
const TRANSPARENCY: &str = "com.apple.macos.display/transparency.reduced";
const POINTER_SIZE: &str = "com.apple.macos.display/pointer.size";
const SETTLE: Duration = Duration::from_millis(40);

struct SettingsApp {
    ws: MockWorkspace,
    tree: MockTree,
    back: NodeId,
    contrast: NodeId,
    transparency: NodeId,
    cursor: NodeId,
    section_buttons: Vec<NodeId>,
}

/// window > [toolbar > Back, group > split > [sidebar > outline > rows, splitter, detail]]
///
/// Sidebar cells are detached from their rows, like the real virtualized list.
/// The detail group holds the accessibility section buttons and the display
/// controls at once; only the window title tells which pane is showing.
fn settings_app(running: bool, sections_confirm: bool) -> SettingsApp {
    let tree = MockTree::new();
    let window = tree.add(tree.root_id(), Role::Window).title("General").id();
    let toolbar = tree.add(window, Role::Toolbar).id();
    let back = tree
        .add(toolbar, Role::Button)
        .description("Back")
        .on(
            Trigger::Perform(Action::Press),
            Effect::set(window, Attribute::Title, "Accessibility").after(SETTLE),
        )
        .id();

    let group = tree.add(window, Role::Group).id();
    let split = tree.add(group, Role::SplitGroup).id();
    let sidebar = tree.add(split, Role::Group).id();
    let outline = tree.add(sidebar, Role::Outline).id();
    for category in Category::ALL {
        let row = tree
            .add(outline, Role::Row)
            .selected(category == Category::General)
            .on(
                Trigger::Assign(Attribute::Selected),
                Effect::set(window, Attribute::Title, category.title()).after(SETTLE),
            )
            .id();
        tree.add(row, Role::Cell).identifier(category.identifier()).detached();
    }
    tree.add(split, Role::Splitter);
    let detail = tree.add(split, Role::Group).id();

    let section_buttons = AccessibilitySection::ALL
        .iter()
        .map(|section| {
            let button = tree
                .add(detail, Role::Button)
                .identifier(section.identifier())
                .title(section.title())
                .id();
            if sections_confirm {
                tree.on(
                    button,
                    Trigger::Perform(Action::Press),
                    Effect::set(window, Attribute::Title, section.title()).after(SETTLE),
                );
            }
            button
        })
        .collect();

    let checkbox = |identifier: &str, delay: Duration| {
        tree.add(detail, Role::CheckBox)
            .identifier(identifier)
            .value(false)
            .on(Trigger::Perform(Action::Press), Effect::toggle().after(delay))
            .id()
    };
    let contrast = checkbox(ids::INCREASE_CONTRAST, Duration::from_millis(300));
    let transparency = checkbox(ids::REDUCE_TRANSPARENCY, Duration::from_millis(50));
    let cursor = tree
        .add(detail, Role::Slider)
        .identifier(ids::CURSOR_SIZE)
        .value(3.0)
        .range(0.0, 10.0)
        .on(Trigger::Perform(Action::Increment), Effect::step(1.0))
        .on(Trigger::Perform(Action::Decrement), Effect::step(-1.0))
        .id();

    let ws = MockWorkspace::new();
    if running {
        ws.install_running(BUNDLE_ID, tree.clone());
    } else {
        ws.install(BUNDLE_ID, tree.clone());
    }
    SettingsApp {
        ws,
        tree,
        back,
        contrast,
        transparency,
        cursor,
        section_buttons,
    }
}

fn automation(ws: &MockWorkspace) -> Automation {
    Automation::new(Arc::new(ws.clone()), EngineConfig::default())
}

fn dispatcher(ws: &MockWorkspace) -> SettingsDispatcher {
    CATALOG.parse::<Catalog>().unwrap().into_dispatcher(automation(ws)).unwrap()
}

fn key(s: &str) -> SettingKey {
    s.parse().unwrap()
}

#[tokio::test]
async fn checkbox_converging_late_is_pressed_once() {
    let app = settings_app(true, true);
    let d = dispatcher(&app.ws);

    let outcome = d
        .apply(&key(CONTRAST), &SettingValue::Bool(true), Deadline::after_ms(2000))
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(app.tree.performed(app.contrast, Action::Press), 1);
    assert_eq!(app.tree.get(app.contrast, Attribute::Value), Some(true.into()));
}

#[tokio::test]
async fn slider_steps_exactly_to_target() {
    let app = settings_app(true, true);
    let d = dispatcher(&app.ws);

    let outcome = d
        .apply(&key(POINTER_SIZE), &SettingValue::Double(7.0), Deadline::after_ms(2000))
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Applied);
    assert_eq!(app.tree.performed(app.cursor, Action::Increment), 4);
    assert_eq!(app.tree.performed(app.cursor, Action::Decrement), 0);
}

#[tokio::test]
async fn unconfirmed_navigation_touches_no_control() {
    let app = settings_app(true, false);
    let d = dispatcher(&app.ws);

    let err = d
        .apply(&key(CONTRAST), &SettingValue::Bool(true), Deadline::after_ms(400))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NavigationFailed);
    assert_eq!(app.tree.performed(app.contrast, Action::Press), 0);
    // The section button press is the last thing that happened.
    let last = app.tree.interactions().pop().unwrap();
    assert_eq!(last.node, app.section_buttons[0]);
    assert_eq!(last.interaction, Interaction::Perform(Action::Press));
    assert_eq!(app.tree.performed(app.section_buttons[0], Action::Press), 1);
}

#[tokio::test]
async fn matching_reader_short_circuits_before_any_ui_work() {
    let app = settings_app(false, true);
    let mut d = SettingsDispatcher::new(automation(&app.ws));
    let reader = Arc::new(FnAccessor::reader("increaseContrast", || {
        Ok(Some(SettingValue::Bool(true)))
    }));
    let proxy = SettingProxy::Tree(
        TreeAutomation::new(
            SettingsView::Accessibility(AccessibilitySection::Display),
            ControlBinding::Checkbox {
                identifier: ids::INCREASE_CONTRAST.into(),
            },
        )
        .with_reader(reader),
    );
    let k = key(CONTRAST);
    d.register(k.clone(), RegisteredSetting::new(proxy, ValueType::Boolean));

    let started = Instant::now();
    let outcome = d.apply(&k, &SettingValue::Bool(true), Deadline::after_ms(2000)).await.unwrap();

    assert_eq!(outcome, ApplyOutcome::Unchanged);
    assert_eq!(app.tree.mutations(), 0);
    assert_eq!(app.ws.launch_count(), 0);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn applying_twice_mutates_once() {
    let app = settings_app(true, true);
    let d = dispatcher(&app.ws);
    let k = key(TRANSPARENCY);

    let first = d.apply(&k, &SettingValue::Bool(true), Deadline::after_ms(2000)).await.unwrap();
    let second = d.apply(&k, &SettingValue::Bool(true), Deadline::after_ms(2000)).await.unwrap();

    assert_eq!((first, second), (ApplyOutcome::Applied, ApplyOutcome::Unchanged));
    assert_eq!(app.tree.performed(app.transparency, Action::Press), 1);
}

async fn apply_twice(
    d: &SettingsDispatcher,
    k: &SettingKey,
    target: f64,
) -> (ApplyOutcome, ApplyOutcome) {
    let v = SettingValue::Double(target);
    let first = d.apply(k, &v, Deadline::after_ms(2000)).await.unwrap();
    let second = d.apply(k, &v, Deadline::after_ms(2000)).await.unwrap();
    (first, second)
}

#[tokio::test]
async fn slider_applied_twice_moves_once() {
    let app = settings_app(true, true);
    let d = dispatcher(&app.ws);
    let k = key(POINTER_SIZE);
    let moves = || {
        (
            app.tree.performed(app.cursor, Action::Increment),
            app.tree.performed(app.cursor, Action::Decrement),
        )
    };

    // Several steps away, landing exactly.
    assert_eq!(apply_twice(&d, &k, 5.0).await, (ApplyOutcome::Applied, ApplyOutcome::Unchanged));
    assert_eq!(moves(), (2, 0));

    // Halfway between two steps: stops on the crossed value and stays there.
    assert_eq!(apply_twice(&d, &k, 6.5).await, (ApplyOutcome::Applied, ApplyOutcome::Unchanged));
    assert_eq!(moves(), (4, 0));
    assert_eq!(app.tree.get(app.cursor, Attribute::Value), Some(7.0.into()));

    // Nearer to the value before the crossing: one step back, then nothing.
    assert_eq!(apply_twice(&d, &k, 4.7).await, (ApplyOutcome::Applied, ApplyOutcome::Unchanged));
    assert_eq!(moves(), (5, 3));
    assert_eq!(app.tree.get(app.cursor, Attribute::Value), Some(5.0.into()));
}

#[tokio::test]
async fn declared_slider_step_makes_a_fresh_dispatcher_idempotent() {
    let app = settings_app(true, true);
    app.tree.set(app.cursor, Attribute::Value, 7.0);
    let mut d = SettingsDispatcher::new(automation(&app.ws));
    let proxy = SettingProxy::Tree(TreeAutomation::new(
        SettingsView::Accessibility(AccessibilitySection::Display),
        ControlBinding::Slider {
            identifier: ids::CURSOR_SIZE.into(),
            step: Some(1.0),
        },
    ));
    let k = key(POINTER_SIZE);
    d.register(k.clone(), RegisteredSetting::new(proxy, ValueType::Double));

    let outcome = d
        .apply(&k, &SettingValue::Double(6.5), Deadline::after_ms(2000))
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Unchanged);
    assert_eq!(app.tree.performed(app.cursor, Action::Increment), 0);
    assert_eq!(app.tree.performed(app.cursor, Action::Decrement), 0);
}

#[tokio::test]
async fn slow_launch_is_closed_even_when_apply_fails() {
    let app = settings_app(false, true);
    app.ws.set_launch_delay(BUNDLE_ID, Duration::from_millis(600));
    let d = dispatcher(&app.ws);

    let err = d
        .apply(
            &key(TRANSPARENCY),
            &SettingValue::Bool(true),
            Deadline::after_ms(150),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::LaunchFailed);
    assert_eq!(app.ws.launch_count(), 1);
    assert_eq!(app.ws.terminations().len(), 1);
    assert_eq!(app.ws.pid_of(BUNDLE_ID), None);
}

#[tokio::test]
async fn failed_process_lookup_is_reported_without_launching() {
    let app = settings_app(true, true);
    app.ws
        .set_lookup_error(Some(Error::new(ErrorCode::Unknown, "System Events did not answer")));
    let d = dispatcher(&app.ws);

    let err = d
        .apply(
            &key(TRANSPARENCY),
            &SettingValue::Bool(true),
            Deadline::after_ms(500),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::Unknown);
    assert_eq!(app.ws.launch_count(), 0);
    assert_eq!(app.tree.mutations(), 0);
}

#[tokio::test]
async fn session_closes_only_what_it_launched() {
    let app = settings_app(false, true);
    let d = dispatcher(&app.ws);
    let k = key(TRANSPARENCY);

    d.apply(&k, &SettingValue::Bool(true), Deadline::after_ms(2000)).await.unwrap();
    assert_eq!(app.ws.launch_count(), 1);
    assert_eq!(app.ws.terminations().len(), 1);
    assert_eq!(app.ws.pid_of(BUNDLE_ID), None);

    let already_open = settings_app(true, true);
    let d = dispatcher(&already_open.ws);
    d.apply(&k, &SettingValue::Bool(true), Deadline::after_ms(2000)).await.unwrap();
    assert!(already_open.ws.terminations().is_empty());
    assert!(already_open.ws.pid_of(BUNDLE_ID).is_some());
}

#[tokio::test]
async fn relaunch_unwinds_from_sub_pane() {
    // The app remembers its last pane across launches: the second apply
    // finds "Display" showing with the Accessibility row selected.
    let app = settings_app(false, true);
    let d = dispatcher(&app.ws);

    d.apply(&key(TRANSPARENCY), &SettingValue::Bool(true), Deadline::after_ms(2000))
        .await
        .unwrap();
    d.apply(&key(CONTRAST), &SettingValue::Bool(true), Deadline::after_ms(2000))
        .await
        .unwrap();

    assert_eq!(app.ws.launch_count(), 2);
    assert_eq!(app.tree.performed(app.back, Action::Press), 1);
    assert_eq!(app.tree.performed(app.section_buttons[0], Action::Press), 2);
    assert_eq!(app.tree.performed(app.contrast, Action::Press), 1);
}

#[tokio::test]
async fn not_authorized_fails_fast() {
    let app = settings_app(false, true);
    app.ws.set_trusted(false);
    let d = dispatcher(&app.ws);

    let started = Instant::now();
    let err = d
        .apply(&key(CONTRAST), &SettingValue::Bool(true), Deadline::after_ms(2000))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::NotAuthorized);
    assert!(!err.suggestions.is_empty());
    assert_eq!(app.ws.launch_count(), 0);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn batch_shares_one_session_and_one_deadline() {
    let app = settings_app(false, true);
    let d = dispatcher(&app.ws);
    let batch = ApplyBatch::new()
        .set(key(TRANSPARENCY), SettingValue::Bool(true))
        .set(key(POINTER_SIZE), SettingValue::Integer(5));

    let report = d.apply_batch(&batch, Deadline::after_ms(3000)).await;

    assert!(report.succeeded(), "{:?}", report);
    assert_eq!(app.ws.launch_count(), 1);
    assert_eq!(report.closed, vec![BUNDLE_ID.to_string()]);
    assert_eq!(app.tree.performed(app.cursor, Action::Increment), 2);
}

#[tokio::test]
async fn batch_never_outlives_its_deadline() {
    let app = settings_app(true, false);
    let d = dispatcher(&app.ws);
    let batch: ApplyBatch = [
        (CONTRAST, SettingValue::Bool(true)),
        (TRANSPARENCY, SettingValue::Bool(true)),
        (POINTER_SIZE, SettingValue::Double(6.0)),
    ]
    .into_iter()
    .map(|(k, v)| (key(k), v))
    .collect();

    let started = Instant::now();
    let report = d.apply_batch(&batch, Deadline::after_ms(300)).await;

    assert_eq!(report.failures().count(), 3);
    assert!(started.elapsed() < Duration::from_millis(300 + 200));
    assert_eq!(app.tree.mutations(), app.tree.performed(app.section_buttons[0], Action::Press) + 1);
}

#[tokio::test]
async fn open_hands_out_controls_in_the_pane() {
    let app = settings_app(true, true);
    let mut session = AutomationSession::begin(&automation(&app.ws));

    let pane = SystemSettings::open(
        "accessibility/display".parse().unwrap(),
        &mut session,
        Deadline::after_ms(2000),
    )
    .await
    .unwrap();

    assert_eq!(pane.window().title().as_deref(), Some("Display"));
    assert!(!pane.checkbox(ids::INCREASE_CONTRAST).unwrap().get().unwrap());
    assert_eq!(pane.slider(ids::CURSOR_SIZE).unwrap().get().unwrap(), 3.0);
    assert_eq!(pane.checkbox("AX_NOPE").unwrap_err().code, ErrorCode::ControlNotFound);
    assert!(session.end().unwrap().is_empty());
}
