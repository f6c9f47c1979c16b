//! System Settings: categories, panes and how to reach them

use crate::navigation::{Confirmation, Destination, Locate, NavigationResult, PaneNavigator, Scope};
use axsettings_core::controls::{Checkbox, Control, PopUpButton, RadioGroup, Slider, Window};
use axsettings_core::{AutomationSession, Deadline, Error, Result, Role, UIElement};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

pub const BUNDLE_ID: &str = "com.apple.systempreferences";

/// Control identifiers in the accessibility panes.
pub mod ids {
    pub const DISPLAY_FILTER_ENABLED: &str = "AX_DISPLAY_FILTER_ENABLED";
    pub const DISPLAY_FILTER_TYPE: &str = "AX_DISPLAY_FILTER_TYPE";
    pub const DISPLAY_FILTER_INTENSITY: &str = "AX_DISPLAY_FILTER_INTENSITY";
    pub const DIFFERENTIATE_WITHOUT_COLOR: &str = "AX_DIFFERENTIATE_WITHOUT_COLOR";
    pub const INCREASE_CONTRAST: &str = "AX_INCREASE_CONTRAST";
    pub const INVERT_COLOR: &str = "AX_INVERT_COLOR";
    pub const INVERT_COLOR_MODE: &str = "AX_INVERT_COLOR_MODE";
    pub const REDUCE_MOTION: &str = "AX_REDUCE_MOTION";
    pub const REDUCE_TRANSPARENCY: &str = "AX_REDUCE_TRANSPARENCY";
    pub const FIND_CURSOR: &str = "AX_FIND_CURSOR";
    pub const CURSOR_SIZE: &str = "AX_CURSOR_SIZE";

    pub const HOVER_TEXT_ENABLE: &str = "AX_HOVER_TEXT_ENABLE";
    pub const ZOOM_ENABLE_HOTKEYS: &str = "AX_ZOOM_ENABLE_HOTKEYS";
    pub const ZOOM_ENABLE_GESTURE: &str = "AX_ZOOM_ENABLE_GESTURE";
    pub const ZOOM_TRACKPAD: &str = "AX_ZOOM_TRACKPAD";
    pub const ZOOM_STYLE_POPUP: &str = "AX_ZOOM_STYLE_POPUP";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Accessibility,
    Appearance,
    Displays,
    General,
    Keyboard,
    Mouse,
    Trackpad,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Accessibility,
        Category::Appearance,
        Category::Displays,
        Category::General,
        Category::Keyboard,
        Category::Mouse,
        Category::Trackpad,
    ];

    /// Identifier of the sidebar cell for this category.
    pub fn identifier(&self) -> &'static str {
        match self {
            Category::Accessibility => "com.apple.Accessibility-Settings.extension",
            Category::Appearance => "com.apple.Appearance-Settings.extension",
            Category::Displays => "com.apple.Displays-Settings.extension",
            Category::General => "com.apple.systempreferences.GeneralSettings",
            Category::Keyboard => "com.apple.Keyboard-Settings.extension",
            Category::Mouse => "com.apple.Mouse-Settings.extension",
            Category::Trackpad => "com.apple.Trackpad-Settings.extension",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::Accessibility => "Accessibility",
            Category::Appearance => "Appearance",
            Category::Displays => "Displays",
            Category::General => "General",
            Category::Keyboard => "Keyboard",
            Category::Mouse => "Mouse",
            Category::Trackpad => "Trackpad",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            Category::Accessibility => "accessibility",
            Category::Appearance => "appearance",
            Category::Displays => "displays",
            Category::General => "general",
            Category::Keyboard => "keyboard",
            Category::Mouse => "mouse",
            Category::Trackpad => "trackpad",
        }
    }

    /// Sidebar rows are virtualized, so the row is found through the lineage
    /// of its identified cell.
    pub fn destination(&self) -> Destination {
        Destination::new(
            self.title(),
            Locate::Lineage {
                identifier: self.identifier().to_string(),
                ancestor: Role::Row,
            },
            Confirmation::WindowTitle {
                title: self.title().to_string(),
                prefix: true,
            },
        )
        .in_scope(Scope::Sidebar)
        .unwinding()
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_value(format!("Unknown settings category '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessibilitySection {
    Display,
    SpokenContent,
    VoiceOver,
    Zoom,
}

impl AccessibilitySection {
    pub const ALL: [AccessibilitySection; 4] = [
        AccessibilitySection::Display,
        AccessibilitySection::SpokenContent,
        AccessibilitySection::VoiceOver,
        AccessibilitySection::Zoom,
    ];

    pub fn identifier(&self) -> &'static str {
        match self {
            AccessibilitySection::Display => "AX_FEATURE_DISPLAY",
            AccessibilitySection::SpokenContent => "AX_FEATURE_SPOKENCONTENT",
            AccessibilitySection::VoiceOver => "AX_FEATURE_VOICEOVER",
            AccessibilitySection::Zoom => "AX_FEATURE_ZOOM",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AccessibilitySection::Display => "Display",
            AccessibilitySection::SpokenContent => "Spoken Content",
            AccessibilitySection::VoiceOver => "VoiceOver",
            AccessibilitySection::Zoom => "Zoom",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            AccessibilitySection::Display => "display",
            AccessibilitySection::SpokenContent => "spoken-content",
            AccessibilitySection::VoiceOver => "voiceover",
            AccessibilitySection::Zoom => "zoom",
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::new(
            self.title(),
            Locate::Identifier(self.identifier().to_string()),
            Confirmation::WindowTitle {
                title: self.title().to_string(),
                prefix: false,
            },
        )
        .in_scope(Scope::Detail)
    }
}

/// A pane of System Settings, written `category` or `accessibility/<section>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SettingsView {
    Category(Category),
    Accessibility(AccessibilitySection),
}

impl SettingsView {
    /// Destinations to visit, in order, from wherever the window is.
    pub fn route(&self) -> Vec<Destination> {
        match self {
            SettingsView::Category(c) => vec![c.destination()],
            SettingsView::Accessibility(section) => {
                vec![Category::Accessibility.destination(), section.destination()]
            }
        }
    }

    pub fn category(&self) -> Category {
        match self {
            SettingsView::Category(c) => *c,
            SettingsView::Accessibility(_) => Category::Accessibility,
        }
    }
}

impl fmt::Display for SettingsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsView::Category(c) => f.write_str(c.slug()),
            SettingsView::Accessibility(s) => write!(f, "accessibility/{}", s.slug()),
        }
    }
}

impl FromStr for SettingsView {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            None => Ok(SettingsView::Category(s.parse()?)),
            Some((category, section)) if category.eq_ignore_ascii_case("accessibility") => {
                AccessibilitySection::ALL
                    .into_iter()
                    .find(|a| a.slug().eq_ignore_ascii_case(section))
                    .map(SettingsView::Accessibility)
                    .ok_or_else(|| {
                        Error::invalid_value(format!("Unknown accessibility section '{}'", section))
                            .with_suggestions(
                                AccessibilitySection::ALL
                                    .iter()
                                    .map(|a| format!("accessibility/{}", a.slug()))
                                    .collect(),
                            )
                    })
            }
            Some(_) => Err(Error::invalid_value(format!(
                "Settings view '{}' is not supported; only accessibility has sections",
                s
            ))),
        }
    }
}

impl TryFrom<String> for SettingsView {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SettingsView> for String {
    fn from(view: SettingsView) -> Self {
        view.to_string()
    }
}

/// Color filter kinds, keyed by the value stored in `com.apple.mediaaccessibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFilterType {
    Grayscale = 1,
    Protanopia = 2,
    Deuteranopia = 4,
    Tritanopia = 8,
    ColorTint = 16,
}

impl ColorFilterType {
    pub const ALL: [ColorFilterType; 5] = [
        ColorFilterType::Grayscale,
        ColorFilterType::Protanopia,
        ColorFilterType::Deuteranopia,
        ColorFilterType::Tritanopia,
        ColorFilterType::ColorTint,
    ];

    pub fn raw(&self) -> i64 {
        *self as i64
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.raw() == raw)
    }

    /// Text shown in the filter type pop-up.
    pub fn label(&self) -> &'static str {
        match self {
            ColorFilterType::Grayscale => "Grayscale",
            ColorFilterType::Protanopia => "Red/Green filter (Protanopia)",
            ColorFilterType::Deuteranopia => "Green/Red filter (Deuteranopia)",
            ColorFilterType::Tritanopia => "Blue/Yellow filter (Tritanopia)",
            ColorFilterType::ColorTint => "Color Tint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomStyle {
    FullScreen = 0,
    PictureInPicture = 1,
    SplitScreen = 2,
}

impl ZoomStyle {
    pub const ALL: [ZoomStyle; 3] = [
        ZoomStyle::FullScreen,
        ZoomStyle::PictureInPicture,
        ZoomStyle::SplitScreen,
    ];

    pub fn raw(&self) -> i64 {
        *self as i64
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.raw() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ZoomStyle::FullScreen => "Full Screen",
            ZoomStyle::PictureInPicture => "Picture-in-Picture",
            ZoomStyle::SplitScreen => "Split Screen",
        }
    }
}

pub struct SystemSettings;

impl SystemSettings {
    /// Bring `view` up in System Settings.
    ///
    /// Attaches to a running instance or launches one; a launch is recorded
    /// in `session` so that ending the session closes it again.
    pub async fn open(
        view: SettingsView,
        session: &mut AutomationSession,
        deadline: Deadline,
    ) -> Result<SettingsPane> {
        let automation = session.automation().clone();
        automation.ensure_authorized()?;

        let (app, launched) = session.launch_or_attach(BUNDLE_ID, deadline).await?;
        let window = app.wait_until_main_window(deadline).await?;

        let mut navigator = PaneNavigator::new(automation.config());
        let result = navigator.follow(&window, &view.route(), deadline).await?;
        info!(%view, launched, "settings pane open");
        Ok(SettingsPane { view, result })
    }
}

/// An open pane. Controls are looked up fresh on every call.
#[derive(Debug, Clone)]
pub struct SettingsPane {
    view: SettingsView,
    result: NavigationResult,
}

impl SettingsPane {
    pub fn view(&self) -> SettingsView {
        self.view
    }

    pub fn window(&self) -> &Window {
        self.result.window()
    }

    pub fn detail(&self) -> &UIElement {
        self.result.detail()
    }

    /// Re-resolve the detail region after the UI rebuilt it.
    pub fn refresh(&self) -> Result<SettingsPane> {
        Ok(SettingsPane {
            view: self.view,
            result: self.result.refresh()?,
        })
    }

    pub fn checkbox(&self, identifier: &str) -> Result<Checkbox> {
        Checkbox::locate(self.detail(), identifier)
    }

    pub fn checkbox_labeled(&self, label: &str) -> Result<Checkbox> {
        Checkbox::locate_labeled(self.detail(), label)
    }

    pub fn slider(&self, identifier: &str) -> Result<Slider> {
        Slider::locate(self.detail(), identifier)
    }

    pub fn popup(&self, identifier: &str) -> Result<PopUpButton> {
        PopUpButton::locate(self.detail(), identifier)
    }

    pub fn radio_group(&self, identifier: &str) -> Result<RadioGroup> {
        RadioGroup::locate(self.detail(), identifier)
    }
}
