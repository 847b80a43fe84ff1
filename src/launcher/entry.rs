//! `com.canonical.Unity.LauncherEntry` export
//!
//! Docks listen for the `Update` signal from any sender and match it to an icon by
//! the `application://<desktop id>` URI. `Query` lets a dock that starts later
//! fetch the current state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use zbus::interface;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, Value};

use crate::common::constants::dbus;
use crate::progress::DownloadSummary;

/// Properties mirrored onto the launcher icon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LauncherState {
    pub count: i64,
    pub count_visible: bool,
    pub progress: f64,
    pub progress_visible: bool,
    pub urgent: bool,
    pub quicklist: Option<OwnedObjectPath>,
}

impl LauncherState {
    pub fn apply_summary(&mut self, summary: &DownloadSummary) {
        let active = summary.is_active();
        self.count = i64::try_from(summary.count).unwrap_or(i64::MAX);
        self.count_visible = active;
        self.progress = summary.progress();
        self.progress_visible = active;
    }

    /// Hide badge and progress bar, keeping the quicklist attached
    pub fn hide(&mut self) {
        self.count = 0;
        self.count_visible = false;
        self.progress = 0.0;
        self.progress_visible = false;
        self.urgent = false;
    }

    pub fn to_properties(&self) -> HashMap<String, Value<'static>> {
        let mut props = HashMap::new();
        props.insert(dbus::PROP_COUNT.to_string(), Value::from(self.count));
        props.insert(
            dbus::PROP_COUNT_VISIBLE.to_string(),
            Value::from(self.count_visible),
        );
        props.insert(dbus::PROP_PROGRESS.to_string(), Value::from(self.progress));
        props.insert(
            dbus::PROP_PROGRESS_VISIBLE.to_string(),
            Value::from(self.progress_visible),
        );
        props.insert(dbus::PROP_URGENT.to_string(), Value::from(self.urgent));
        if let Some(path) = &self.quicklist {
            // libunity sends the menu path as a plain string, not an object path
            props.insert(
                dbus::PROP_QUICKLIST.to_string(),
                Value::from(path.as_str().to_string()),
            );
        }
        props
    }
}

/// Object exported on the session bus for one desktop entry
pub struct LauncherEntryInterface {
    app_uri: String,
    state: Arc<Mutex<LauncherState>>,
}

impl LauncherEntryInterface {
    pub fn new(app_uri: String, state: Arc<Mutex<LauncherState>>) -> Self {
        Self { app_uri, state }
    }
}

#[interface(name = "com.canonical.Unity.LauncherEntry")]
impl LauncherEntryInterface {
    #[zbus(out_args("app_uri", "properties"))]
    fn query(&self) -> (String, HashMap<String, Value<'static>>) {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (self.app_uri.clone(), state.to_properties())
    }

    #[zbus(signal)]
    pub async fn update(
        emitter: &SignalEmitter<'_>,
        app_uri: &str,
        properties: HashMap<String, Value<'_>>,
    ) -> zbus::Result<()>;
}

pub fn app_uri(desktop_id: &str) -> String {
    format!("{}{}", dbus::APP_URI_SCHEME, desktop_id)
}

/// Object path for a desktop id; characters outside `[A-Za-z0-9_]` become `_`
pub fn entry_path(desktop_id: &str) -> String {
    let element: String = desktop_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}/{}", dbus::LAUNCHER_ENTRY_PATH_PREFIX, element)
}
