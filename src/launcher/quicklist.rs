//! Quicklist menu served over `com.canonical.dbusmenu`
//!
//! The menu is a root item with a single checkmark entry for turtle mode.
//! Clicks are forwarded to the poller, which owns the RPC connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, StructureBuilder, Type, Value};
use zbus::{fdo, interface};

use crate::common::constants::{dbus, menu};

/// Requests raised from the quicklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuicklistAction {
    ToggleTurtle,
}

type Properties = HashMap<String, Value<'static>>;

/// Menu node in the `(ia{sv}av)` shape dbusmenu expects
#[derive(Debug, Serialize, Type)]
pub struct MenuLayout {
    pub id: i32,
    pub properties: Properties,
    pub children: Vec<Value<'static>>,
}

impl MenuLayout {
    fn into_value(self) -> zbus::zvariant::Result<Value<'static>> {
        let structure = StructureBuilder::new()
            .add_field(self.id)
            .add_field(self.properties)
            .add_field(self.children)
            .build()?;
        Ok(Value::Structure(structure))
    }
}

#[derive(Debug, Default)]
pub struct MenuState {
    revision: u32,
    /// Alt-speed state last read from the daemon; `None` until known
    turtle: Option<bool>,
}

impl MenuState {
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn turtle(&self) -> Option<bool> {
        self.turtle
    }

    /// Returns true if the state changed
    pub fn set_turtle(&mut self, enabled: Option<bool>) -> bool {
        if self.turtle == enabled {
            return false;
        }
        self.turtle = enabled;
        true
    }

    fn has_item(&self, id: i32) -> bool {
        id == menu::ROOT_ID || id == menu::TURTLE_ITEM_ID
    }

    fn item_properties(&self, id: i32) -> Option<Properties> {
        let mut props = Properties::new();
        match id {
            menu::ROOT_ID => {
                props.insert("children-display".to_string(), Value::from("submenu"));
            }
            menu::TURTLE_ITEM_ID => {
                let toggle_state: i32 = match self.turtle {
                    Some(true) => 1,
                    Some(false) => 0,
                    None => -1,
                };
                props.insert("label".to_string(), Value::from(menu::TURTLE_LABEL));
                props.insert("toggle-type".to_string(), Value::from("checkmark"));
                props.insert("toggle-state".to_string(), Value::from(toggle_state));
                props.insert("enabled".to_string(), Value::from(self.turtle.is_some()));
                props.insert("visible".to_string(), Value::from(true));
            }
            _ => return None,
        }
        Some(props)
    }

    fn filtered_properties(&self, id: i32, names: &[String]) -> Option<Properties> {
        let props = self.item_properties(id)?;
        if names.is_empty() {
            return Some(props);
        }
        Some(
            props
                .into_iter()
                .filter(|(key, _)| names.iter().any(|n| n == key))
                .collect(),
        )
    }

    fn children(&self, id: i32) -> Vec<i32> {
        if id == menu::ROOT_ID {
            vec![menu::TURTLE_ITEM_ID]
        } else {
            Vec::new()
        }
    }

    /// Layout rooted at `id`; a negative depth means unlimited
    pub fn layout(&self, id: i32, depth: i32, names: &[String]) -> Option<MenuLayout> {
        let properties = self.filtered_properties(id, names)?;
        let mut children = Vec::new();
        if depth != 0 {
            for child in self.children(id) {
                if let Some(layout) = self.layout(child, depth.saturating_sub(1), names)
                    && let Ok(value) = layout.into_value()
                {
                    children.push(value);
                }
            }
        }
        Some(MenuLayout {
            id,
            properties,
            children,
        })
    }
}

pub struct QuicklistMenu {
    state: Arc<Mutex<MenuState>>,
    actions: UnboundedSender<QuicklistAction>,
}

impl QuicklistMenu {
    pub fn new(state: Arc<Mutex<MenuState>>, actions: UnboundedSender<QuicklistAction>) -> Self {
        Self { state, actions }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MenuState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle_event(&self, id: i32, event_id: &str) -> bool {
        if !self.state().has_item(id) {
            return false;
        }
        debug!(id, event = event_id, "Quicklist event");
        if id == menu::TURTLE_ITEM_ID
            && event_id == "clicked"
            && self.actions.send(QuicklistAction::ToggleTurtle).is_err()
        {
            warn!("Poller is gone, dropping quicklist click");
        }
        true
    }
}

#[interface(name = "com.canonical.dbusmenu")]
impl QuicklistMenu {
    #[zbus(out_args("revision", "layout"))]
    fn get_layout(
        &self,
        parent_id: i32,
        recursion_depth: i32,
        property_names: Vec<String>,
    ) -> fdo::Result<(u32, MenuLayout)> {
        let state = self.state();
        let layout = state
            .layout(parent_id, recursion_depth, &property_names)
            .ok_or_else(|| fdo::Error::InvalidArgs(format!("Unknown menu item {parent_id}")))?;
        Ok((state.revision, layout))
    }

    fn get_group_properties(
        &self,
        ids: Vec<i32>,
        property_names: Vec<String>,
    ) -> Vec<(i32, Properties)> {
        let state = self.state();
        let ids = if ids.is_empty() {
            vec![menu::ROOT_ID, menu::TURTLE_ITEM_ID]
        } else {
            ids
        };
        ids.into_iter()
            .filter_map(|id| {
                state
                    .filtered_properties(id, &property_names)
                    .map(|props| (id, props))
            })
            .collect()
    }

    fn get_property(&self, id: i32, name: String) -> fdo::Result<OwnedValue> {
        let value = self
            .state()
            .item_properties(id)
            .and_then(|mut props| props.remove(&name))
            .ok_or_else(|| fdo::Error::InvalidArgs(format!("No property '{name}' on item {id}")))?;
        OwnedValue::try_from(value).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    fn event(&self, id: i32, event_id: String, _data: OwnedValue, _timestamp: u32) -> fdo::Result<()> {
        if self.handle_event(id, &event_id) {
            Ok(())
        } else {
            Err(fdo::Error::InvalidArgs(format!("Unknown menu item {id}")))
        }
    }

    fn event_group(&self, events: Vec<(i32, String, OwnedValue, u32)>) -> Vec<i32> {
        events
            .into_iter()
            .filter(|(id, event_id, _, _)| !self.handle_event(*id, event_id))
            .map(|(id, _, _, _)| id)
            .collect()
    }

    fn about_to_show(&self, _id: i32) -> bool {
        false
    }

    #[zbus(out_args("updates_needed", "id_errors"))]
    fn about_to_show_group(&self, ids: Vec<i32>) -> (Vec<i32>, Vec<i32>) {
        let state = self.state();
        let errors = ids.into_iter().filter(|id| !state.has_item(*id)).collect();
        (Vec::new(), errors)
    }

    #[zbus(property)]
    fn version(&self) -> u32 {
        dbus::DBUSMENU_VERSION
    }

    #[zbus(property)]
    fn text_direction(&self) -> String {
        "ltr".to_string()
    }

    #[zbus(property)]
    fn status(&self) -> String {
        "normal".to_string()
    }

    #[zbus(property)]
    fn icon_theme_path(&self) -> Vec<String> {
        Vec::new()
    }

    #[zbus(signal)]
    pub async fn items_properties_updated(
        emitter: &SignalEmitter<'_>,
        updated_props: Vec<(i32, HashMap<String, Value<'_>>)>,
        removed_props: Vec<(i32, Vec<String>)>,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn layout_updated(
        emitter: &SignalEmitter<'_>,
        revision: u32,
        parent: i32,
    ) -> zbus::Result<()>;
}

/// Properties of the turtle item, as pushed in `ItemsPropertiesUpdated`
pub fn turtle_item_update(state: &MenuState) -> Vec<(i32, HashMap<String, Value<'static>>)> {
    state
        .item_properties(menu::TURTLE_ITEM_ID)
        .map(|props| vec![(menu::TURTLE_ITEM_ID, props)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn menu_with(turtle: Option<bool>) -> (QuicklistMenu, mpsc::UnboundedReceiver<QuicklistAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = MenuState::default();
        state.set_turtle(turtle);
        (QuicklistMenu::new(Arc::new(Mutex::new(state)), tx), rx)
    }

    #[test]
    fn test_turtle_item_reflects_state() {
        let mut state = MenuState::default();
        let props = state.item_properties(menu::TURTLE_ITEM_ID).unwrap();
        assert_eq!(props.get("enabled"), Some(&Value::from(false)));
        assert_eq!(props.get("toggle-state"), Some(&Value::from(-1i32)));

        assert!(state.set_turtle(Some(true)));
        let props = state.item_properties(menu::TURTLE_ITEM_ID).unwrap();
        assert_eq!(props.get("enabled"), Some(&Value::from(true)));
        assert_eq!(props.get("toggle-state"), Some(&Value::from(1i32)));
        assert_eq!(props.get("toggle-type"), Some(&Value::from("checkmark")));
        assert_eq!(props.get("label"), Some(&Value::from("Turtle Mode")));
    }

    #[test]
    fn test_set_turtle_reports_changes_only() {
        let mut state = MenuState::default();
        assert!(state.set_turtle(Some(false)));
        assert!(!state.set_turtle(Some(false)));
        assert!(state.set_turtle(None));
        assert_eq!(state.turtle(), None);
    }

    #[test]
    fn test_layout_depth() {
        let state = MenuState::default();

        let full = state.layout(menu::ROOT_ID, -1, &[]).unwrap();
        assert_eq!(full.id, 0);
        assert_eq!(full.children.len(), 1);

        let shallow = state.layout(menu::ROOT_ID, 0, &[]).unwrap();
        assert!(shallow.children.is_empty());

        let leaf = state.layout(menu::TURTLE_ITEM_ID, -1, &[]).unwrap();
        assert!(leaf.children.is_empty());

        assert!(state.layout(7, -1, &[]).is_none());
    }

    #[test]
    fn test_layout_handles_minimum_depth() {
        let state = MenuState::default();

        let full = state.layout(menu::ROOT_ID, i32::MIN, &[]).unwrap();
        assert_eq!(full.children.len(), 1);
    }

    #[test]
    fn test_property_filter() {
        let state = MenuState::default();
        let props = state
            .filtered_properties(menu::TURTLE_ITEM_ID, &["label".to_string()])
            .unwrap();
        assert_eq!(props.len(), 1);
        assert!(props.contains_key("label"));
    }

    #[test]
    fn test_click_on_turtle_item_sends_toggle() {
        let (menu, mut rx) = menu_with(Some(false));
        assert!(menu.handle_event(menu::TURTLE_ITEM_ID, "clicked"));
        assert_eq!(rx.try_recv().unwrap(), QuicklistAction::ToggleTurtle);
    }

    #[test]
    fn test_hover_and_root_events_are_ignored() {
        let (menu, mut rx) = menu_with(Some(false));
        assert!(menu.handle_event(menu::TURTLE_ITEM_ID, "hovered"));
        assert!(menu.handle_event(menu::ROOT_ID, "clicked"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_group_reports_unknown_ids() {
        let (menu, mut rx) = menu_with(Some(true));
        let data = || OwnedValue::try_from(Value::from(0i32)).unwrap();
        let errors = menu.event_group(vec![
            (menu::TURTLE_ITEM_ID, "clicked".to_string(), data(), 0),
            (42, "clicked".to_string(), data(), 0),
        ]);
        assert_eq!(errors, vec![42]);
        assert_eq!(rx.try_recv().unwrap(), QuicklistAction::ToggleTurtle);
    }

    #[test]
    fn test_group_properties_default_to_all_items() {
        let (menu, _rx) = menu_with(None);
        let all = menu.get_group_properties(Vec::new(), Vec::new());
        let ids: Vec<i32> = all.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1]);
    }
}
