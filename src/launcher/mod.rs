//! Desktop launcher integration over the session bus

mod entry;
mod quicklist;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};
use zbus::Connection;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedObjectPath;

use crate::common::constants::{dbus, menu};
use crate::progress::DownloadSummary;

use entry::{LauncherEntryInterface, LauncherState, app_uri, entry_path};
use quicklist::{MenuState, QuicklistMenu, turtle_item_update};

pub use quicklist::QuicklistAction;

/// Handle to the exported launcher entry (and quicklist, when enabled)
pub struct Launcher {
    conn: Connection,
    app_uri: String,
    entry_path: OwnedObjectPath,
    entry_state: Arc<Mutex<LauncherState>>,
    quicklist: Option<ExportedMenu>,
}

struct ExportedMenu {
    path: OwnedObjectPath,
    state: Arc<Mutex<MenuState>>,
}

impl Launcher {
    /// Export the launcher entry for `desktop_id` on the session bus
    ///
    /// When `actions` is given, a turtle-mode quicklist is exported as well and its
    /// clicks are delivered on that channel.
    pub async fn connect(
        desktop_id: &str,
        actions: Option<UnboundedSender<QuicklistAction>>,
    ) -> Result<Self> {
        let app_uri = app_uri(desktop_id);
        let entry_path = OwnedObjectPath::try_from(entry_path(desktop_id))
            .with_context(|| format!("Invalid launcher entry id '{desktop_id}'"))?;

        let quicklist = actions
            .map(|tx| -> Result<(ExportedMenu, QuicklistMenu)> {
                let path = OwnedObjectPath::try_from(format!(
                    "{}/{}",
                    entry_path.as_str(),
                    dbus::QUICKLIST_PATH_SUFFIX
                ))
                .context("Failed to build quicklist object path")?;
                let state = Arc::new(Mutex::new(MenuState::default()));
                let server = QuicklistMenu::new(Arc::clone(&state), tx);
                Ok((ExportedMenu { path, state }, server))
            })
            .transpose()?;

        let entry_state = Arc::new(Mutex::new(LauncherState {
            quicklist: quicklist.as_ref().map(|(exported, _)| exported.path.clone()),
            ..LauncherState::default()
        }));

        let mut builder = zbus::connection::Builder::session()
            .context("Failed to open session bus")?
            .serve_at(
                entry_path.clone(),
                LauncherEntryInterface::new(app_uri.clone(), Arc::clone(&entry_state)),
            )
            .context("Failed to export launcher entry")?;

        let quicklist = match quicklist {
            Some((exported, server)) => {
                builder = builder
                    .serve_at(exported.path.clone(), server)
                    .context("Failed to export quicklist menu")?;
                Some(exported)
            }
            None => None,
        };

        let conn = builder
            .build()
            .await
            .context("Failed to connect to session bus")?;

        info!(
            app_uri = %app_uri,
            path = %entry_path.as_str(),
            quicklist = quicklist.is_some(),
            "Exported launcher entry"
        );

        let launcher = Self {
            conn,
            app_uri,
            entry_path,
            entry_state,
            quicklist,
        };

        if let Some(exported) = &launcher.quicklist {
            let revision = exported
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .revision();
            let emitter = SignalEmitter::new(&launcher.conn, exported.path.clone())
                .context("Failed to create quicklist signal emitter")?;
            QuicklistMenu::layout_updated(&emitter, revision, menu::ROOT_ID)
                .await
                .context("Failed to announce quicklist layout")?;
        }
        launcher.publish().await?;

        Ok(launcher)
    }

    /// Push count, progress and their visibility flags
    pub async fn show(&self, summary: &DownloadSummary) -> Result<()> {
        self.entry_state().apply_summary(summary);
        self.publish().await
    }

    /// Hide count and progress on the icon
    pub async fn clear(&self) -> Result<()> {
        self.entry_state().hide();
        self.publish().await
    }

    /// Update the quicklist checkmark; `None` greys the item out
    pub async fn set_turtle_mode(&self, enabled: Option<bool>) -> Result<()> {
        let Some(exported) = &self.quicklist else {
            return Ok(());
        };

        let update = {
            let mut state = exported
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !state.set_turtle(enabled) {
                return Ok(());
            }
            debug!(turtle = ?state.turtle(), "Quicklist turtle state changed");
            turtle_item_update(&state)
        };

        let emitter = SignalEmitter::new(&self.conn, exported.path.clone())
            .context("Failed to create quicklist signal emitter")?;
        QuicklistMenu::items_properties_updated(&emitter, update, Vec::new())
            .await
            .context("Failed to emit quicklist property update")
    }

    fn entry_state(&self) -> std::sync::MutexGuard<'_, LauncherState> {
        self.entry_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn publish(&self) -> Result<()> {
        let properties = self.entry_state().to_properties();
        let emitter = SignalEmitter::new(&self.conn, self.entry_path.clone())
            .context("Failed to create launcher signal emitter")?;
        LauncherEntryInterface::update(&emitter, &self.app_uri, properties)
            .await
            .context("Failed to emit launcher entry update")
    }
}
