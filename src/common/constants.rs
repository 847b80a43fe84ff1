//! Application-wide constants grouped by concern

/// Defaults for settings that can come from the CLI or the config file
pub mod defaults {
    pub const RPC_HOST: &str = "localhost";
    pub const RPC_PORT: u16 = 9091;
    pub const RPC_PATH: &str = "/transmission/rpc";

    /// Seconds between two progress refreshes
    pub const UPDATE_INTERVAL_SECS: u64 = 20;

    /// Seconds to keep retrying a refused connection while a spawned daemon starts up
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    pub const LAUNCHER_ENTRY: &str = "transmission-gtk.desktop";
}

/// Config file location under the XDG config dir
pub mod paths {
    pub const CONFIG_DIR: &str = "transmission-launcher";
    pub const CONFIG_FILE: &str = "config.json";
}

/// Transmission RPC protocol details
pub mod rpc {
    pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";
    pub const RESULT_SUCCESS: &str = "success";
    pub const REQUEST_TIMEOUT_SECS: u64 = 15;

    /// Delay between connection attempts while waiting for a spawned daemon
    pub const CONNECT_RETRY_MS: u64 = 500;

    pub const FIELDS_LIST: &[&str] = &["id", "name", "status"];
    pub const FIELDS_PROGRESS: &[&str] = &["id", "name", "sizeWhenDone", "leftUntilDone"];
    pub const FIELD_ALT_SPEED: &str = "alt-speed-enabled";
}

/// Unity LauncherEntry and dbusmenu identifiers
pub mod dbus {
    pub const LAUNCHER_ENTRY_PATH_PREFIX: &str = "/com/canonical/unity/launcherentry";
    pub const APP_URI_SCHEME: &str = "application://";

    pub const DBUSMENU_VERSION: u32 = 3;
    pub const QUICKLIST_PATH_SUFFIX: &str = "quicklist";

    pub const PROP_COUNT: &str = "count";
    pub const PROP_COUNT_VISIBLE: &str = "count-visible";
    pub const PROP_PROGRESS: &str = "progress";
    pub const PROP_PROGRESS_VISIBLE: &str = "progress-visible";
    pub const PROP_URGENT: &str = "urgent";
    pub const PROP_QUICKLIST: &str = "quicklist";
}

/// Quicklist menu layout
pub mod menu {
    pub const ROOT_ID: i32 = 0;
    pub const TURTLE_ITEM_ID: i32 = 1;
    pub const TURTLE_LABEL: &str = "Turtle Mode";
}

/// Child daemon process handling
pub mod daemon {
    /// Time a spawned daemon gets to exit after SIGTERM before it is killed
    pub const TERMINATE_GRACE_SECS: u64 = 5;
}
