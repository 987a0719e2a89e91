//! Launching the browser-based viewer page.

use std::path::Path;

use tracing::{info, warn};

/// Open `page` in the system's default browser.
///
/// Best-effort: a missing page or a failed launcher is logged and
/// swallowed, since the viewer can always be opened by hand and the relay
/// works without it.
pub fn open_viewer(page: &Path) {
    if !page.exists() {
        warn!(page = %page.display(), "viewer page not found, skipping launch");
        return;
    }
    match open::that(page) {
        Ok(()) => info!(page = %page.display(), "viewer opened"),
        Err(e) => warn!(page = %page.display(), error = %e, "failed to open viewer"),
    }
}
