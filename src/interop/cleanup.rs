//! Process-exit removal of library build directories

use std::sync::Once;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tempfile::TempDir;

static BUILD_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));
static HOOK: Once = Once::new();

/// Keep `dir` alive until the process exits, then remove it
///
/// The loaded library is mapped from this directory, so it cannot be removed any earlier.
pub fn register(dir: TempDir) {
    HOOK.call_once(|| {
        // SAFETY: `remove_build_dirs` is a plain extern "C" function that does not unwind.
        if unsafe { libc::atexit(remove_build_dirs) } != 0 {
            tracing::warn!("failed to register exit hook; build directories will be left behind");
        }
    });

    tracing::debug!(path = %dir.path().display(), "Registered build directory for cleanup");
    BUILD_DIRS.lock().push(dir);
}

/// Number of directories awaiting removal
pub fn pending() -> usize {
    BUILD_DIRS.lock().len()
}

extern "C" fn remove_build_dirs() {
    let dirs = match BUILD_DIRS.try_lock() {
        Some(mut guard) => std::mem::take(&mut *guard),
        None => return,
    };

    for dir in dirs {
        let _ = dir.close();
    }
}
