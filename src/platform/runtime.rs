//! Target-independent async scheduling helpers.
//!
//! The listen subsystem only ever needs two primitives from its host
//! runtime: detaching a background task and waiting out a delay. Keeping
//! them behind this module is what lets the rest of the crate compile for
//! both native and wasm targets.

use std::future::Future;
use std::time::Duration;

/// Runs a future to completion in the background, without a handle.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Runs a future to completion in the background, without a handle.
///
/// Uses the ambient tokio runtime when one exists; callers outside any
/// runtime (e.g. synchronous observer registration) fall back to a shared
/// runtime owned by the crate. The fallback carries one worker thread of
/// its own, so spawned futures make progress without anyone blocking on
/// them.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static FALLBACK_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("contentlake-listen")
            .enable_all()
            .build()
            .expect("failed to build fallback tokio runtime")
    });

    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => {
            FALLBACK_RUNTIME.spawn(future);
        }
    }
}

/// Waits for the given duration without blocking the calling thread.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    #[cfg(target_arch = "wasm32")]
    gloo_timers::future::sleep(duration).await;
    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(duration).await;
}
