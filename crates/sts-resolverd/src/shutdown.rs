//! Process lifecycle management, adapted from `kumod::lifecycle`:
//! an `Activity` token that in-flight
//! connections hold to delay shutdown, and a `ShutdownSubscription` that
//! idle loops select on alongside their own timeouts.
//!
//! See <https://tokio.rs/tokio/topics/shutdown>.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::sync::mpsc::{Receiver as MpscReceiver, Sender as MpscSender};
use tokio::sync::watch::{Receiver as WatchReceiver, Sender as WatchSender};

static ACTIVE: OnceLock<Mutex<Option<Activity>>> = OnceLock::new();
static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);
static STOPPING: OnceLock<ShutdownState> = OnceLock::new();

/// Held by anything that cannot be ruthlessly interrupted. While any
/// `Activity` is alive, `LifeCycle::wait_for_shutdown` cannot complete.
#[derive(Clone)]
pub struct Activity {
    _tx: MpscSender<()>,
}

impl Activity {
    pub fn get_opt() -> Option<Self> {
        Some(ACTIVE.get()?.lock().unwrap().as_ref()?.clone())
    }

    pub fn is_shutting_down() -> bool {
        SHUTTING_DOWN.load(Ordering::Relaxed)
    }
}

struct ShutdownState {
    tx: WatchSender<()>,
    rx: WatchReceiver<()>,
}

/// Select on this alongside a timeout to wake up when the process is
/// about to shut down.
pub struct ShutdownSubscription {
    rx: WatchReceiver<()>,
}

impl ShutdownSubscription {
    pub fn get() -> Self {
        Self {
            rx: STOPPING.get().expect("LifeCycle::new not called").rx.clone(),
        }
    }

    pub async fn shutting_down(&mut self) {
        self.rx.changed().await.ok();
    }
}

pub struct LifeCycle {
    activity_rx: MpscReceiver<()>,
}

impl LifeCycle {
    /// May be called only once; panics if called again.
    pub fn new() -> Self {
        let (activity_tx, activity_rx) = tokio::sync::mpsc::channel(1);
        ACTIVE
            .set(Mutex::new(Some(Activity { _tx: activity_tx })))
            .map_err(|_| ())
            .expect("LifeCycle::new called more than once");

        let (tx, rx) = tokio::sync::watch::channel(());
        STOPPING
            .set(ShutdownState { tx, rx })
            .map_err(|_| ())
            .expect("LifeCycle::new called more than once");

        Self { activity_rx }
    }

    /// Wait for ctrl-c, then propagate shutdown to every subscriber and
    /// wait for all outstanding `Activity` tokens to be dropped.
    pub async fn wait_for_shutdown(&mut self) {
        tracing::debug!("waiting for interrupt");
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown requested, waiting for in-flight connections to drain");

        SHUTTING_DOWN.store(true, Ordering::SeqCst);
        ACTIVE.get().map(|a| a.lock().unwrap().take());
        STOPPING.get().map(|s| s.tx.send(()).ok());

        self.activity_rx.recv().await;
    }
}

impl Default for LifeCycle {
    fn default() -> Self {
        Self::new()
    }
}
