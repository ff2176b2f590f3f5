//! Keyed periodic scheduler for the scripting layer.
//!
//! One tokio task per live timer. Timers never touch the interpreter: each
//! fire enqueues a [`Event::TimerTick`] that the client loop turns into a
//! `call_timer_actions("<id>")` invocation under the sandbox. Replacement is
//! atomic under the registry lock, so for any id at most one task is live;
//! a displaced task observes its cancellation token before its next fire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::script::Event;

/// The timer registry. Cheap to clone; all clones share one map.
#[derive(Debug, Clone)]
pub struct Timers {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    events: UnboundedSender<Event>,
    generation: AtomicU64,
}

#[derive(Debug)]
struct Entry {
    cancel: CancellationToken,
    generation: u64,
}

impl Timers {
    #[must_use]
    pub fn new(events: UnboundedSender<Event>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Install a timer, replacing (and cancelling) any prior timer with the
    /// same id. `max_fires == 0` means unbounded.
    pub fn add(&self, id: &str, code: &str, delay_ms: u64, max_fires: u64) {
        debug!(id, code, delay_ms, max_fires, "installing timer");
        let cancel = CancellationToken::new();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);

        let displaced = self.inner.lock().insert(
            id.to_owned(),
            Entry {
                cancel: cancel.clone(),
                generation,
            },
        );
        if let Some(entry) = displaced {
            entry.cancel.cancel();
        }

        tokio::spawn(run_timer(
            Arc::clone(&self.inner),
            id.to_owned(),
            cancel,
            generation,
            Duration::from_millis(delay_ms),
            max_fires,
        ));
    }

    /// Cancel and remove a timer. Unknown ids are a no-op.
    pub fn del(&self, id: &str) {
        if let Some(entry) = self.inner.lock().remove(id) {
            debug!(id, "deleting timer");
            entry.cancel.cancel();
        }
    }

    /// Cancel every live timer. Used on sandbox teardown and shutdown.
    pub fn clear(&self) {
        let mut entries = self.inner.lock();
        for (id, entry) in entries.drain() {
            trace!(id, "clearing timer");
            entry.cancel.cancel();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Remove the entry for `id`, but only if it still belongs to the task
    /// that is exiting: a replacement must not be clobbered.
    fn remove_if_current(&self, id: &str, generation: u64) {
        let mut entries = self.lock();
        if entries.get(id).is_some_and(|e| e.generation == generation) {
            entries.remove(id);
        }
    }
}

async fn run_timer(
    inner: Arc<Inner>,
    id: String,
    cancel: CancellationToken,
    generation: u64,
    delay: Duration,
    max_fires: u64,
) {
    let mut fires: u64 = 0;
    loop {
        select! {
            () = cancel.cancelled() => {
                trace!(id, "timer cancelled");
                return;
            }
            () = sleep(delay) => {}
        }

        if inner.events.send(Event::TimerTick(id.clone())).is_err() {
            // Dispatcher is gone; nothing left to fire into.
            return;
        }
        fires += 1;
        trace!(id, fires, "timer fired");

        if max_fires > 0 && fires >= max_fires {
            inner.remove_if_current(&id, generation);
            trace!(id, "timer reached max fires");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;

    fn tick_id(event: Event) -> String {
        match event {
            Event::TimerTick(id) => id,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    /// Let virtual time run long enough that any stray timer would fire,
    /// then assert the event queue stays empty.
    async fn assert_quiet(rx: &mut UnboundedReceiver<Event>) {
        sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_timer_fires_max_times_then_unregisters() {
        let (tx, mut rx) = unbounded_channel();
        let timers = Timers::new(tx);

        timers.add("t", "go()", 50, 3);
        for _ in 0..3 {
            assert_eq!(tick_id(rx.recv().await.unwrap()), "t");
        }
        assert_quiet(&mut rx).await;
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timer_runs_until_deleted() {
        let (tx, mut rx) = unbounded_channel();
        let timers = Timers::new(tx);

        timers.add("pulse", "go()", 100, 0);
        for _ in 0..5 {
            assert_eq!(tick_id(rx.recv().await.unwrap()), "pulse");
        }
        timers.del("pulse");
        assert!(timers.is_empty());
        assert_quiet(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn same_id_add_replaces_previous_timer() {
        let (tx, mut rx) = unbounded_channel();
        let timers = Timers::new(tx);

        // The first timer never gets to fire: it is displaced immediately
        // and the second one's cadence takes over.
        timers.add("t", "one()", 30, 0);
        timers.add("t", "two()", 70, 0);
        assert_eq!(timers.len(), 1);

        sleep(Duration::from_millis(705)).await;
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn replacement_with_bound_stops_after_bound() {
        let (tx, mut rx) = unbounded_channel();
        let timers = Timers::new(tx);

        timers.add("t", "one()", 50, 0);
        sleep(Duration::from_millis(10)).await;
        timers.add("t", "two()", 50, 3);

        for _ in 0..3 {
            assert_eq!(tick_id(rx.recv().await.unwrap()), "t");
        }
        assert_quiet(&mut rx).await;
        assert!(timers.is_empty());

        // Deleting after everything wound down stays a no-op.
        timers.del("t");
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_everything() {
        let (tx, mut rx) = unbounded_channel();
        let timers = Timers::new(tx);

        timers.add("a", "go()", 40, 0);
        timers.add("b", "go()", 60, 0);
        assert_eq!(timers.len(), 2);

        timers.clear();
        assert!(timers.is_empty());
        assert_quiet(&mut rx).await;
    }
}
