//! A cancellable periodic task running on its own thread.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

fn lock(flag: &Mutex<bool>) -> MutexGuard<'_, bool> {
    flag.lock().unwrap_or_else(|e| e.into_inner())
}

/// Observes the cancellation of a [`Ticker`].
///
/// Passed to the tick function so that it can avoid side effects once the ticker has been
/// cancelled.
pub struct CancellationToken {
    cancelled: Arc<Mutex<bool>>,
    wake: Receiver<()>,
}

impl CancellationToken {
    /// Returns whether [`Ticker::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *lock(&self.cancelled)
    }

    /// Runs `f` unless the ticker has been cancelled.
    ///
    /// Cancelling the ticker waits for a running `f` to return, so nothing `f` does can happen
    /// after [`Ticker::cancel`] has returned.
    pub fn unless_cancelled<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let cancelled = lock(&self.cancelled);
        if *cancelled {
            return None;
        }
        Some(f())
    }

    /// Sleeps for `interval`, returning early with `true` if the ticker gets cancelled meanwhile.
    fn wait(&self, interval: Duration) -> bool {
        match self.wake.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

/// Cancels the ticker when dropped.
struct CancelOnDrop {
    cancelled: Arc<Mutex<bool>>,
    /// Dropped right after the flag is set, waking the ticker thread up.
    _wake: Sender<()>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        *lock(&self.cancelled) = true;
    }
}

/// A thread that invokes a tick function, waiting for a fixed interval after each tick.
///
/// The interval is measured from the end of a tick, so a slow tick function lowers the tick rate
/// instead of causing a burst of ticks to catch up.
///
/// The ticker owns a state value of type `S` that is passed to every tick. After the ticker is
/// cancelled, the state can be retrieved with [`Stopped::join`].
///
/// Dropping a [`Ticker`] cancels it without waiting for the thread to exit.
pub struct Ticker<S: Send + 'static> {
    cancel: CancelOnDrop,
    handle: JoinHandle<S>,
}

impl<S: Send + 'static> Ticker<S> {
    /// Spawns a named ticker thread that calls `tick` every `interval`, starting immediately.
    pub fn spawn<F>(name: &str, interval: Duration, mut state: S, mut tick: F) -> io::Result<Self>
    where
        F: FnMut(&mut S, &CancellationToken) + Send + 'static,
    {
        let cancelled = Arc::new(Mutex::new(false));
        let (wake, wake_recv) = channel::bounded(0);
        let token = CancellationToken {
            cancelled: cancelled.clone(),
            wake: wake_recv,
        };
        let thread_name = name.to_string();
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            log::trace!("ticker '{thread_name}' starting");
            while !token.is_cancelled() {
                tick(&mut state, &token);
                if token.wait(interval) {
                    break;
                }
            }
            log::trace!("ticker '{thread_name}' exiting");
            state
        })?;

        Ok(Self {
            cancel: CancelOnDrop {
                cancelled,
                _wake: wake,
            },
            handle,
        })
    }

    /// Returns whether the ticker thread has exited, which only happens if a tick panicked.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the ticker.
    ///
    /// This does not wait for a running tick to finish, except for a section the tick is running
    /// under [`CancellationToken::unless_cancelled`].
    pub fn cancel(self) -> Stopped<S> {
        let Ticker { cancel, handle } = self;
        drop(cancel);
        Stopped { handle }
    }
}

/// A cancelled [`Ticker`] whose thread may still be finishing its last tick.
///
/// Dropping this detaches the thread, which then drops its state when it exits.
pub struct Stopped<S> {
    handle: JoinHandle<S>,
}

impl<S> Stopped<S> {
    /// Returns whether the ticker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the ticker thread to exit and returns its state.
    ///
    /// If a tick panicked, the panic payload is returned instead.
    pub fn join(self) -> thread::Result<S> {
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn ticks_until_cancelled() {
        let (send, recv) = channel::unbounded();
        let ticker = Ticker::spawn("counter", Duration::from_millis(1), 0u32, move |n, _| {
            *n += 1;
            send.send(*n).ok();
        })
        .unwrap();

        for expected in 1..=3 {
            assert_eq!(recv.recv_timeout(TIMEOUT), Ok(expected));
        }
        let count = ticker.cancel().join().unwrap();
        assert!(count >= 3);
        assert_eq!(recv.try_iter().count() as u32, count - 3);
    }

    #[test]
    fn cancel_interrupts_wait() {
        let ticker = Ticker::spawn("slow", Duration::from_secs(600), (), |_, _| {}).unwrap();
        let start = Instant::now();
        ticker.cancel().join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn cancel_does_not_wait_for_tick() {
        let (started_send, started) = channel::bounded(1);
        let (release, release_recv) = channel::bounded::<()>(0);
        let ticker = Ticker::spawn("blocked", Duration::from_millis(1), None, move |ran, token| {
            if ran.is_some() {
                return;
            }
            started_send.send(()).ok();
            // Blocks until the test drops `release`.
            release_recv.recv().ok();
            *ran = Some(token.unless_cancelled(|| ()).is_some());
        })
        .unwrap();

        started.recv_timeout(TIMEOUT).unwrap();
        let start = Instant::now();
        let stopped = ticker.cancel();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!stopped.is_finished());

        drop(release);
        // The tick finished after `cancel`, so its guarded section was skipped.
        assert_eq!(stopped.join().unwrap(), Some(false));
    }

    #[test]
    fn cancel_waits_for_guarded_section() {
        let (inside_send, inside) = channel::bounded(1);
        let (release, release_recv) = channel::bounded::<()>(0);
        let (done_send, done) = channel::unbounded();
        let ticker = Ticker::spawn("guarded", Duration::from_millis(1), (), move |_, token| {
            token.unless_cancelled(|| {
                inside_send.send(()).ok();
                release_recv.recv().ok();
                done_send.send(()).ok();
            });
        })
        .unwrap();

        inside.recv_timeout(TIMEOUT).unwrap();
        let canceller = thread::spawn(move || ticker.cancel());
        drop(release);
        let stopped = canceller.join().unwrap();
        // The guarded section completed before `cancel` returned, and never ran again.
        assert_eq!(done.try_iter().count(), 1);
        stopped.join().unwrap();
        assert!(done.try_recv().is_err());
    }

    #[test]
    fn join_reports_panic() {
        let (panicking_send, panicking) = channel::bounded(1);
        let ticker = Ticker::spawn("panicky", Duration::from_millis(1), (), move |_, _| {
            panicking_send.send(()).ok();
            panic!("tick failed");
        })
        .unwrap();

        panicking.recv_timeout(TIMEOUT).unwrap();
        let deadline = Instant::now() + TIMEOUT;
        while !ticker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(ticker.is_finished());

        let payload = ticker.cancel().join().unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"tick failed"));
    }

    #[test]
    fn drop_cancels() {
        let (alive, alive_recv) = channel::bounded::<()>(0);
        let ticker = Ticker::spawn("dropped", Duration::from_secs(600), alive, |_, _| {}).unwrap();
        drop(ticker);
        // The state (and with it the sender) is dropped once the thread exits.
        assert_eq!(
            alive_recv.recv_timeout(TIMEOUT),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
