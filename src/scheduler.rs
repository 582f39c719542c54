//! Thread-per-endpoint poller for hosts without their own timer.

use crate::endpoint::Pollable;
use crate::error::Result;
use log::{debug, trace, warn};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(|p| p.into_inner()) = true;
        self.wake.notify_all();
    }

    // Sleeps until `deadline`, or until stopped if there is none; returns
    // false if stopped meanwhile.
    fn sleep_until(&self, deadline: Option<Instant>) -> bool {
        let mut stopped = self.stopped.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if *stopped {
                return false;
            }
            stopped = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    self.wake
                        .wait_timeout(stopped, deadline - now)
                        .unwrap_or_else(|p| p.into_inner())
                        .0
                }
                None => self.wake.wait(stopped).unwrap_or_else(|p| p.into_inner()),
            };
        }
    }
}

/// Calls [`Pollable::refresh`] on each endpoint at its own interval.
///
/// Every endpoint gets a dedicated thread. Refreshes of endpoints on the
/// same device are serialized by the device session, not here. A refresh
/// that overruns its interval delays the next tick instead of queueing
/// catch-up ticks. Dropping the scheduler stops and joins all threads.
pub struct PollScheduler {
    signal: Arc<StopSignal>,
    handles: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    pub fn start(endpoints: Vec<Arc<dyn Pollable>>) -> Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let mut scheduler = PollScheduler {
            signal,
            handles: Vec::with_capacity(endpoints.len()),
        };
        for endpoint in endpoints {
            let signal = scheduler.signal.clone();
            let name = format!("poll-{}", endpoint.name());
            debug!(
                "Polling '{}' every {:?}",
                endpoint.name(),
                endpoint.poll_interval()
            );
            // On error the already spawned threads are joined by Drop
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || poll_loop(endpoint.as_ref(), &signal))?;
            scheduler.handles.push(handle);
        }
        Ok(scheduler)
    }

    pub fn is_running(&self) -> bool {
        !self.signal.is_stopped()
    }

    /// Stops polling and waits for in-flight refreshes to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.signal.stop();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("A poll thread panicked");
            }
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn poll_loop(endpoint: &dyn Pollable, signal: &StopSignal) {
    let interval = endpoint.poll_interval();
    let mut next = Instant::now().checked_add(interval);
    if next.is_none() {
        warn!(
            "Interval {:?} of '{}' is beyond the clock range, never refreshing",
            interval,
            endpoint.name()
        );
    }
    while signal.sleep_until(next) {
        trace!("Refreshing '{}'", endpoint.name());
        endpoint.refresh();
        next = next
            .and_then(|n| n.checked_add(interval))
            .map(|n| n.max(Instant::now()));
    }
    debug!("Stopped polling '{}'", endpoint.name());
}
