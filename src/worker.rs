//! A stoppable background loop shared by the point cloud reader and the frame
//! writer.
//!
//! Each [`Worker::start`] spawns one OS thread that calls its step function,
//! sleeps for the worker's period and repeats until [`Worker::stop`] raises
//! the stop flag. A step that fails ends the loop; the failure stays readable
//! through [`Worker::status`].

use crate::error::Result;

use log::{debug, error, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Where a [`Worker`] is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Never started
    Idle,
    /// Thread is looping
    Running,
    /// Exited after a stop request
    Stopped,
    /// Exited on its own because a step failed
    Failed(String),
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Running => write!(f, "running"),
            WorkerStatus::Stopped => write!(f, "stopped"),
            WorkerStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One background thread with a cooperative stop flag.
pub struct Worker {
    name: String,
    period: Duration,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    status: Arc<Mutex<WorkerStatus>>,
}

fn lock(status: &Mutex<WorkerStatus>) -> MutexGuard<'_, WorkerStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Worker {
    /// A worker that sleeps `period` between steps. `name` shows up in logs.
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            status: Arc::new(Mutex::new(WorkerStatus::Idle)),
        }
    }

    /// Spawn the loop around `step`. Does nothing while a previous loop is
    /// still alive.
    pub fn start<F>(&mut self, mut step: F)
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        if self.is_running() {
            debug!("{} is already running", self.name);
            return;
        }
        // a loop that ended on its own still has to be joined
        self.join();

        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Arc::clone(&stop);
        *lock(&self.status) = WorkerStatus::Running;

        let status = Arc::clone(&self.status);
        let name = self.name.clone();
        let period = self.period;

        self.handle = Some(thread::spawn(move || {
            info!("{} : started.", name);
            while !stop.load(Ordering::Acquire) {
                if let Err(e) = step() {
                    error!("{} : {}, giving up.", name, e);
                    *lock(&status) = WorkerStatus::Failed(e.to_string());
                    return;
                }
                spin_sleep::sleep(period);
            }
            *lock(&status) = WorkerStatus::Stopped;
            info!("{} : terminated.", name);
        }));
    }

    /// Raise the stop flag and wait for the thread to exit. Calling it again,
    /// or on a worker that never started, does nothing.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                *lock(&self.status) = WorkerStatus::Failed(format!("{} panicked", self.name));
            }
        }
    }

    /// Whether the thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Current state of the loop.
    pub fn status(&self) -> WorkerStatus {
        let status = lock(&self.status).clone();
        let crashed = self
            .handle
            .as_ref()
            .is_some_and(|handle| handle.is_finished());
        if status == WorkerStatus::Running && crashed {
            WorkerStatus::Failed(format!("{} panicked", self.name))
        } else {
            status
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::LidarError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Poll `condition` for up to two seconds.
    pub(crate) fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn counting_step(counter: &Arc<AtomicUsize>) -> impl FnMut() -> Result<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn new_worker_is_idle() {
        let worker = Worker::new("idle", Duration::from_millis(1));
        assert_eq!(worker.status(), WorkerStatus::Idle);
        assert!(!worker.is_running());
    }

    #[test]
    fn loops_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = Worker::new("loop", Duration::from_millis(1));
        worker.start(counting_step(&counter));

        assert!(wait_until(|| counter.load(Ordering::SeqCst) >= 3));
        assert_eq!(worker.status(), WorkerStatus::Running);

        worker.stop();
        assert_eq!(worker.status(), WorkerStatus::Stopped);
        let after_stop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn stop_twice_is_the_same_as_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = Worker::new("twice", Duration::from_millis(1));
        worker.start(counting_step(&counter));
        worker.stop();
        worker.stop();
        assert_eq!(worker.status(), WorkerStatus::Stopped);
        assert!(!worker.is_running());
    }

    #[test]
    fn stop_without_start_is_harmless() {
        let mut worker = Worker::new("never", Duration::from_millis(1));
        worker.stop();
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }

    #[test]
    fn second_start_while_running_is_ignored() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut worker = Worker::new("once", Duration::from_millis(1));

        worker.start(counting_step(&first));
        worker.start(counting_step(&second));
        assert!(wait_until(|| first.load(Ordering::SeqCst) >= 3));
        worker.stop();

        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn can_be_restarted_after_stop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = Worker::new("again", Duration::from_millis(1));
        worker.start(counting_step(&counter));
        worker.stop();

        let before = counter.load(Ordering::SeqCst);
        worker.start(counting_step(&counter));
        assert!(wait_until(|| counter.load(Ordering::SeqCst) > before));
        assert_eq!(worker.status(), WorkerStatus::Running);
    }

    #[test]
    fn failing_step_is_observable() {
        let mut worker = Worker::new("failing", Duration::from_millis(1));
        worker.start(|| Err(LidarError::NotOpen));

        assert!(wait_until(|| !worker.is_running()));
        assert_eq!(
            worker.status(),
            WorkerStatus::Failed("transport is not open".to_string())
        );
        // the stop flag was never raised, stopping now still works
        worker.stop();
        assert!(matches!(worker.status(), WorkerStatus::Failed(_)));
    }

    #[test]
    fn panicking_step_is_reported() {
        let mut worker = Worker::new("panicky", Duration::from_millis(1));
        worker.start(|| panic!("boom"));

        assert!(wait_until(|| !worker.is_running()));
        assert!(matches!(worker.status(), WorkerStatus::Failed(_)));
        worker.stop();
        assert_eq!(
            worker.status(),
            WorkerStatus::Failed("panicky panicked".to_string())
        );
    }

    #[test]
    fn drop_stops_the_thread() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let mut worker = Worker::new("dropped", Duration::from_millis(1));
            worker.start(counting_step(&counter));
            assert!(wait_until(|| counter.load(Ordering::SeqCst) >= 1));
        }
        let after_drop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_drop);
    }
}
