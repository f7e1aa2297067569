//! Threaded event loop with the lock/wait/signal and one-shot timer
//! primitives the duplex driver is built on.
//!
//! One [`EventLoop`] owns a private worker thread and a user state value
//! `T` behind a single lock. Work arrives two ways:
//!
//! - posted closures ([`LoopHandle::post`]) — how backend callbacks are
//!   marshalled onto the loop thread;
//! - one-shot time events ([`LoopGuard::arm_timer`]) — how the underrun
//!   timer is scheduled.
//!
//! Both run on the loop thread with the lock held, so they can never race
//! a caller that holds the same lock. After every executed closure the
//! loop signals the caller condvar; a blocked caller
//! ([`LoopGuard::wait`]) wakes, reacquires the lock, and re-checks its
//! predicate. That is the whole bridge from the asynchronous callback
//! world to the blocking API.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use audio_duplex_core::DeviceError;

type Task<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Identifies a pending one-shot time event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u64);

struct TimeEvent<T> {
    id: TimerId,
    deadline: Instant,
    callback: Task<T>,
}

struct LoopInner<T> {
    data: T,
    tasks: VecDeque<Task<T>>,
    timers: Vec<TimeEvent<T>>,
    next_timer_id: u64,
    running: bool,
}

struct LoopShared<T> {
    inner: Mutex<LoopInner<T>>,
    /// Wakes the loop thread when tasks or timers arrive.
    wake: Condvar,
    /// Wakes callers blocked in [`LoopGuard::wait`].
    ready: Condvar,
}

/// Event loop owning the state `T` and a dedicated worker thread.
pub struct EventLoop<T: Send + 'static> {
    name: String,
    shared: Arc<LoopShared<T>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> EventLoop<T> {
    /// Create a stopped loop around `data`. `name` labels the worker
    /// thread.
    pub fn new(name: impl Into<String>, data: T) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(LoopShared {
                inner: Mutex::new(LoopInner {
                    data,
                    tasks: VecDeque::new(),
                    timers: Vec::new(),
                    next_timer_id: 0,
                    running: false,
                }),
                wake: Condvar::new(),
                ready: Condvar::new(),
            }),
            thread: None,
        }
    }

    /// Spawn the worker thread. Idempotent: a second call while the
    /// thread runs is a no-op.
    pub fn start(&mut self) -> Result<(), DeviceError> {
        if self.thread.is_some() {
            return Ok(());
        }

        self.shared.inner.lock().running = true;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_loop(&shared))
            .map_err(|e| {
                self.shared.inner.lock().running = false;
                DeviceError::Device(format!("can't start event loop thread: {}", e))
            })?;

        self.thread = Some(handle);
        Ok(())
    }

    /// Signal shutdown and join the worker thread. Safe to call when the
    /// loop never started, and safe to call repeatedly.
    pub fn stop(&mut self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.running = false;
            inner.tasks.clear();
            inner.timers.clear();
        }
        self.shared.wake.notify_all();
        self.shared.ready.notify_all();

        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Acquire the loop's lock.
    pub fn lock(&self) -> LoopGuard<'_, T> {
        LoopGuard {
            shared: &self.shared,
            inner: self.shared.inner.lock(),
        }
    }

    /// Clonable poster for marshalling work onto the loop thread.
    pub fn handle(&self) -> LoopHandle<T> {
        LoopHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl<T: Send + 'static> Drop for EventLoop<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The loop's lock, held by a caller. Dereferences to the state `T`.
pub struct LoopGuard<'a, T> {
    shared: &'a LoopShared<T>,
    inner: MutexGuard<'a, LoopInner<T>>,
}

impl<T> LoopGuard<'_, T> {
    /// Atomically release the lock and block until the loop thread has
    /// executed a task or timer, then reacquire it. Spurious wakeups are
    /// possible; callers loop on their predicate.
    pub fn wait(&mut self) {
        self.shared.ready.wait(&mut self.inner);
    }

    /// Schedule a one-shot time event executing `callback` on the loop
    /// thread, with the lock held, once `delay` has elapsed.
    pub fn arm_timer(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut T) + Send + 'static,
    ) -> TimerId {
        let id = TimerId(self.inner.next_timer_id);
        self.inner.next_timer_id += 1;
        self.inner.timers.push(TimeEvent {
            id,
            deadline: Instant::now() + delay,
            callback: Box::new(callback),
        });
        self.shared.wake.notify_one();
        id
    }

    /// Disarm a pending time event. Returns false if it already fired or
    /// was cancelled; calling again is harmless.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        let timers = &mut self.inner.timers;
        match timers.iter().position(|t| t.id == id) {
            Some(pos) => {
                timers.swap_remove(pos);
                true
            }
            None => false,
        }
    }
}

impl<T> Deref for LoopGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.data
    }
}

impl<T> DerefMut for LoopGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner.data
    }
}

/// Posts closures onto the loop thread from any other thread.
///
/// Holds only a weak reference: posting after the loop is gone or
/// stopped is a silent no-op, so late backend callbacks cannot touch a
/// torn-down device.
pub struct LoopHandle<T> {
    shared: Weak<LoopShared<T>>,
}

impl<T> Clone for LoopHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> LoopHandle<T> {
    /// Enqueue `f` to run on the loop thread with the lock held.
    pub fn post(&self, f: impl FnOnce(&mut T) + Send + 'static) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        {
            let mut inner = shared.inner.lock();
            if !inner.running {
                return;
            }
            inner.tasks.push_back(Box::new(f));
        }
        shared.wake.notify_one();
    }
}

fn run_loop<T>(shared: &LoopShared<T>) {
    let mut inner = shared.inner.lock();
    loop {
        if !inner.running {
            break;
        }

        if let Some(task) = inner.tasks.pop_front() {
            task(&mut inner.data);
            shared.ready.notify_all();
            continue;
        }

        let now = Instant::now();
        if let Some(pos) = due_timer(&inner.timers, now) {
            let event = inner.timers.swap_remove(pos);
            (event.callback)(&mut inner.data);
            shared.ready.notify_all();
            continue;
        }

        let next_deadline = inner.timers.iter().map(|t| t.deadline).min();
        match next_deadline {
            Some(deadline) => {
                let _ = shared.wake.wait_until(&mut inner, deadline);
            }
            None => shared.wake.wait(&mut inner),
        }
    }
}

/// Earliest timer whose deadline has passed, if any.
fn due_timer<T>(timers: &[TimeEvent<T>], now: Instant) -> Option<usize> {
    timers
        .iter()
        .enumerate()
        .filter(|(_, t)| t.deadline <= now)
        .min_by_key(|(_, t)| t.deadline)
        .map(|(pos, _)| pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posted_task_runs_on_loop_thread() {
        let mut el = EventLoop::new("test-loop", 0u32);
        el.start().unwrap();

        el.handle().post(|v| *v += 1);

        let mut guard = el.lock();
        while *guard == 0 {
            guard.wait();
        }
        assert_eq!(*guard, 1);
    }

    #[test]
    fn start_is_idempotent() {
        let mut el = EventLoop::new("test-loop", ());
        el.start().unwrap();
        el.start().unwrap();
        el.stop();
    }

    #[test]
    fn stop_without_start_is_safe() {
        let mut el = EventLoop::new("test-loop", ());
        el.stop();
        el.stop();
    }

    #[test]
    fn timer_fires_once_after_delay() {
        let mut el = EventLoop::new("test-loop", 0u32);
        el.start().unwrap();

        let armed_at = Instant::now();
        let mut guard = el.lock();
        guard.arm_timer(Duration::from_millis(20), |v| *v += 1);
        while *guard == 0 {
            guard.wait();
        }
        assert_eq!(*guard, 1);
        assert!(armed_at.elapsed() >= Duration::from_millis(20));
        drop(guard);

        // One-shot: nothing left to cancel.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*el.lock(), 1);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut el = EventLoop::new("test-loop", 0u32);
        el.start().unwrap();

        let id = {
            let mut guard = el.lock();
            let id = guard.arm_timer(Duration::from_millis(10), |v| *v += 1);
            assert!(guard.cancel_timer(id));
            assert!(!guard.cancel_timer(id));
            id
        };

        std::thread::sleep(Duration::from_millis(50));
        let mut guard = el.lock();
        assert_eq!(*guard, 0);
        assert!(!guard.cancel_timer(id));
    }

    #[test]
    fn post_after_stop_is_dropped() {
        let mut el = EventLoop::new("test-loop", 0u32);
        el.start().unwrap();
        let handle = el.handle();
        el.stop();

        handle.post(|v| *v += 1);
        assert_eq!(*el.lock(), 0);
    }
}
