use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use secs_timing::Duration;
use secs_utils::{ThreadPriority, thread_boot};

/// One listener-category delivery worker: a dedicated thread draining a
/// FIFO and fanning each item out to every registered listener in
/// publication order. Grounded on `secscommunicator.py`'s
/// `CallbackQueuing` (one background thread per listener category,
/// draining a queue into callbacks) — collapsed here to one queue per
/// *category* rather than per listener, since a category's listeners all
/// want the same delivery order and none should be able to stall another
/// category's delivery.
pub struct Dispatcher<T: Clone + Send + 'static> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    cond: Condvar,
    terminated: Mutex<bool>,
    listeners: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T: Clone + Send + 'static> Default for Dispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Dispatcher<T> {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            terminated: Mutex::new(false),
            listeners: Mutex::new(Vec::new()),
        });
        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("secs-listener".into())
            .spawn(move || {
                thread_boot(None, ThreadPriority::OSDefault);
                Self::drain(&worker_shared);
            })
            .expect("spawn listener delivery worker");
        Self { shared, worker: Mutex::new(Some(handle)) }
    }

    fn drain(shared: &Shared<T>) {
        loop {
            let item = {
                let mut q = shared.queue.lock().unwrap();
                loop {
                    if let Some(item) = q.pop_front() {
                        break Some(item);
                    }
                    if *shared.terminated.lock().unwrap() {
                        break None;
                    }
                    q = shared.cond.wait(q).unwrap();
                }
            };
            let Some(item) = item else { return };
            for listener in shared.listeners.lock().unwrap().iter() {
                listener(&item);
            }
        }
    }

    /// Registers a listener. Delivered items are fanned out to every
    /// registered listener, in registration order.
    pub fn register<F: Fn(&T) + Send + Sync + 'static>(&self, listener: F) {
        self.shared.listeners.lock().unwrap().push(Box::new(listener));
    }

    pub fn publish(&self, item: T) {
        let mut q = self.shared.queue.lock().unwrap();
        if *self.shared.terminated.lock().unwrap() {
            return;
        }
        q.push_back(item);
        self.shared.cond.notify_all();
    }

    /// Drains in-flight items then stops the worker. Idempotent.
    pub fn shutdown(&self) {
        *self.shared.terminated.lock().unwrap() = true;
        self.shared.cond.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn delivers_to_every_registered_listener_in_order() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let sa = seen_a.clone();
        let sb = seen_b.clone();
        dispatcher.register(move |item: &u32| sa.lock().unwrap().push(*item));
        dispatcher.register(move |item: &u32| sb.lock().unwrap().push(*item));

        for i in 0..5 {
            dispatcher.publish(i);
        }
        dispatcher.shutdown();

        assert_eq!(*seen_a.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(*seen_b.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn publish_after_shutdown_is_a_silent_no_op() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        dispatcher.register(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.shutdown();
        dispatcher.publish(1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
