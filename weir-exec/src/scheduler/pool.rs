//! Worker pool with local queues, stealing and suspension.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use weir_types::decimal::ensure_decimal_context;

use crate::config::Config;

use super::task::{Task, TaskResult};

type BoxedTask = Box<dyn Task>;

struct Shared {
    config: Config,
    local: Vec<Mutex<VecDeque<BoxedTask>>>,
    injector: Mutex<VecDeque<BoxedTask>>,
    wakeup: Condvar,
    wakeup_lock: Mutex<()>,
    shutdown: AtomicBool,
    pending: AtomicUsize,
    idle: Condvar,
    idle_lock: Mutex<()>,
}

impl Shared {
    fn pop_task(&self, worker: usize) -> Option<BoxedTask> {
        if let Some(task) = self.local[worker].lock().expect("poisoned").pop_front() {
            return Some(task);
        }
        if let Some(task) = self.injector.lock().expect("poisoned").pop_front() {
            return Some(task);
        }
        if self.config.stealing_enabled {
            let n = self.local.len();
            for offset in 1..n {
                let victim = (worker + offset) % n;
                if let Some(task) = self.local[victim].lock().expect("poisoned").pop_back() {
                    tracing::trace!(worker, victim, "task stolen");
                    return Some(task);
                }
            }
        }
        None
    }

    fn task_finished(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock().expect("poisoned");
            self.idle.notify_all();
        }
    }
}

/// Fixed-size worker pool executing [`Task`]s.
///
/// Each worker owns a local deque; submission routes to the preferred worker
/// when affinity is configured, round-robin otherwise. Workers check their
/// local queue `worker_try_count` times (optionally waiting
/// `task_polling_wait` spins between checks), steal from siblings after
/// `stealing_wait` empty local checks, and finally either busy-spin
/// (`busy_worker`) or suspend for `worker_suspend_timeout` microseconds.
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    next_worker: AtomicUsize,
}

impl TaskScheduler {
    /// Starts the pool described by `config`.
    pub fn new(config: Config) -> Self {
        let size = config.thread_pool_size.max(1);
        let shared = Arc::new(Shared {
            local: (0..size).map(|_| Mutex::new(VecDeque::new())).collect(),
            injector: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
            wakeup_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            idle: Condvar::new(),
            idle_lock: Mutex::new(()),
            config,
        });
        let workers = (0..size)
            .map(|index| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("weir-worker-{index}"))
                    .spawn(move || worker_loop(index, shared))
                    .expect("worker thread spawn")
            })
            .collect();
        Self { shared, workers, next_worker: AtomicUsize::new(0) }
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.shared.local.len()
    }

    /// Submits a task.
    ///
    /// Lightweight jobs run inline on the calling thread when the hybrid
    /// scheduler is enabled; everything else is queued.
    pub fn schedule(&self, mut task: BoxedTask) {
        let config = &self.shared.config;
        if config.enable_hybrid_scheduler && task.job_level() < config.lightweight_job_level {
            ensure_decimal_context();
            while task.run() == TaskResult::Yield {}
            return;
        }
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.enqueue(task);
    }

    fn enqueue(&self, task: BoxedTask) {
        let worker = self.route(task.preferred_worker());
        self.shared.local[worker].lock().expect("poisoned").push_back(task);
        let _guard = self.shared.wakeup_lock.lock().expect("poisoned");
        self.shared.wakeup.notify_all();
    }

    fn route(&self, preferred: Option<usize>) -> usize {
        let n = self.worker_count();
        let config = &self.shared.config;
        if let Some(p) = preferred {
            if config.core_affinity {
                return (config.initial_core + p) % n;
            }
            return p % n;
        }
        self.next_worker.fetch_add(1, Ordering::Relaxed) % n
    }

    /// Blocks until every queued task has completed or aborted.
    pub fn wait_for_idle(&self) {
        let watcher = Duration::from_micros(self.shared.config.watcher_interval_us.max(1));
        let mut guard = self.shared.idle_lock.lock().expect("poisoned");
        while self.shared.pending.load(Ordering::Acquire) != 0 {
            let (next, _) = self.shared.idle.wait_timeout(guard, watcher).expect("poisoned");
            guard = next;
        }
    }

    /// Stops the workers; queued tasks that never ran are dropped.
    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let _guard = self.shared.wakeup_lock.lock().expect("poisoned");
            self.shared.wakeup.notify_all();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, shared: Arc<Shared>) {
    ensure_decimal_context();
    tracing::debug!(worker = index, "worker started");
    let config = &shared.config;
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        let mut found = None;
        let tries = config.worker_try_count.max(1);
        for attempt in 0..tries {
            // local-first; stealing kicks in after the configured number of
            // local misses
            let task = if attempt < config.stealing_wait || !config.stealing_enabled {
                shared.local[index]
                    .lock()
                    .expect("poisoned")
                    .pop_front()
                    .or_else(|| shared.injector.lock().expect("poisoned").pop_front())
            } else {
                shared.pop_task(index)
            };
            if task.is_some() {
                found = task;
                break;
            }
            for _ in 0..config.task_polling_wait {
                std::hint::spin_loop();
            }
        }
        let Some(mut task) = found else {
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            if config.busy_worker {
                std::thread::yield_now();
            } else {
                let guard = shared.wakeup_lock.lock().expect("poisoned");
                let timeout = Duration::from_micros(config.worker_suspend_timeout_us.max(1));
                let _ = shared.wakeup.wait_timeout(guard, timeout).expect("poisoned");
            }
            continue;
        };
        match task.run() {
            TaskResult::Yield => {
                // back of the local queue so siblings make progress first
                shared.local[index].lock().expect("poisoned").push_back(task);
            }
            TaskResult::Complete | TaskResult::Aborted => {
                shared.task_finished();
            }
        }
    }
    tracing::debug!(worker = index, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingTask {
        counter: Arc<AtomicU32>,
        yields_left: u32,
    }

    impl Task for CountingTask {
        fn run(&mut self) -> TaskResult {
            if self.yields_left > 0 {
                self.yields_left -= 1;
                return TaskResult::Yield;
            }
            self.counter.fetch_add(1, Ordering::SeqCst);
            TaskResult::Complete
        }
    }

    fn config(workers: usize) -> Config {
        Config {
            thread_pool_size: workers,
            worker_suspend_timeout_us: 1000,
            ..Config::default()
        }
    }

    #[test]
    fn runs_all_tasks() {
        let scheduler = TaskScheduler::new(config(2));
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..16 {
            scheduler.schedule(Box::new(CountingTask {
                counter: Arc::clone(&counter),
                yields_left: 0,
            }));
        }
        scheduler.wait_for_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn yielded_tasks_are_rescheduled() {
        let scheduler = TaskScheduler::new(config(1));
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.schedule(Box::new(CountingTask {
            counter: Arc::clone(&counter),
            yields_left: 3,
        }));
        scheduler.wait_for_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hybrid_runs_lightweight_jobs_inline() {
        let mut cfg = config(1);
        cfg.lightweight_job_level = 100;
        let scheduler = TaskScheduler::new(cfg);
        let counter = Arc::new(AtomicU32::new(0));
        scheduler.schedule(Box::new(CountingTask {
            counter: Arc::clone(&counter),
            yields_left: 1,
        }));
        // inline execution completes before schedule returns
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stealing_drains_unbalanced_queues() {
        let mut cfg = config(4);
        cfg.stealing_enabled = true;
        cfg.stealing_wait = 1;
        let scheduler = TaskScheduler::new(cfg);
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..32 {
            scheduler.schedule(Box::new(CountingTask {
                counter: Arc::clone(&counter),
                yields_left: 0,
            }));
        }
        scheduler.wait_for_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }
}
