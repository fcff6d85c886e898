use super::{current, monotonic_seconds, IdleTask, Platform, Task};
use crate::config;
use crate::enums::ExpectedRuntime;
use crate::isolate::Isolate;
use log::{debug, error, trace};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

// Delays past this are clamped, far enough out to never come due in practice.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// The bridge's own scheduler, used when the embedder supplies none and for every entry an
/// embedder table leaves out.
///
/// Background tasks run on a fixed pool of worker threads shared by every default platform,
/// sized after the configured background thread count when first used. Foreground and idle tasks are queued on the
/// isolate they target and only run when the embedder drains them with
/// `v8glue_isolate_run_enqueued_tasks` and `v8glue_isolate_run_idle_tasks`.
#[derive(Debug)]
pub struct DefaultPlatform {
    background_threads: usize,
    idle_tasks: bool,
}

impl DefaultPlatform {
    pub fn new() -> Self {
        let config = config::current();
        DefaultPlatform {
            background_threads: config.background_threads() as usize,
            idle_tasks: config.idle_task_support,
        }
    }
}

impl Default for DefaultPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for DefaultPlatform {
    fn number_of_available_background_threads(&self) -> usize {
        self.background_threads
    }

    fn call_on_background_thread(&self, task: Box<dyn Task>, expected_runtime: ExpectedRuntime) {
        trace!("queueing {:?} background task", expected_runtime);
        if let Some(task) = workers().submit(task) {
            // no worker left to take it
            let spawned = thread::Builder::new()
                .name("v8glue-overflow".to_owned())
                .spawn(move || task.run());
            if let Err(err) = spawned {
                error!("failed to spawn background task: {}", err);
            }
        }
    }

    fn call_on_foreground_thread(&self, isolate: &Isolate, task: Box<dyn Task>) {
        isolate.queues.push(task, Duration::ZERO);
    }

    fn call_delayed_on_foreground_thread(
        &self,
        isolate: &Isolate,
        task: Box<dyn Task>,
        delay_in_seconds: f64,
    ) {
        let delay = Duration::try_from_secs_f64(delay_in_seconds.max(0.0))
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY);
        isolate.queues.push(task, delay);
    }

    fn call_idle_on_foreground_thread(&self, isolate: &Isolate, task: Box<dyn IdleTask>) {
        isolate.queues.push_idle(task);
    }

    fn idle_tasks_enabled(&self, _isolate: &Isolate) -> bool {
        self.idle_tasks
    }

    fn monotonically_increasing_time(&self) -> f64 {
        monotonic_seconds()
    }
}

/// Worker threads draining one shared queue of background tasks, oldest first.
pub(crate) struct Workers {
    queue: Mutex<Sender<Box<dyn Task>>>,
    size: usize,
}

fn workers() -> &'static Workers {
    static WORKERS: OnceLock<Workers> = OnceLock::new();
    WORKERS.get_or_init(|| Workers::spawn(config::current().background_threads().max(1) as usize))
}

impl Workers {
    fn spawn(size: usize) -> Workers {
        let (sender, receiver) = mpsc::channel::<Box<dyn Task>>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut spawned = 0;
        for index in 0..size {
            let receiver = receiver.clone();
            let result = thread::Builder::new()
                .name(format!("v8glue-worker-{}", index))
                .spawn(move || Self::work(&receiver));
            match result {
                Ok(_) => spawned += 1,
                Err(err) => error!("failed to spawn background worker: {}", err),
            }
        }
        debug!("started {} background workers", spawned);
        Workers {
            queue: Mutex::new(sender),
            size: spawned,
        }
    }

    fn work(receiver: &Mutex<Receiver<Box<dyn Task>>>) {
        loop {
            // the lock is only held while waiting, never while a task runs
            let next = match receiver.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => return,
            };
            match next {
                Ok(task) => task.run(),
                Err(_) => return,
            }
        }
    }

    /// Queues `task` for the pool. Hands it back if no worker could ever run it.
    fn submit(&self, task: Box<dyn Task>) -> Option<Box<dyn Task>> {
        if self.size == 0 {
            return Some(task);
        }
        match self.queue.lock() {
            Ok(queue) => queue.send(task).err().map(|rejected| rejected.0),
            Err(_) => Some(task),
        }
    }

    pub(crate) fn pool_size() -> usize {
        workers().size
    }
}

struct Scheduled {
    due: Instant,
    seq: u64,
    task: Box<dyn Task>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // reversed: the heap pops the earliest due, oldest first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-isolate foreground and idle queues of the default platform.
#[derive(Default)]
pub struct TaskQueues {
    foreground: RefCell<BinaryHeap<Scheduled>>,
    idle: RefCell<VecDeque<Box<dyn IdleTask>>>,
    seq: Cell<u64>,
}

impl TaskQueues {
    fn push(&self, task: Box<dyn Task>, delay: Duration) {
        let seq = self.seq.get();
        self.seq.set(seq.wrapping_add(1));
        self.foreground.borrow_mut().push(Scheduled {
            due: Instant::now() + delay,
            seq,
            task,
        });
    }

    fn push_idle(&self, task: Box<dyn IdleTask>) {
        self.idle.borrow_mut().push_back(task);
    }

    /// Runs every foreground task that is due. Tasks queued while running wait for the next call.
    pub fn run_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<Scheduled> = {
            let mut queue = self.foreground.borrow_mut();
            let mut due = Vec::new();
            while queue.peek().is_some_and(|next| next.due <= now) {
                if let Some(next) = queue.pop() {
                    due.push(next);
                }
            }
            due
        };
        let count = due.len();
        for scheduled in due {
            scheduled.task.run();
        }
        count
    }

    /// Runs idle tasks until the queue is empty or `idle_time_in_seconds` has passed on the
    /// installed platform's clock, which is also the clock of the deadline the tasks receive.
    pub fn run_idle(&self, idle_time_in_seconds: f64) -> usize {
        let platform = current();
        let deadline = platform.monotonically_increasing_time() + idle_time_in_seconds.max(0.0);
        let mut count = 0;
        while platform.monotonically_increasing_time() < deadline {
            let Some(task) = self.idle.borrow_mut().pop_front() else {
                break;
            };
            task.run(deadline);
            count += 1;
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.foreground.borrow().len()
    }

    pub fn pending_idle(&self) -> usize {
        self.idle.borrow().len()
    }
}
