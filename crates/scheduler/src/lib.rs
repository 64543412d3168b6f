//! Task Scheduler: named priority queues (`Create`, `FetchAndDecode`,
//! `Build`, `Evaluate`) draining under a per-frame time budget.
//! `Create` tasks always run before `FetchAndDecode` tasks so a cache
//! entry exists before its data arrives, and at least one task is
//! processed per call even once the budget is already spent, so the
//! queue always makes forward progress.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Create,
    FetchAndDecode,
    Build,
    Evaluate,
}

/// Priority order `process_pending` drains groups in: finishing
/// already-paid-for `Create` work yields visible progress before
/// fetching more.
const PROCESS_ORDER: [TaskKind; 4] =
    [TaskKind::Create, TaskKind::FetchAndDecode, TaskKind::Build, TaskKind::Evaluate];

struct ScheduledTask<Payload> {
    sequence: u64,
    estimated_process_time: Duration,
    payload: Payload,
}

impl<Payload> PartialEq for ScheduledTask<Payload> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}
impl<Payload> Eq for ScheduledTask<Payload> {}

impl<Payload> PartialOrd for ScheduledTask<Payload> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<Payload> Ord for ScheduledTask<Payload> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedulerConfig {
    /// Hard ceiling on tasks processed in one `process_pending` call,
    /// independent of the time budget — caps worst-case frame stalls
    /// from a pathologically fast task kind.
    pub max_tasks_per_call: u32,
    /// Cost assigned to a task pushed with [`TaskScheduler::push`]
    /// rather than [`TaskScheduler::push_with_cost`].
    pub default_estimated_process_time: Duration,
    /// Held back from the per-frame budget before any task runs.
    pub safety_margin: Duration,
}

impl Default for TaskSchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_call: 256,
            default_estimated_process_time: Duration::from_millis(2),
            safety_margin: Duration::from_millis(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchedulerDecision {
    pub processed: u32,
    /// Tasks remain queued after the budget ran out; the host should
    /// request another frame to keep draining them.
    pub should_request_update: bool,
}

/// Queue partitioned into named groups, each a min-heap over push
/// sequence (FIFO within the group).
pub struct TaskScheduler<Payload> {
    config: TaskSchedulerConfig,
    queues: HashMap<TaskKind, BinaryHeap<Reverse<ScheduledTask<Payload>>>>,
    next_sequence: u64,
}

impl<Payload> TaskScheduler<Payload> {
    pub fn new(config: TaskSchedulerConfig) -> Self {
        Self {
            config,
            queues: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(BinaryHeap::len).sum()
    }

    pub fn len_in(&self, kind: TaskKind) -> usize {
        self.queues.get(&kind).map_or(0, BinaryHeap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes with the scheduler's configured default cost.
    pub fn push(&mut self, kind: TaskKind, payload: Payload) {
        self.push_with_cost(kind, payload, self.config.default_estimated_process_time);
    }

    pub fn push_with_cost(&mut self, kind: TaskKind, payload: Payload, estimated_process_time: Duration) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queues.entry(kind).or_default().push(Reverse(ScheduledTask {
            sequence,
            estimated_process_time,
            payload,
        }));
    }

    /// Drops every task across all groups for which `is_expired`
    /// returns true.
    pub fn update(&mut self, is_expired: impl Fn(&Payload) -> bool) {
        for queue in self.queues.values_mut() {
            let survivors = std::mem::take(queue)
                .into_iter()
                .filter(|Reverse(task)| !is_expired(&task.payload))
                .collect();
            *queue = survivors;
        }
    }

    /// Consumes up to `limit` tasks from `kind`'s queue whose
    /// `predicate` returns true, FIFO within the group. Stops (without
    /// discarding) at the first task the predicate rejects.
    pub fn process_next(
        &mut self,
        kind: TaskKind,
        limit: usize,
        predicate: impl Fn(&Payload) -> bool,
        mut run: impl FnMut(Payload),
    ) -> u32 {
        let Some(queue) = self.queues.get_mut(&kind) else {
            return 0;
        };
        let mut processed = 0u32;
        while (processed as usize) < limit {
            match queue.peek() {
                Some(Reverse(task)) if predicate(&task.payload) => {}
                _ => break,
            }
            let Some(Reverse(task)) = queue.pop() else { break };
            run(task.payload);
            processed += 1;
        }
        processed
    }

    /// Drops all pending tasks in every group. In-flight work already
    /// handed off to a worker is not aborted by this — its result is
    /// simply discarded when it reports back.
    pub fn clear_queued_tasks(&mut self) {
        self.queues.clear();
    }

    /// Per-frame processing policy: the budget is `1000/max_fps` minus
    /// time already elapsed this frame minus a safety margin. Each
    /// task's own `estimated_process_time` — not a fresh `Instant::now()`
    /// poll — is subtracted from the remaining budget, so accounting is
    /// deterministic and independent of how long `run` actually takes.
    /// Always processes at least one task if any are queued, even
    /// already over budget, to guarantee forward progress.
    pub fn process_pending(
        &mut self,
        frame_start: Instant,
        now: Instant,
        max_fps: u32,
        mut run: impl FnMut(TaskKind, Payload),
    ) -> TaskSchedulerDecision {
        let frame_interval = Duration::from_micros(1_000_000 / max_fps.max(1) as u64);
        let elapsed = now.saturating_duration_since(frame_start);
        let mut available = frame_interval.saturating_sub(elapsed).saturating_sub(self.config.safety_margin);

        let mut processed = 0u32;
        'outer: while processed < self.config.max_tasks_per_call {
            for &kind in &PROCESS_ORDER {
                let Some(queue) = self.queues.get_mut(&kind) else { continue };
                let Some(Reverse(peeked)) = queue.peek() else { continue };
                if processed > 0 && available.is_zero() {
                    break 'outer;
                }
                let cost = peeked.estimated_process_time;
                let Some(Reverse(task)) = queue.pop() else { continue };
                run(kind, task.payload);
                processed += 1;
                available = available.saturating_sub(cost);
                continue 'outer;
            }
            break;
        }

        TaskSchedulerDecision {
            processed,
            should_request_update: !self.is_empty(),
        }
    }
}

impl<Payload> Default for TaskScheduler<Payload> {
    fn default() -> Self {
        Self::new(TaskSchedulerConfig::default())
    }
}
