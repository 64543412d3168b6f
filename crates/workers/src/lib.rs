//! Channel plumbing between the main (frame loop) thread and the tile
//! worker thread pool: a lossy camera pose ring, a reliable control
//! event queue, and a decode-job/feedback pair riding the same rtrb
//! rings the teacher used for its command/feedback channels.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use crossbeam_queue::ArrayQueue;
use mapengine_protocol::{CameraPoseSample, ControlEvent, DecodeJob, WorkerFeedbackFrame};
use rtrb::{Consumer, PopError, Producer, PushError, RingBuffer};

pub struct MainThreadChannels<DataSourceHandle, Result, Error> {
    pub control_queue: MainControlQueue,
    pub camera_pose_producer: MainCameraPoseProducer,
    pub decode_job_sender: Producer<DecodeJob<DataSourceHandle>>,
    pub worker_feedback_receiver: Consumer<WorkerFeedbackFrame<Result, Error>>,
}

pub struct WorkerThreadChannels<DataSourceHandle, Result, Error> {
    pub control_queue: WorkerControlQueue,
    pub camera_pose_consumer: WorkerCameraPoseConsumer,
    pub decode_job_receiver: Consumer<DecodeJob<DataSourceHandle>>,
    pub worker_feedback_sender: Producer<WorkerFeedbackFrame<Result, Error>>,
}

// This ring is designed for single‑producer, single‑consumer use.
// The Arc inside MainCameraPoseProducer and WorkerCameraPoseConsumer is not exposed,
// preventing accidental creation of additional producers or consumers.
struct SharedCameraPoseRing {
    // Main thread writes are lock-free; when full we evict oldest and keep newest.
    queue: ArrayQueue<CameraPoseSample>,
    notify_sender: Sender<()>,
    notify_receiver: Receiver<()>,
    dropped: AtomicU64,
    pushed: AtomicU64,
}

pub struct MainCameraPoseProducer {
    shared: Arc<SharedCameraPoseRing>,
    // Cell marker keeps this type !Sync to discourage sharing one producer across threads.
    _spsc_marker: Cell<()>,
}

impl MainCameraPoseProducer {
    pub fn push(&self, sample: CameraPoseSample) {
        let mut pending_sample = sample;
        loop {
            match self.shared.queue.push(pending_sample) {
                Ok(()) => {
                    self.shared.pushed.fetch_add(1, Ordering::Relaxed);
                    match self.shared.notify_sender.try_send(()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(())) => {}
                        Err(TrySendError::Disconnected(())) => {
                            panic!("camera pose notify channel disconnected")
                        }
                    }
                    return;
                }
                Err(returned_sample) => {
                    pending_sample = returned_sample;
                    // In extreme races, the item removed here may not be the globally oldest one,
                    // because producer/consumer interleave between failed push and pop. This is
                    // acceptable for lossy pose semantics as long as newest data keeps flowing.
                    if self.shared.queue.pop().is_some() {
                        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    } else {
                        std::thread::yield_now();
                    }
                }
            }
        }
    }

    pub fn dropped_samples(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn pushed_samples(&self) -> u64 {
        self.shared.pushed.load(Ordering::Relaxed)
    }
}

pub struct WorkerCameraPoseConsumer {
    shared: Arc<SharedCameraPoseRing>,
    // Cell marker keeps this type !Sync to discourage sharing one consumer across threads.
    _spsc_marker: Cell<()>,
}

/// Drain up to `max_items` samples into `output`.
///
/// NOTE:
/// - This function APPENDS to `output`.
/// - It does NOT clear the vector.
/// - Caller is responsible for calling `output.clear()` if needed.
/// - `output` capacity is reused to avoid reallocations.
impl WorkerCameraPoseConsumer {
    pub fn drain_batch_with_wait(
        &self,
        output: &mut Vec<CameraPoseSample>,
        max_items: usize,
        wait_timeout: Duration,
    ) {
        if max_items == 0 {
            return;
        }

        let mut drained_count = 0;
        while drained_count < max_items {
            match self.shared.queue.pop() {
                Some(sample) => {
                    output.push(sample);
                    drained_count += 1;
                }
                None => break,
            }
        }
        if drained_count > 0 || wait_timeout.is_zero() {
            return;
        }

        let wait_deadline = Instant::now() + wait_timeout;
        loop {
            let now = Instant::now();
            if now >= wait_deadline {
                return;
            }
            let remaining = wait_deadline.saturating_duration_since(now);
            match self.shared.notify_receiver.recv_timeout(remaining) {
                Ok(()) => {
                    while drained_count < max_items {
                        match self.shared.queue.pop() {
                            Some(sample) => {
                                output.push(sample);
                                drained_count += 1;
                            }
                            None => break,
                        }
                    }
                    if drained_count > 0 {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => {
                    panic!("camera pose notify channel disconnected")
                }
            }
        }
    }

    pub fn dropped_samples(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn pushed_samples(&self) -> u64 {
        self.shared.pushed.load(Ordering::Relaxed)
    }
}

pub struct MainControlQueue {
    producer: Producer<ControlEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingPushTimeout {
    pub timeout: Duration,
    pub full_retries: u64,
}

impl MainControlQueue {
    pub fn push(&mut self, control: ControlEvent) -> Result<(), PushError<ControlEvent>> {
        self.producer.push(control)
    }

    pub fn blocking_push(
        &mut self,
        mut control: ControlEvent,
        timeout: Duration,
    ) -> Result<(), BlockingPushTimeout> {
        let start_time = Instant::now();
        let deadline = start_time + timeout;
        let mut full_retries = 0_u64;
        let mut park_duration = Duration::from_micros(50);

        loop {
            match self.producer.push(control) {
                Ok(()) => return Ok(()),
                Err(PushError::Full(returned_control)) => {
                    control = returned_control;
                    full_retries += 1;
                    if Instant::now() >= deadline {
                        return Err(BlockingPushTimeout {
                            timeout,
                            full_retries,
                        });
                    }

                    // Back off in stages to reduce scheduler thrash under sustained pressure.
                    if full_retries <= 64 {
                        std::hint::spin_loop();
                        continue;
                    }
                    if full_retries <= 72 {
                        std::thread::yield_now();
                        continue;
                    }

                    let remaining = deadline.saturating_duration_since(Instant::now());
                    std::thread::park_timeout(remaining.min(park_duration));
                    park_duration = (park_duration * 2).min(Duration::from_millis(1));
                }
            }
        }
    }

    pub fn blocking_push_or_panic(&mut self, control: ControlEvent, timeout: Duration) {
        if let Err(timeout_info) = self.blocking_push(control, timeout) {
            panic!(
                "control queue blocking_push timed out: timeout={:?}, full_retries={}",
                timeout_info.timeout, timeout_info.full_retries
            );
        }
    }

    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

pub struct WorkerControlQueue {
    consumer: Consumer<ControlEvent>,
}

impl WorkerControlQueue {
    pub fn pop(&mut self) -> Result<ControlEvent, PopError> {
        self.consumer.pop()
    }

    pub fn items(&self) -> usize {
        self.consumer.slots()
    }
}

pub fn create_thread_channels<DataSourceHandle, Result, Error>(
    camera_pose_ring_capacity: usize,
    control_capacity: usize,
    decode_job_capacity: usize,
    worker_feedback_capacity: usize,
) -> (
    MainThreadChannels<DataSourceHandle, Result, Error>,
    WorkerThreadChannels<DataSourceHandle, Result, Error>,
) {
    assert!(
        camera_pose_ring_capacity > 0,
        "camera pose ring capacity must be greater than zero"
    );
    assert!(
        control_capacity > 0,
        "control queue capacity must be greater than zero"
    );
    assert!(
        decode_job_capacity > 0,
        "decode job queue capacity must be greater than zero"
    );
    assert!(
        worker_feedback_capacity > 0,
        "worker feedback queue capacity must be greater than zero"
    );

    let (notify_sender, notify_receiver) = bounded(1);
    let shared_camera_pose_ring = Arc::new(SharedCameraPoseRing {
        queue: ArrayQueue::new(camera_pose_ring_capacity),
        notify_sender,
        notify_receiver,
        dropped: AtomicU64::new(0),
        pushed: AtomicU64::new(0),
    });

    let (control_sender, control_receiver) = RingBuffer::new(control_capacity);
    let (decode_job_sender, decode_job_receiver) = RingBuffer::new(decode_job_capacity);
    let (worker_feedback_sender, worker_feedback_receiver) =
        RingBuffer::new(worker_feedback_capacity);

    let main_thread_channels = MainThreadChannels {
        control_queue: MainControlQueue {
            producer: control_sender,
        },
        camera_pose_producer: MainCameraPoseProducer {
            shared: shared_camera_pose_ring.clone(),
            _spsc_marker: Cell::new(()),
        },
        decode_job_sender,
        worker_feedback_receiver,
    };

    let worker_thread_channels = WorkerThreadChannels {
        control_queue: WorkerControlQueue {
            consumer: control_receiver,
        },
        camera_pose_consumer: WorkerCameraPoseConsumer {
            shared: shared_camera_pose_ring,
            _spsc_marker: Cell::new(()),
        },
        decode_job_receiver,
        worker_feedback_sender,
    };

    (main_thread_channels, worker_thread_channels)
}
