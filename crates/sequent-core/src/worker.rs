use std::sync::Arc;
use std::thread;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::domain::TaskId;
use crate::future::{self, Promise, TaskFuture};
use crate::interrupt::{self, InterruptToken};
use crate::observability::Counters;
use crate::queue::TaskQueue;

/// Handle to the single worker thread.
/// - `interrupt()` で実行中スレッドに割り込みを通知する（協調的）
/// - `exited()` はスレッド終了時に settle される
pub(crate) struct Worker {
    interrupt: InterruptToken,
    exited: TaskFuture<()>,
}

impl Worker {
    /// Spawn the worker thread. The thread is detached: it exits on its own
    /// once the queue reports there is nothing left to do.
    pub(crate) fn spawn(
        config: &ServiceConfig,
        queue: Arc<TaskQueue>,
        counters: Arc<Counters>,
    ) -> std::io::Result<Self> {
        let interrupt = InterruptToken::new();
        // the id only labels the exit cell in logs
        let (exit_promise, exited) = future::pair(TaskId::generate());

        let mut builder = thread::Builder::new().name(config.worker_name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let token = interrupt.clone();
        builder.spawn(move || worker_loop(queue, counters, token, exit_promise))?;

        Ok(Self { interrupt, exited })
    }

    /// Request the worker to stop. Does not abort a running task; the task
    /// only notices if it checks [`interrupt::is_interrupted`].
    pub(crate) fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Settles once the worker thread has left its loop.
    pub(crate) fn exited(&self) -> &TaskFuture<()> {
        &self.exited
    }
}

fn worker_loop(
    queue: Arc<TaskQueue>,
    counters: Arc<Counters>,
    interrupt: InterruptToken,
    exited: Promise<()>,
) {
    interrupt::bind_current(interrupt.clone());
    info!("worker started");

    // take() は「受付中 or キューが空でない」間だけ record を返す
    while let Some(record) = queue.take(&interrupt) {
        let task_id = record.id();
        let queued_ms = (Utc::now() - record.submitted_at()).num_milliseconds();
        debug!(%task_id, queued_ms, "task started");

        let state = record.run();
        counters.record_finished(state);
        debug!(%task_id, ?state, "task finished");
    }

    queue.mark_stopped();
    info!(interrupted = interrupt.is_interrupted(), "worker stopped");
    exited.complete(());
}
