//! Worker lifecycle: Booting -> Ready -> ShuttingDown.
//!
//! While the engine boots, inbound messages are queued in arrival order. Once
//! it is ready the queue is replayed, then commands and poll ticks are
//! handled one at a time on a single task, so a tick always finishes before
//! the next command or tick starts.

use std::collections::VecDeque;
use std::future::Future;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use pivotcast_core::config::WorkerConfig;
use pivotcast_core::error::{Error, Result};
use pivotcast_engine::{EngineCore, MemoryEngine};

use crate::error::WorkerError;
use crate::host::{Flow, WorkerHost};
use crate::protocol::{Inbound, Outbound};

/// Client-side ends of a running worker.
pub struct WorkerHandle {
    pub commands: UnboundedSender<Inbound>,
    pub events: UnboundedReceiver<Outbound>,
    pub thread: JoinHandle<()>,
}

fn flush(out: &mut Vec<Outbound>, outbox: &UnboundedSender<Outbound>) {
    for msg in out.drain(..) {
        if outbox.send(msg).is_err() {
            debug!("client dropped its event receiver");
        }
    }
}

/// Run one worker to completion.
///
/// `boot` resolves to the engine. If it fails, the worker goes straight to
/// ShuttingDown. The loop ends on a `shutdown` command or when every command
/// sender is gone.
pub async fn run_worker<E, F>(
    boot: F,
    config: WorkerConfig,
    mut inbox: UnboundedReceiver<Inbound>,
    outbox: UnboundedSender<Outbound>,
) where
    E: EngineCore,
    F: Future<Output = Result<E>>,
{
    let mut queued = VecDeque::new();
    tokio::pin!(boot);
    let booted = loop {
        tokio::select! {
            biased;
            res = &mut boot => break res,
            msg = inbox.recv() => match msg {
                Some(msg) => queued.push_back(msg),
                None => {
                    debug!("inbox closed while booting");
                    let _ = outbox.send(Outbound::ShuttingDown);
                    return;
                }
            },
        }
    };
    let engine = match booted {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "engine failed to boot");
            let _ = outbox.send(Outbound::ShuttingDown);
            return;
        }
    };

    info!(queued = queued.len(), poll_ms = config.poll_interval_ms, "worker ready");
    let mut host = WorkerHost::new(engine);
    let mut out = Vec::new();

    let mut running = true;
    for msg in queued {
        if handle(&mut host, msg, &mut out) == Flow::Shutdown {
            running = false;
            break;
        }
    }
    flush(&mut out, &outbox);

    let period = config.poll_interval().max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while running {
        tokio::select! {
            biased;
            msg = inbox.recv() => match msg {
                Some(msg) => {
                    if handle(&mut host, msg, &mut out) == Flow::Shutdown {
                        running = false;
                    }
                }
                None => {
                    debug!("all command senders dropped");
                    running = false;
                }
            },
            _ = ticker.tick() => host.poll(&mut out),
        }
        flush(&mut out, &outbox);
    }

    info!("worker shutting down");
    let _ = outbox.send(Outbound::ShuttingDown);
}

fn handle<E: EngineCore>(host: &mut WorkerHost<E>, msg: Inbound, out: &mut Vec<Outbound>) -> Flow {
    match msg.decode() {
        Ok(cmd) => host.dispatch(cmd, out),
        Err(e) => {
            warn!(error = %WorkerError::from(e), "dropping undecodable command");
            Flow::Continue
        }
    }
}

/// Start a worker on its own thread with a current-thread tokio runtime.
///
/// The engine is built on the worker thread, so it need not be `Send`.
pub fn spawn_worker<E, F, B>(config: WorkerConfig, boot: B) -> std::result::Result<WorkerHandle, WorkerError>
where
    E: EngineCore + 'static,
    F: Future<Output = Result<E>> + 'static,
    B: FnOnce() -> F + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    let name = config.worker_thread_name.clone();

    let thread = std::thread::Builder::new().name(name).spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build();
        match rt {
            Ok(rt) => rt.block_on(run_worker(boot(), config, cmd_rx, evt_tx)),
            Err(e) => {
                error!(error = %WorkerError::Boot(e.to_string()), "no runtime for worker");
                let _ = evt_tx.send(Outbound::ShuttingDown);
            }
        }
    })?;

    Ok(WorkerHandle {
        commands: cmd_tx,
        events: evt_rx,
        thread,
    })
}

/// A worker over a fresh `MemoryEngine`.
pub fn spawn_memory_worker(config: WorkerConfig) -> std::result::Result<WorkerHandle, WorkerError> {
    spawn_worker(config, || async { Ok::<_, Error>(MemoryEngine::new()) })
}
