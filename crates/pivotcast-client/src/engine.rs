//! The client-side engine proxy and its message router.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use once_cell::sync::OnceCell;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use pivotcast_core::config::{Transport, WorkerConfig};
use pivotcast_core::error::Result as CoreResult;
use pivotcast_core::flat::FlatResult;
use pivotcast_core::id::TableName;
use pivotcast_core::mapper::Dtype;
use pivotcast_core::schema::Schema;
use pivotcast_engine::EngineCore;
use pivotcast_worker::{spawn_memory_worker, spawn_worker, Command, Inbound, Outbound, WorkerHandle};

use crate::error::{ClientError, Result};
use crate::table::Table;
use crate::view::ViewEvent;

pub(crate) type Callback = Arc<dyn Fn(&ViewEvent) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Callbacks of one view.
///
/// `in_flight` is held by the router for the whole delivery of one message,
/// so taking it after clearing `alive` waits out a delivery in progress.
struct Subscribers {
    alive: AtomicBool,
    callbacks: Mutex<Vec<Callback>>,
    in_flight: Mutex<()>,
}

#[derive(Default)]
struct RouterState {
    subscriptions: Mutex<HashMap<String, Arc<Subscribers>>>,
    flat_waiters: Mutex<HashMap<String, Vec<oneshot::Sender<FlatResult>>>>,
    shutdown_waiters: Mutex<Vec<oneshot::Sender<()>>>,
    closed: AtomicBool,
    router_thread: OnceCell<ThreadId>,
}

impl RouterState {
    fn notify(&self, name: &str, event: &ViewEvent) {
        let Some(subs) = lock(&self.subscriptions).get(name).cloned() else {
            return;
        };
        let _flight = lock(&subs.in_flight);
        let callbacks = lock(&subs.callbacks).clone();
        for cb in callbacks {
            if !subs.alive.load(Ordering::Acquire) {
                break;
            }
            if catch_unwind(AssertUnwindSafe(|| cb(event))).is_err() {
                error!(view = name, "subscriber callback panicked");
            }
        }
    }

    /// Mark closed while holding both waiter lists, so a waiter is either
    /// registered before this and released here, or sees `closed`.
    fn close(&self) {
        let mut flat = lock(&self.flat_waiters);
        let mut shutdown = lock(&self.shutdown_waiters);
        self.closed.store(true, Ordering::Release);
        flat.clear();
        for waiter in shutdown.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn route(&self, msg: Outbound) -> bool {
        match msg {
            Outbound::Snapshot { name, snapshot } => {
                // Subscribers see a snapshot before any `to_flat` it settles.
                self.notify(&name, &ViewEvent::Snapshot(snapshot.clone()));
                let waiters = lock(&self.flat_waiters).remove(&name).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(snapshot.clone());
                }
                true
            }
            Outbound::Update { name, updates } => {
                self.notify(&name, &ViewEvent::Update(updates));
                true
            }
            Outbound::ShuttingDown => false,
        }
    }
}

fn run_router(state: Arc<RouterState>, mut events: UnboundedReceiver<Outbound>) {
    let _ = state.router_thread.set(thread::current().id());
    while let Some(msg) = events.blocking_recv() {
        if !state.route(msg) {
            debug!("worker is shutting down");
            break;
        }
    }
    state.close();
}

struct Shared {
    commands: UnboundedSender<Inbound>,
    transport: Transport,
    state: Arc<RouterState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Proxy for one worker. Cheap to clone; tables and views hold a clone.
///
/// Dropping the last clone closes the command channel, which shuts the
/// worker down.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Start a worker over the in-memory engine.
    pub fn new(config: WorkerConfig) -> Result<Engine> {
        let transport = config.transport;
        let handle = spawn_memory_worker(config)?;
        Engine::from_handle(handle, transport)
    }

    /// Start a worker over a custom engine built on the worker thread.
    pub fn spawn<E, F, B>(config: WorkerConfig, boot: B) -> Result<Engine>
    where
        E: EngineCore + 'static,
        F: Future<Output = CoreResult<E>> + 'static,
        B: FnOnce() -> F + Send + 'static,
    {
        let transport = config.transport;
        let handle = spawn_worker(config, boot)?;
        Engine::from_handle(handle, transport)
    }

    pub fn from_handle(handle: WorkerHandle, transport: Transport) -> Result<Engine> {
        let WorkerHandle {
            commands,
            events,
            thread,
        } = handle;
        let state = Arc::new(RouterState::default());
        let router_state = Arc::clone(&state);
        thread::Builder::new()
            .name("pivotcast-router".into())
            .spawn(move || run_router(router_state, events))
            .map_err(pivotcast_worker::WorkerError::from)?;
        Ok(Engine {
            shared: Arc::new(Shared {
                commands,
                transport,
                state,
                worker: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Whether buffers move to the worker without a copy.
    pub fn transferable(&self) -> bool {
        self.shared.transport == Transport::Shared
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.closed.load(Ordering::Acquire)
    }

    /// Create a table with a generated name.
    pub fn table(&self, schema: Schema) -> Table {
        self.table_named(TableName::fresh().as_str(), schema, None)
    }

    /// Create a table. With `index`, updates upsert by that column; without
    /// one, they append.
    pub fn table_named(&self, name: &str, schema: Schema, index: Option<&str>) -> Table {
        self.post(Command::CreateTable {
            name: name.to_string(),
            names: schema.names().map(str::to_string).collect(),
            types: schema.types().map(|t| t.as_str().to_string()).collect(),
            index: index.map(str::to_string),
        });
        Table::new(name.to_string(), schema, index.map(str::to_string), self.clone())
    }

    /// Ask the worker to stop, and wait until it has.
    pub fn shutdown(&self) -> impl Future<Output = ()> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = lock(&self.shared.state.shutdown_waiters);
        if self.is_closed() {
            let _ = tx.send(());
            drop(waiters);
        } else {
            waiters.push(tx);
            drop(waiters);
            self.post(Command::Shutdown);
        }
        async move {
            let _ = rx.await;
        }
    }

    /// Join the worker thread once it has shut down.
    pub fn join(&self) {
        if let Some(thread) = lock(&self.shared.worker).take() {
            if thread.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }

    pub(crate) fn post(&self, cmd: Command) {
        if self.is_closed() {
            warn!(cmd = cmd.tag(), "engine is shut down, dropping command");
            return;
        }
        let msg = match self.shared.transport {
            Transport::Shared => Inbound::Command(cmd),
            Transport::Serialized => match serde_json::to_vec(&cmd) {
                Ok(bytes) => Inbound::Encoded(bytes),
                Err(e) => {
                    error!(cmd = cmd.tag(), error = %e, "could not encode command");
                    return;
                }
            },
        };
        if self.shared.commands.send(msg).is_err() {
            warn!("worker channel closed");
        }
    }

    pub(crate) fn subscribe(&self, view: &str, callback: Callback) {
        let mut subs = lock(&self.shared.state.subscriptions);
        let entry = subs.entry(view.to_string()).or_insert_with(|| {
            Arc::new(Subscribers {
                alive: AtomicBool::new(true),
                callbacks: Mutex::new(Vec::new()),
                in_flight: Mutex::new(()),
            })
        });
        lock(&entry.callbacks).push(callback);
    }

    /// Drop every callback of `view`. Once this returns none of them runs
    /// again; a delivery in progress on the router is waited out, unless this
    /// is called from a callback.
    pub(crate) fn unsubscribe_all(&self, view: &str) {
        let removed = lock(&self.shared.state.subscriptions).remove(view);
        let Some(subs) = removed else {
            return;
        };
        subs.alive.store(false, Ordering::Release);
        if self.shared.state.router_thread.get() != Some(&thread::current().id()) {
            drop(lock(&subs.in_flight));
        }
    }

    /// Resolve with the next snapshot of `view`.
    pub(crate) fn next_snapshot(&self, view: &str) -> impl Future<Output = Result<FlatResult>> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = lock(&self.shared.state.flat_waiters);
        if !self.is_closed() {
            waiters.entry(view.to_string()).or_default().push(tx);
            drop(waiters);
            self.post(Command::ViewSnapshot {
                name: view.to_string(),
            });
        }
        async move { rx.await.map_err(|_| ClientError::Closed) }
    }

    /// Storage dtypes of a logical schema, for client-side validation.
    pub(crate) fn storage_types(schema: &Schema) -> Vec<Dtype> {
        schema.types().map(|t| t.storage_type()).collect()
    }
}
