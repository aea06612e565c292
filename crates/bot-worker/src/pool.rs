//! Bounded pool of pre-warmed engines.
//!
//! A single actor task owns every idle engine. Sessions ask for one over a
//! request channel and get it back through a oneshot reply, wrapped in a
//! [`PooledEngine`] guard that sends it home when dropped. Engines whose
//! process has exited are never handed out; their replacements start in
//! background tasks and join the pool when ready, so a slow restart never
//! blocks the actor.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::error::BotError;
use crate::oracle::{OracleFactory, SearchOracle};

const RESPAWN_RETRY: Duration = Duration::from_secs(1);

enum PoolRequest {
    Checkout(oneshot::Sender<Box<dyn SearchOracle>>),
    Return(Box<dyn SearchOracle>),
    Status(oneshot::Sender<PoolStatus>),
    /// A replacement engine finished starting, or failed to
    Spawned(Result<Box<dyn SearchOracle>, BotError>),
    Retry,
    Shutdown(oneshot::Sender<()>),
}

/// Snapshot of the pool's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub size: usize,
    pub idle: usize,
    /// Engines currently lent to sessions
    pub outstanding: usize,
    /// Sessions blocked in `checkout`
    pub waiting: usize,
    /// Slots without an engine, replacement pending or failed
    pub vacant: usize,
    /// Dead engines replaced since start
    pub replaced: u64,
}

/// Handle to the engine pool. Cheap to clone; all clones share one actor.
#[derive(Clone)]
pub struct EnginePool {
    requests: mpsc::UnboundedSender<PoolRequest>,
    size: usize,
}

impl EnginePool {
    /// Start `size` engines and the actor that lends them out.
    pub async fn start(factory: Arc<dyn OracleFactory>, size: usize) -> Result<Self, BotError> {
        if size == 0 {
            return Err(BotError::Config("engine pool size must be at least 1".into()));
        }

        let mut idle = VecDeque::with_capacity(size);
        for engine_id in 0..size {
            idle.push_back(factory.spawn().await?);
            info!(engine_id, "Engine ready");
        }

        let (requests, receiver) = mpsc::unbounded_channel();
        let actor = PoolActor {
            factory,
            idle,
            waiting: VecDeque::new(),
            requests: requests.downgrade(),
            spawning: 0,
            retry_pending: false,
            size,
            outstanding: 0,
            vacant: 0,
            replaced: 0,
        };
        tokio::spawn(actor.run(receiver));

        Ok(Self { requests, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for an idle engine. The engine goes back when the guard drops.
    pub async fn checkout(&self) -> Result<PooledEngine, BotError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(PoolRequest::Checkout(reply))
            .map_err(|_| BotError::PoolClosed)?;
        let engine = response.await.map_err(|_| BotError::PoolClosed)?;
        Ok(PooledEngine {
            engine: Some(engine),
            returns: self.requests.clone(),
        })
    }

    pub async fn status(&self) -> Result<PoolStatus, BotError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(PoolRequest::Status(reply))
            .map_err(|_| BotError::PoolClosed)?;
        response.await.map_err(|_| BotError::PoolClosed)
    }

    /// Quit idle engines and stop lending. Engines still checked out are
    /// killed when their guards drop.
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.requests.send(PoolRequest::Shutdown(done)).is_ok() {
            let _ = finished.await;
        }
    }
}

/// An engine lent by the pool.
pub struct PooledEngine {
    engine: Option<Box<dyn SearchOracle>>,
    returns: mpsc::UnboundedSender<PoolRequest>,
}

impl Deref for PooledEngine {
    type Target = dyn SearchOracle;

    fn deref(&self) -> &Self::Target {
        self.engine.as_deref().expect("engine present until drop")
    }
}

impl DerefMut for PooledEngine {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine.as_deref_mut().expect("engine present until drop")
    }
}

impl Drop for PooledEngine {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            // A closed pool just lets the engine die with the box
            let _ = self.returns.send(PoolRequest::Return(engine));
        }
    }
}

struct PoolActor {
    factory: Arc<dyn OracleFactory>,
    idle: VecDeque<Box<dyn SearchOracle>>,
    waiting: VecDeque<oneshot::Sender<Box<dyn SearchOracle>>>,
    requests: mpsc::WeakUnboundedSender<PoolRequest>,
    /// Replacements currently starting
    spawning: usize,
    retry_pending: bool,
    size: usize,
    outstanding: usize,
    vacant: usize,
    replaced: u64,
}

impl PoolActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<PoolRequest>) {
        while let Some(request) = receiver.recv().await {
            match request {
                PoolRequest::Checkout(reply) => {
                    self.waiting.push_back(reply);
                    self.dispatch();
                }
                PoolRequest::Return(engine) => {
                    self.outstanding = self.outstanding.saturating_sub(1);
                    self.restock(engine);
                    self.dispatch();
                }
                PoolRequest::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                PoolRequest::Spawned(result) => {
                    self.spawning = self.spawning.saturating_sub(1);
                    match result {
                        Ok(engine) => {
                            self.vacant = self.vacant.saturating_sub(1);
                            self.replaced += 1;
                            info!(replaced = self.replaced, "Replacement engine ready");
                            self.idle.push_back(engine);
                        }
                        Err(e) => {
                            error!(error = %e, vacant = self.vacant, "Failed to start replacement engine");
                            self.schedule_retry();
                        }
                    }
                    self.dispatch();
                }
                PoolRequest::Retry => {
                    self.retry_pending = false;
                    self.refill();
                    self.dispatch();
                }
                PoolRequest::Shutdown(done) => {
                    info!(idle = self.idle.len(), "Shutting down engine pool");
                    for mut engine in self.idle.drain(..) {
                        engine.quit().await;
                    }
                    self.waiting.clear();
                    let _ = done.send(());
                    return;
                }
            }
        }
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.size,
            idle: self.idle.len(),
            outstanding: self.outstanding,
            waiting: self.waiting.iter().filter(|w| !w.is_closed()).count(),
            vacant: self.vacant,
            replaced: self.replaced,
        }
    }

    /// Hand idle engines to waiters in arrival order.
    fn dispatch(&mut self) {
        while let Some(reply) = self.waiting.pop_front() {
            if reply.is_closed() {
                continue;
            }
            let Some(engine) = self.take_idle() else {
                self.waiting.push_front(reply);
                return;
            };
            match reply.send(engine) {
                Ok(()) => self.outstanding += 1,
                // The waiter gave up between asking and receiving
                Err(engine) => self.idle.push_front(engine),
            }
        }
    }

    /// Next live idle engine. Dead ones free their slot for a replacement.
    fn take_idle(&mut self) -> Option<Box<dyn SearchOracle>> {
        while let Some(mut engine) = self.idle.pop_front() {
            if engine.is_alive() {
                return Some(engine);
            }
            warn!("Idle engine found dead on checkout, replacing");
            drop(engine);
            self.vacant += 1;
            self.refill();
        }
        None
    }

    /// Put a returned engine back, replacing it if its process died.
    fn restock(&mut self, mut engine: Box<dyn SearchOracle>) {
        if engine.is_alive() {
            self.idle.push_back(engine);
            return;
        }
        warn!("Returned engine is dead, replacing");
        drop(engine);
        self.vacant += 1;
        self.refill();
    }

    /// Start one replacement per vacant slot that has none in flight.
    fn refill(&mut self) {
        let Some(sender) = self.requests.upgrade() else {
            return;
        };
        while self.spawning < self.vacant {
            self.spawning += 1;
            let factory = Arc::clone(&self.factory);
            let sender = sender.clone();
            tokio::spawn(async move {
                let result = factory.spawn().await;
                // A closed pool drops the late engine
                let _ = sender.send(PoolRequest::Spawned(result));
            });
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry_pending {
            return;
        }
        let Some(sender) = self.requests.upgrade() else {
            return;
        };
        self.retry_pending = true;
        tokio::spawn(async move {
            tokio::time::sleep(RESPAWN_RETRY).await;
            let _ = sender.send(PoolRequest::Retry);
        });
    }
}
