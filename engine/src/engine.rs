//! The engine: one scheduler and one network monitor shared by its stores.

use crate::collaborators::Collaborators;
use crate::model::Model;
use crate::network::NetworkMonitor;
use crate::operation::Completion;
use crate::store::Store;
use crate::{error::Result, ModelSchema, SyncConfig};
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::trace;

/// Work list of records whose queue has a head and nothing running.
#[derive(Default)]
pub struct Scheduler {
    ready: RefCell<VecDeque<Model>>,
    /// Operations started and not yet completed
    running: Cell<usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn schedule(&self, model: &Model) {
        if !model.0.scheduled.replace(true) {
            self.ready.borrow_mut().push_back(model.clone());
        }
    }

    fn pop(&self) -> Option<Model> {
        let model = self.ready.borrow_mut().pop_front()?;
        model.0.scheduled.set(false);
        Some(model)
    }

    /// Records waiting to start an operation.
    pub fn pending(&self) -> usize {
        self.ready.borrow().len()
    }

    /// Operations currently in flight.
    pub fn running(&self) -> usize {
        self.running.get()
    }

    /// Drive every queue until nothing is ready and nothing is in flight.
    ///
    /// Each record runs at most one operation at a time; operations of
    /// different records interleave at their await points.
    pub async fn run_until_idle(&self) {
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'static, (Model, Completion)>> =
            FuturesUnordered::new();

        loop {
            while let Some(model) = self.pop() {
                if let Some(run) = model.start_next() {
                    self.running.set(self.running.get() + 1);
                    in_flight.push(run);
                }
            }

            match in_flight.next().await {
                Some((model, completion)) => {
                    self.running.set(self.running.get() - 1);
                    model.complete(completion)
                }
                None => break,
            }
        }

        trace!("scheduler idle");
    }
}

/// Entry point: owns the scheduler and the network monitor.
///
/// Everything is single threaded. Operations run while
/// [`Engine::run_until_idle`] is awaited.
pub struct Engine {
    scheduler: Rc<Scheduler>,
    network: Rc<NetworkMonitor>,
}

impl Engine {
    pub fn new(network: NetworkMonitor) -> Self {
        Self {
            scheduler: Rc::new(Scheduler::new()),
            network: Rc::new(network),
        }
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Create a store for one model.
    pub fn store(
        &self,
        schema: ModelSchema,
        config: SyncConfig,
        collaborators: Collaborators,
    ) -> Result<Store> {
        schema.validate()?;
        Ok(Store::new(
            schema,
            config,
            collaborators,
            self.network.clone(),
            self.scheduler.clone(),
        ))
    }

    pub async fn run_until_idle(&self) {
        self.scheduler.run_until_idle().await
    }

    /// Nothing is waiting to start and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.scheduler.pending() == 0 && self.scheduler.running() == 0
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(NetworkMonitor::default())
    }
}
