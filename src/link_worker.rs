use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::LinkConfig;
use crate::core::{CommError, ErrorClass, Transport};
use crate::errors::LinkError;
use crate::op_queue::OpQueue;
use crate::operation::{Disposition, Operation, Progress, LOG_TARGET};
use crate::serial::Connector;

/// Runs the operations queued for one link, one at a time, over a single connection.
///
/// Operations on a link are strictly serialized: each runs to completion (or to a failed
/// attempt) before the next is taken from the queue. Failed attempts are handled by error
/// class: corrupt responses drain the link, I/O failures drop the connection and reconnect
/// after a delay, and everything is retried according to the operation's own policy.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use roadlink::g4::OpQueryStats;
/// use roadlink::{LinkConfig, LinkWorker, Protocol, RetryPolicy};
/// use roadlink_core::{Controller, DropAddress};
/// use roadlink_testing::{MockController, VirtualConnector, VirtualG4};
///
/// let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(2), 1)));
/// let config = LinkConfig::new("g4_link", Protocol::G4, "virtual");
/// let mut worker = LinkWorker::new(&config, Box::new(VirtualConnector::new().with_device(sensor)));
///
/// let controller = Arc::new(MockController::new("ctl_2", DropAddress(2)));
/// assert!(worker.queue().push(OpQueryStats::operation(controller.clone(), RetryPolicy::Limited(2))));
/// worker.run_pending();
/// assert!(controller.is_configured());
/// assert_eq!(Some(false), controller.comm_failed());
/// ```
#[derive(Debug)]
pub struct LinkWorker {
    name: String,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport + Send>>,
    queue: Arc<OpQueue>,
    reconnect_delay: Duration,
    idle_wait: Duration,
    op_ceiling: Duration,
}

impl LinkWorker {
    /// Creates a worker for `config` that opens connections with `connector`.
    pub fn new(config: &LinkConfig, connector: Box<dyn Connector>) -> Self {
        LinkWorker {
            name: config.name.clone(),
            connector,
            transport: None,
            queue: Arc::new(OpQueue::new()),
            reconnect_delay: config.reconnect_delay(),
            idle_wait: config.idle_wait(),
            op_ceiling: config.op_ceiling(),
        }
    }

    /// Creates a worker for `config` using the serial or TCP connector its URI selects.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] if the configuration is invalid or
    /// [`LinkError::Transport`] if no connector fits its URI.
    pub fn from_config(config: &LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;
        Ok(Self::new(config, config.connector()?))
    }

    /// Name of the link.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this worker drains; push operations onto it to schedule them.
    pub fn queue(&self) -> Arc<OpQueue> {
        self.queue.clone()
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Runs queued operations until the queue is empty.
    ///
    /// Operations that are requeued (retries and perpetual operations) keep this running,
    /// so don't call it with a perpetual operation queued.
    pub fn run_pending(&mut self) {
        while let Some(op) = self.queue.next(Duration::ZERO) {
            self.perform(op);
        }
    }

    /// Moves the worker onto its own thread, which runs until [`LinkHandle::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Spawn`] if the thread can't be started.
    pub fn spawn(self) -> Result<LinkHandle, LinkError> {
        let name = self.name.clone();
        let queue = self.queue();
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(format!("link-{}", name))
                .spawn(move || self.run(&stop))
                .map_err(|source| LinkError::Spawn {
                    link: name.clone(),
                    source,
                })?
        };
        info!(target: LOG_TARGET, "{}: worker started", name);
        Ok(LinkHandle {
            name,
            queue,
            stop,
            thread: Some(thread),
        })
    }

    fn run(mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            if let Some(op) = self.queue.next(self.idle_wait) {
                if stop.load(Ordering::SeqCst) {
                    self.abandon(op);
                    break;
                }
                self.perform(op);
            } else if self.queue.is_closed() {
                break;
            }
        }
        self.transport = None;
        info!(target: LOG_TARGET, "{}: worker stopped", self.name);
    }

    /// Runs one attempt of `op`, requeueing it if it should run again.
    fn perform(&mut self, mut op: Box<dyn Operation>) {
        let disposition = match self.attempt(op.as_mut()) {
            Ok(Progress::Yield) => Disposition::Retry,
            Ok(_) => Disposition::Abandon,
            Err(e) => {
                self.recover(&e);
                op.fail(&e)
            }
        };
        if disposition == Disposition::Retry {
            // The queue is closed or already holds an identical operation.
            if let Err(op) = self.queue.try_push(op) {
                self.abandon(op);
            }
        }
    }

    fn attempt(&mut self, op: &mut dyn Operation) -> Result<Progress, CommError> {
        let ceiling = self.op_ceiling;
        let transport = self.connect()?;
        let started = Instant::now();
        loop {
            match op.step(transport.as_mut())? {
                Progress::Continue if started.elapsed() > ceiling => {
                    return Err(CommError::Timeout {
                        elapsed: started.elapsed(),
                    });
                }
                Progress::Continue => {}
                progress => return Ok(progress),
            }
        }
    }

    fn connect(&mut self) -> Result<&mut Box<dyn Transport + Send>, CommError> {
        if self.transport.is_none() {
            match self.connector.connect() {
                Ok(transport) => {
                    info!(target: LOG_TARGET, "{}: connected to {}", self.name, self.connector.uri());
                    self.transport = Some(transport);
                }
                Err(e) => {
                    warn!(target: LOG_TARGET, "{}: connect failed: {}", self.name, e);
                    thread::sleep(self.reconnect_delay);
                    return Err(io::Error::new(io::ErrorKind::NotConnected, e.to_string()).into());
                }
            }
        }
        self.transport
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected).into())
    }

    fn recover(&mut self, e: &CommError) {
        match e.class() {
            ErrorClass::Parsing | ErrorClass::Checksum => {
                warn!(target: LOG_TARGET, "{}: {}, draining input", self.name, e);
                let drained = self.transport.as_mut().map_or(Ok(()), |transport| transport.drain());
                if let Err(drain_error) = drained {
                    warn!(target: LOG_TARGET, "{}: drain failed: {}", self.name, drain_error);
                    self.disconnect();
                }
            }
            ErrorClass::Io => {
                warn!(target: LOG_TARGET, "{}: {}", self.name, e);
                self.disconnect();
            }
            _ => debug!(target: LOG_TARGET, "{}: {}", self.name, e),
        }
    }

    fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!(target: LOG_TARGET, "{}: disconnected, reconnecting in {:?}", self.name, self.reconnect_delay);
            thread::sleep(self.reconnect_delay);
        }
    }

    fn abandon(&self, mut op: Box<dyn Operation>) {
        debug!(target: LOG_TARGET, "{}: dropping {}", self.name, op.description());
        op.abandon();
    }
}

/// Controls a [`LinkWorker`] running on its own thread.
#[derive(Debug)]
pub struct LinkHandle {
    name: String,
    queue: Arc<OpQueue>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LinkHandle {
    /// Name of the link.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The worker's queue.
    pub fn queue(&self) -> Arc<OpQueue> {
        self.queue.clone()
    }

    /// Queues `op` on the link, returning `false` if it was refused.
    pub fn push(&self, op: Box<dyn Operation>) -> bool {
        self.queue.push(op)
    }

    /// Stops the worker after its current operation and waits for it to exit.
    ///
    /// Operations still queued are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::WorkerPanicked`] if the worker thread panicked.
    pub fn stop(mut self) -> Result<(), LinkError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), LinkError> {
        self.stop.store(true, Ordering::SeqCst);
        self.queue.close();
        let joined = match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| LinkError::WorkerPanicked {
                link: self.name.clone(),
            }),
            None => Ok(()),
        };
        while let Some(mut op) = self.queue.next(Duration::ZERO) {
            op.abandon();
        }
        if let Err(ref e) = joined {
            error!(target: LOG_TARGET, "{}", e);
        }
        joined
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.shutdown();
        }
    }
}
