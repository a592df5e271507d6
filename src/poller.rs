use std::fmt::Debug;
use std::sync::Arc;

use log::debug;

use crate::core::{Controller, SignDevice};
use crate::dmsxml::{OpBlank, OpQueryConfig, OpQueryMsg, OpReset, OpSendMsg, SignMessage};
use crate::g4;
use crate::op_queue::OpQueue;
use crate::operation::{Priority, RetryPolicy, LOG_TARGET};
use crate::ss125;

/// Requests made of a device by the rest of the system, outside of regular polling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeviceRequest {
    /// Download the settings the device needs to be polled.
    SendSettings,

    /// Read the device's configuration again.
    QueryConfiguration,

    /// Read the message a sign is displaying.
    QueryMessage,

    /// Reset the device.
    ResetDevice,
}

/// Turns device requests and periodic polls into operations on a link's queue.
///
/// Both methods return whether an operation was queued; a request the protocol doesn't
/// support, or one whose operation is already pending, returns `false`.
pub trait Poller<D: ?Sized>: Debug {
    /// Acts on `request` for `device`.
    fn send_request(&self, device: &Arc<D>, request: DeviceRequest) -> bool;

    /// Queues the periodic poll of `device`.
    fn poll(&self, device: &Arc<D>) -> bool;
}

/// Schedules operations for G4 sensors.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use roadlink::{DeviceRequest, G4Poller, OpQueue, Poller, RetryPolicy};
/// use roadlink_core::{Controller, DropAddress};
/// use roadlink_testing::MockController;
///
/// let queue = Arc::new(OpQueue::new());
/// let poller = G4Poller::new(queue.clone(), RetryPolicy::Limited(3));
/// let sensor: Arc<dyn Controller> = Arc::new(MockController::new("g4_1", DropAddress(1)));
///
/// assert!(poller.poll(&sensor));
/// assert!(poller.send_request(&sensor, DeviceRequest::SendSettings));
/// assert!(!poller.send_request(&sensor, DeviceRequest::QueryMessage));
/// assert_eq!(2, queue.len());
/// ```
#[derive(Debug)]
pub struct G4Poller {
    queue: Arc<OpQueue>,
    retry: RetryPolicy,
}

impl G4Poller {
    /// Creates a poller feeding `queue`.
    pub fn new(queue: Arc<OpQueue>, retry: RetryPolicy) -> Self {
        G4Poller { queue, retry }
    }
}

impl Poller<dyn Controller> for G4Poller {
    fn send_request(&self, device: &Arc<dyn Controller>, request: DeviceRequest) -> bool {
        match request {
            DeviceRequest::SendSettings => self.queue.push(g4::OpSendSettings::operation(device.clone(), self.retry)),
            DeviceRequest::QueryConfiguration => {
                device.request_configure();
                true
            }
            _ => unsupported(device.as_ref(), request),
        }
    }

    fn poll(&self, device: &Arc<dyn Controller>) -> bool {
        self.queue.push(g4::OpQueryStats::operation(device.clone(), self.retry))
    }
}

/// Schedules operations for SS125 sensors.
///
/// Polling also starts listening for vehicle events on sensors that should report them.
#[derive(Debug)]
pub struct Ss125Poller {
    queue: Arc<OpQueue>,
    retry: RetryPolicy,
}

impl Ss125Poller {
    /// Creates a poller feeding `queue`.
    pub fn new(queue: Arc<OpQueue>, retry: RetryPolicy) -> Self {
        Ss125Poller { queue, retry }
    }
}

impl Poller<dyn Controller> for Ss125Poller {
    fn send_request(&self, device: &Arc<dyn Controller>, request: DeviceRequest) -> bool {
        match request {
            DeviceRequest::SendSettings => {
                self.queue.push(ss125::OpSendSettings::operation(device.clone(), self.retry))
            }
            DeviceRequest::QueryConfiguration => {
                device.request_configure();
                true
            }
            _ => unsupported(device.as_ref(), request),
        }
    }

    fn poll(&self, device: &Arc<dyn Controller>) -> bool {
        let queued = self.queue.push(ss125::OpQueryBinned::operation(device.clone(), self.retry));
        if device.wants_vehicle_events() {
            // Refused while the listener from an earlier poll is still queued.
            let _ = self.queue.push(ss125::OpQueryEvents::operation(device.clone()));
        }
        queued
    }
}

/// Schedules operations for signs behind a DMS XML server.
#[derive(Debug)]
pub struct DmsPoller {
    queue: Arc<OpQueue>,
    retry: RetryPolicy,
}

impl DmsPoller {
    /// Creates a poller feeding `queue`.
    pub fn new(queue: Arc<OpQueue>, retry: RetryPolicy) -> Self {
        DmsPoller { queue, retry }
    }

    /// Queues `message` to be sent to `sign`.
    pub fn send_message<S: SignDevice + 'static>(&self, sign: &Arc<S>, message: SignMessage) -> bool {
        self.queue.push(OpSendMsg::operation(sign.clone(), message, self.retry))
    }

    /// Queues blanking `sign` on behalf of `owner`.
    pub fn blank<S: SignDevice + 'static, O: Into<String>>(&self, sign: &Arc<S>, owner: O) -> bool {
        self.queue.push(OpBlank::operation(sign.clone(), owner, self.retry))
    }
}

impl<S: SignDevice + 'static> Poller<S> for DmsPoller {
    fn send_request(&self, sign: &Arc<S>, request: DeviceRequest) -> bool {
        match request {
            DeviceRequest::QueryConfiguration => self.queue.push(OpQueryConfig::operation(sign.clone(), self.retry)),
            DeviceRequest::QueryMessage => {
                self.queue
                    .push(OpQueryMsg::operation(sign.clone(), Priority::Device, self.retry))
            }
            DeviceRequest::ResetDevice => self.queue.push(OpReset::operation(sign.clone(), self.retry)),
            DeviceRequest::SendSettings => unsupported(sign.as_ref(), request),
        }
    }

    fn poll(&self, sign: &Arc<S>) -> bool {
        self.queue.push(OpQueryMsg::operation(sign.clone(), Priority::Poll, self.retry))
    }
}

fn unsupported(device: &dyn Controller, request: DeviceRequest) -> bool {
    debug!(target: LOG_TARGET, "{}: {:?} not supported", device.name(), request);
    false
}
