use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use roadlink_core::Transport;
use roadlink_serial::{Connector, TransportError};

const IDLE_PAUSE: Duration = Duration::from_millis(2);

/// A simulated device attached to a [`VirtualLink`].
pub trait VirtualDevice: Send {
    /// Handles one request written to the link, returning the response bytes if this
    /// device answers it.
    fn process(&mut self, request: &[u8]) -> Option<Vec<u8>>;

    /// Returns bytes the device sends on its own, such as pushed events.
    fn unsolicited(&mut self) -> Option<Vec<u8>> {
        None
    }
}

impl<D: VirtualDevice + ?Sized> VirtualDevice for Arc<Mutex<D>> {
    fn process(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        self.lock().process(request)
    }

    fn unsolicited(&mut self) -> Option<Vec<u8>> {
        self.lock().unsolicited()
    }
}

// Provide a Debug representation so types that contain trait objects can derive Debug.
impl Debug for dyn VirtualDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<VirtualDevice trait>")
    }
}

/// A device shared between a link and the test inspecting it.
pub type SharedDevice = Arc<Mutex<dyn VirtualDevice>>;

/// A mock [`Transport`] with one or more virtual devices attached.
///
/// Each request written to the link is offered to the devices in turn; the first to answer
/// provides the bytes subsequent reads return. Responses can be delivered in small chunks to
/// exercise incremental parsing.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use roadlink_core::{g4, DropAddress};
/// use roadlink_testing::{VirtualG4, VirtualLink};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let sensor = Arc::new(Mutex::new(VirtualG4::new(DropAddress(3), 2)));
/// sensor.lock().set_lane(0, 14, 120, Some(61), 2);
///
/// let mut link = VirtualLink::new().with_device(sensor.clone()).with_chunk_size(5);
/// let stats = g4::query_stats(&mut link, DropAddress(3))?;
/// assert_eq!(Some(14), stats.samples.volume[0]);
/// #
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct VirtualLink {
    devices: Vec<SharedDevice>,
    pending: VecDeque<u8>,
    chunk_size: usize,
    timeout: Duration,
    broken: bool,
    requests: Vec<Vec<u8>>,
}

impl VirtualLink {
    /// Creates a link with no devices, a 200 ms response timeout and unlimited chunk size.
    pub fn new() -> Self {
        VirtualLink {
            devices: Vec::new(),
            pending: VecDeque::new(),
            chunk_size: usize::MAX,
            timeout: Duration::from_millis(200),
            broken: false,
            requests: Vec::new(),
        }
    }

    /// Attaches a device.
    pub fn with_device<D: VirtualDevice + 'static>(mut self, device: Arc<Mutex<D>>) -> Self {
        self.devices.push(device);
        self
    }

    /// Attaches an already shared device.
    pub fn with_shared(mut self, device: SharedDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Limits how many bytes a single read returns.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the response timeout reported to protocol code.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Makes every write fail as if the connection had dropped.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Requests written so far, oldest first.
    pub fn requests(&self) -> &[Vec<u8>] {
        &self.requests
    }
}

impl Default for VirtualLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for VirtualLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "Virtual link is down"));
        }
        debug!("Link request: {:02X?}", bytes);
        self.requests.push(bytes.to_vec());
        for device in &mut self.devices {
            if let Some(response) = device.process(bytes) {
                debug!(" Device reply: {} bytes", response.len());
                self.pending.extend(response);
                break;
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            for device in &mut self.devices {
                if let Some(bytes) = device.unsolicited() {
                    self.pending.extend(bytes);
                    break;
                }
            }
        }
        if self.pending.is_empty() {
            thread::sleep(IDLE_PAUSE);
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "No data"));
        }
        let n = buf.len().min(self.chunk_size).min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A [`Connector`] that hands out [`VirtualLink`]s to the same shared devices.
///
/// The first few connections can be made to fail on every write, to exercise reconnection.
#[derive(Debug, Clone)]
pub struct VirtualConnector {
    devices: Vec<SharedDevice>,
    chunk_size: usize,
    timeout: Duration,
    broken_links: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl VirtualConnector {
    /// Creates a connector with no devices.
    pub fn new() -> Self {
        VirtualConnector {
            devices: Vec::new(),
            chunk_size: usize::MAX,
            timeout: Duration::from_millis(200),
            broken_links: Arc::new(AtomicUsize::new(0)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Attaches a device to every link this connector creates.
    pub fn with_device<D: VirtualDevice + 'static>(mut self, device: Arc<Mutex<D>>) -> Self {
        self.devices.push(device);
        self
    }

    /// Limits how many bytes a single read returns.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the response timeout of each link.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Makes the next `count` links fail every write.
    pub fn with_broken_links(self, count: usize) -> Self {
        self.broken_links.store(count, Ordering::SeqCst);
        self
    }

    /// How many links have been created.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Default for VirtualConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for VirtualConnector {
    fn uri(&self) -> &str {
        "virtual"
    }

    fn connect(&mut self) -> Result<Box<dyn Transport + Send>, TransportError> {
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        let mut link = VirtualLink::new()
            .with_chunk_size(self.chunk_size)
            .with_timeout(self.timeout);
        for device in &self.devices {
            link = link.with_shared(device.clone());
        }
        let broken = self
            .broken_links
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if broken {
            link = link.broken();
        }
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo;

    impl VirtualDevice for Echo {
        fn process(&mut self, request: &[u8]) -> Option<Vec<u8>> {
            Some(request.to_vec())
        }
    }

    #[derive(Debug)]
    struct Silent;

    impl VirtualDevice for Silent {
        fn process(&mut self, _request: &[u8]) -> Option<Vec<u8>> {
            None
        }
    }

    #[test]
    fn reads_are_chunked() {
        let mut link = VirtualLink::new()
            .with_device(Arc::new(Mutex::new(Echo)))
            .with_chunk_size(2);
        link.write_all(b"hello").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(2, link.read(&mut buf).unwrap());
        assert_eq!(b"he", &buf[..2]);
        assert_eq!(2, link.read(&mut buf).unwrap());
        assert_eq!(1, link.read(&mut buf).unwrap());
        assert_eq!(io::ErrorKind::WouldBlock, link.read(&mut buf).unwrap_err().kind());
    }

    #[test]
    fn first_answering_device_wins() {
        let mut link = VirtualLink::new()
            .with_device(Arc::new(Mutex::new(Silent)))
            .with_device(Arc::new(Mutex::new(Echo)));
        link.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(1, link.read(&mut buf).unwrap());
        assert_eq!(vec![b"x".to_vec()], link.requests());
    }

    #[test]
    fn broken_links_fail_writes_then_recover() {
        let mut connector = VirtualConnector::new()
            .with_device(Arc::new(Mutex::new(Echo)))
            .with_broken_links(1);
        let mut first = connector.connect().unwrap();
        assert_eq!(io::ErrorKind::BrokenPipe, first.write_all(b"x").unwrap_err().kind());
        let mut second = connector.connect().unwrap();
        second.write_all(b"x").unwrap();
        assert_eq!(2, connector.connect_count());
    }
}
