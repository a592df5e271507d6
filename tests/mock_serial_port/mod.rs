use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use serial_core::{PortSettings, SerialDevice};

use roadlink_testing::VirtualDevice;

#[allow(dead_code)] // Tests use different subsets of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialFailure {
    None,
    WriteSettings,
    Read,
}

/// Mock serial port wired to a simulated device: every write is handed to the device and
/// its reply becomes readable. Reads with nothing buffered time out like a real port.
#[derive(Debug)]
pub struct MockSerialPort<D> {
    failure: SerialFailure,
    device: D,
    pending: VecDeque<u8>,
    settings: PortSettings,
    timeout: Duration,
}

impl<D: VirtualDevice> MockSerialPort<D> {
    pub fn new(device: D, failure: SerialFailure) -> Self {
        MockSerialPort {
            failure,
            device,
            pending: VecDeque::new(),
            // Initialize settings to some weird defaults to verify we set them correctly later.
            settings: PortSettings {
                baud_rate: serial_core::BaudRate::Baud110,
                char_size: serial_core::CharSize::Bits7,
                parity: serial_core::Parity::ParityEven,
                stop_bits: serial_core::StopBits::Stop2,
                flow_control: serial_core::FlowControl::FlowSoftware,
            },
            timeout: Duration::from_secs(1),
        }
    }

    #[allow(dead_code)] // Not used by all tests.
    pub fn device(&self) -> &D {
        &self.device
    }

    #[allow(dead_code)] // Not used by all tests.
    pub fn settings(&self) -> PortSettings {
        self.settings
    }
}

impl<D: VirtualDevice> Read for MockSerialPort<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.failure == SerialFailure::Read {
            return Err(io::Error::new(io::ErrorKind::Other, "Dummy I/O error"));
        }
        if self.pending.is_empty() {
            std::thread::sleep(self.timeout.min(Duration::from_millis(5)));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "Operation timed out"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl<D: VirtualDevice> Write for MockSerialPort<D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(reply) = self.device.process(buf) {
            self.pending.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: VirtualDevice> SerialDevice for MockSerialPort<D> {
    type Settings = PortSettings;

    fn read_settings(&self) -> serial_core::Result<Self::Settings> {
        Ok(self.settings)
    }

    fn write_settings(&mut self, settings: &Self::Settings) -> serial_core::Result<()> {
        match self.failure {
            SerialFailure::WriteSettings => Err(serial_core::Error::new(
                serial_core::ErrorKind::NoDevice,
                "Dummy serial error",
            )),
            _ => {
                self.settings = *settings;
                Ok(())
            }
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> serial_core::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn set_rts(&mut self, _: bool) -> serial_core::Result<()> {
        unimplemented!();
    }

    fn set_dtr(&mut self, _: bool) -> serial_core::Result<()> {
        unimplemented!();
    }

    fn read_cts(&mut self) -> serial_core::Result<bool> {
        unimplemented!();
    }

    fn read_dsr(&mut self) -> serial_core::Result<bool> {
        unimplemented!();
    }

    fn read_ri(&mut self) -> serial_core::Result<bool> {
        unimplemented!();
    }

    fn read_cd(&mut self) -> serial_core::Result<bool> {
        unimplemented!();
    }
}
