use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use roadlink_core::ss125::{
    encode_event, encode_interval_header, encode_packet, Body, DataConfig, DateTimeProperty, GeneralConfig, Header,
    LaneInterval, MsgType, Property, HEADER_LEN, MSG_DATA_CONFIG, MSG_DATE_TIME, MSG_GENERAL_CONFIG,
    MSG_INTERVAL_DATA,
};
use roadlink_core::{CommError, DropAddress, VehicleEvent};

use crate::virtual_link::VirtualDevice;

const RESULT_OK: u16 = 0;
const RESULT_PAYLOAD_SIZE: u16 = 1;
const RESULT_READ_ONLY: u16 = 3;
const RESULT_INTERVAL_NONEXISTENT: u16 = 15;

/// A simulated SS125 sensor.
///
/// Holds a general and a data configuration, a clock that may be skewed from the host's,
/// the most recent interval, and a queue of vehicle events which it pushes whenever the link
/// is otherwise idle.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSs125 {
    id: DropAddress,
    general: GeneralConfig,
    data: DataConfig,
    clock_offset: chrono::Duration,
    interval: Option<(DateTime<Utc>, Vec<LaneInterval>)>,
    events: VecDeque<VehicleEvent>,
    fail_next: Option<u16>,
    writes: usize,
}

impl VirtualSs125 {
    /// Creates a sensor with factory settings: metric units, no location, 60 second intervals.
    pub fn new(id: DropAddress) -> Self {
        VirtualSs125 {
            id,
            general: GeneralConfig {
                orientation: "N".into(),
                serial_num: format!("SS125-{:04}", id.0),
                metric: true,
                ..Default::default()
            },
            data: DataConfig {
                interval: 60,
                ..Default::default()
            },
            clock_offset: chrono::Duration::zero(),
            interval: None,
            events: VecDeque::new(),
            fail_next: None,
            writes: 0,
        }
    }

    /// Sets the interval answered to interval data reads.
    pub fn set_interval(&mut self, stamp: DateTime<Utc>, lanes: Vec<LaneInterval>) {
        self.interval = Some((stamp, lanes));
    }

    /// Queues a vehicle event to push.
    pub fn push_event(&mut self, event: VehicleEvent) {
        self.events.push_back(event);
    }

    /// Makes the sensor's clock run `offset` ahead of the host's.
    pub fn set_clock_offset(&mut self, offset: chrono::Duration) {
        self.clock_offset = offset;
    }

    /// Answers the next request with result `code` instead of handling it.
    pub fn fail_next(&mut self, code: u16) {
        self.fail_next = Some(code);
    }

    /// Current general configuration.
    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }

    /// Current data configuration.
    pub fn data_config(&self) -> &DataConfig {
        &self.data
    }

    /// How far the sensor's clock is ahead of the host's.
    pub fn clock_offset(&self) -> chrono::Duration {
        self.clock_offset
    }

    /// Number of write requests handled.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    fn read(&self, body: &Body) -> Result<Vec<Body>, u16> {
        let payload = |prop: &dyn Property| prop.encode_write().map_err(|_| RESULT_PAYLOAD_SIZE);
        let single = |payload: Vec<u8>| vec![Body::new(body.msg_id, MsgType::Read, payload)];
        match body.msg_id {
            MSG_GENERAL_CONFIG => Ok(single(payload(&self.general)?)),
            MSG_DATA_CONFIG => Ok(single(payload(&self.data)?)),
            MSG_DATE_TIME => Ok(single(payload(&DateTimeProperty::new(self.now()))?)),
            MSG_INTERVAL_DATA => self.read_interval(body),
            _ => Err(RESULT_PAYLOAD_SIZE),
        }
    }

    fn read_interval(&self, body: &Body) -> Result<Vec<Body>, u16> {
        let number = body
            .payload
            .get(..2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or(RESULT_PAYLOAD_SIZE)?;
        let (stamp, lanes) = match &self.interval {
            Some(interval) if number == 0 => interval,
            _ => return Err(RESULT_INTERVAL_NONEXISTENT),
        };
        let header = encode_interval_header(*stamp, 0, lanes.len() as u8).map_err(|_| RESULT_PAYLOAD_SIZE)?;
        let mut bodies = vec![Body::new(MSG_INTERVAL_DATA, MsgType::Read, header)];
        for lane in lanes {
            let payload = lane.encode().map_err(|_| RESULT_PAYLOAD_SIZE)?;
            bodies.push(Body::new(MSG_INTERVAL_DATA, MsgType::Read, payload));
        }
        Ok(bodies)
    }

    fn write(&mut self, body: &Body) -> u16 {
        self.writes += 1;
        let stored: Result<(), CommError> = match body.msg_id {
            MSG_GENERAL_CONFIG => self.general.decode_payload(&body.payload),
            MSG_DATA_CONFIG => self.data.decode_payload(&body.payload),
            MSG_DATE_TIME => {
                let mut clock = DateTimeProperty::default();
                clock.decode_payload(&body.payload).map(|()| {
                    self.clock_offset = clock.stamp - Utc::now();
                })
            }
            _ => return RESULT_READ_ONLY,
        };
        match stored {
            Ok(()) => {
                info!("Vsensor {:04X} stored '{}'", self.id, char::from(body.msg_id));
                RESULT_OK
            }
            Err(e) => {
                warn!("Vsensor {:04X} rejected write: {}", self.id, e);
                RESULT_PAYLOAD_SIZE
            }
        }
    }
}

fn result_body(msg_id: u8, code: u16) -> Body {
    Body::new(msg_id, MsgType::Result, code.to_be_bytes().to_vec())
}

fn parse_request(request: &[u8]) -> Option<(Header, Body)> {
    let header = Header::parse(request.get(..HEADER_LEN)?, *request.get(HEADER_LEN)?).ok()?;
    let start = HEADER_LEN + 1;
    let len = header.body_size().ok()?;
    let body = Body::parse(request.get(start..start + len)?, *request.get(start + len)?).ok()?;
    Some((header, body))
}

impl VirtualDevice for VirtualSs125 {
    fn process(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let (header, body) = parse_request(request)?;
        if header.dest != self.id {
            return None;
        }
        debug!("Vsensor {:04X}: {} {}", self.id, header, body);
        let bodies = match (self.fail_next.take(), body.msg_type) {
            (Some(code), _) => vec![result_body(body.msg_id, code)],
            (None, MsgType::Read) => self
                .read(&body)
                .unwrap_or_else(|code| vec![result_body(body.msg_id, code)]),
            (None, MsgType::Write) => vec![result_body(body.msg_id, self.write(&body))],
            (None, MsgType::Result) => return None,
        };
        let mut bytes = Vec::new();
        for (n, mut reply) in bodies.into_iter().enumerate() {
            reply.sub_id = body.sub_id.wrapping_add(n as u8);
            let reply_header = Header {
                dest_sub: header.src_sub,
                dest: header.src,
                src_sub: header.dest_sub,
                src: header.dest,
                seq: header.seq.wrapping_add(1 + n as u8),
                body_len: reply.len() as u8,
            };
            bytes.extend(encode_packet(&reply_header, &reply));
        }
        Some(bytes)
    }

    fn unsolicited(&mut self) -> Option<Vec<u8>> {
        let event = self.events.pop_front()?;
        let body = Body::new(b'v', MsgType::Read, encode_event(&event).ok()?);
        let header = Header {
            dest_sub: 0,
            dest: DropAddress(0),
            src_sub: 0,
            src: self.id,
            seq: 0,
            body_len: body.len() as u8,
        };
        Some(encode_packet(&header, &body))
    }
}
