//! Operations for dynamic message signs behind a DMS XML sign server.
//!
//! Every operation except [`OpQueryConfig`] first reads the sign configuration if it isn't
//! known. Command operations ([`OpSendMsg`], [`OpBlank`] and [`OpReset`]) always clear the
//! sign's pending command when they finish, whether or not they succeeded.
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};

use crate::core::dmsxml::{self, format_date, TokenReader, XmlElem, XmlElems, BITMAP_PAGE_LEN, FAILURE_UNKNOWN};
use crate::core::{CommError, Controller, MessageStatus, SignConfig, SignDevice, Transport};
use crate::operation::{ConfigGuard, Configure, Op, Operation, Priority, RetryPolicy, Transaction};

const LOG_TARGET: &str = "roadlink::dmsxml";

/// A message to display on a sign.
///
/// # Examples
///
/// ```
/// use roadlink::dmsxml::SignMessage;
///
/// let message = SignMessage::new("ROAD[nl]CLOSED", "ops").with_duration(30);
/// assert_eq!(1, message.page_count());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignMessage {
    /// MULTI text.
    pub multi: String,

    /// Owner sending the message.
    pub owner: String,

    /// How long to display the message in minutes, or `None` for indefinitely.
    pub duration: Option<u32>,

    /// Priority the message is activated with.
    pub act_priority: u8,

    /// Priority while the message is displayed.
    pub run_priority: u8,

    /// Time each page is shown, in milliseconds.
    pub page_on_ms: u32,

    /// Rendered pages, each [`BITMAP_PAGE_LEN`] bytes.
    pub bitmaps: Vec<Vec<u8>>,
}

impl SignMessage {
    /// Creates an indefinite single page message with default priorities and no bitmap.
    pub fn new<M: Into<String>, O: Into<String>>(multi: M, owner: O) -> Self {
        SignMessage {
            multi: multi.into(),
            owner: owner.into(),
            duration: None,
            act_priority: 1,
            run_priority: 1,
            page_on_ms: 2500,
            bitmaps: Vec::new(),
        }
    }

    /// Sets the display duration in minutes.
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration = Some(minutes);
        self
    }

    /// Sets the activation and run-time priorities.
    pub fn with_priorities(mut self, act_priority: u8, run_priority: u8) -> Self {
        self.act_priority = act_priority;
        self.run_priority = run_priority;
        self
    }

    /// Sets the rendered bitmap pages.
    pub fn with_bitmaps(mut self, bitmaps: Vec<Vec<u8>>) -> Self {
        self.bitmaps = bitmaps;
        self
    }

    /// Number of pages, at least one.
    pub fn page_count(&self) -> usize {
        self.bitmaps.len().max(1)
    }

    fn bitmap_hex(&self) -> Result<String, CommError> {
        if let Some(page) = self.bitmaps.iter().find(|page| page.len() != BITMAP_PAGE_LEN) {
            return Err(CommError::protocol(format!(
                "Bitmap page of {} bytes, expected {}",
                page.len(),
                BITMAP_PAGE_LEN
            )));
        }
        Ok(hex::encode(self.bitmaps.concat()))
    }
}

/// State shared by every DMS XML operation: the sign and the stream reassembly buffer.
struct Dms<S> {
    sign: Arc<S>,
    reader: TokenReader,
}

impl<S: SignDevice> Dms<S> {
    fn new(sign: Arc<S>) -> Self {
        Dms {
            sign,
            reader: TokenReader::new(),
        }
    }

    /// Creates a request element carrying a fresh id and the sign address.
    fn request(&self, req_name: &str, res_name: &str) -> XmlElem {
        let mut elem = XmlElem::new(req_name, res_name);
        elem.add_req("Id", request_id());
        elem.add_req("Address", self.sign.drop_address().0);
        elem.add_res("Id");
        elem.add_res("IsValid");
        elem.add_res("ErrMsg");
        elem
    }

    /// Sends `elem` and returns its response, which must be valid.
    fn transact(&mut self, transport: &mut dyn Transport, elem: XmlElem) -> Result<XmlElem, CommError> {
        let res_name = elem.res_name().to_string();
        let mut elems = XmlElems::new();
        elems.add(elem);
        let timeout = transport.timeout();
        let completion = dmsxml::exchange(transport, &mut self.reader, &mut elems, timeout)?;
        debug!(
            target: LOG_TARGET,
            "{}: {} in {} ms",
            self.sign.name(),
            res_name,
            completion.elapsed.as_millis()
        );
        let response = elems
            .get(&res_name)
            .cloned()
            .ok_or_else(|| CommError::parsing(format!("No {} response", res_name)))?;
        if !response.res_bool("IsValid")? {
            let error = match response.res_string("ErrMsg") {
                Ok(error) if !error.trim().is_empty() => error.trim(),
                _ => FAILURE_UNKNOWN,
            };
            warn!(target: LOG_TARGET, "{}: {} failed: {}", self.sign.name(), res_name, error);
            return Err(CommError::controller(error));
        }
        Ok(response)
    }

    fn query_config(&mut self, transport: &mut dyn Transport) -> Result<(), CommError> {
        let mut elem = self.request("GetDmsConfigReqMsg", "GetDmsConfigRespMsg");
        for name in &CONFIG_CHILDREN {
            elem.add_res(name);
        }
        let response = self.transact(transport, elem)?;
        let config = SignConfig {
            model: response.res_string("model")?.to_string(),
            make: response.res_string("make")?.to_string(),
            version: response.res_string("version")?.to_string(),
            sign_type: response.res_string("type")?.to_string(),
            width_pixels: response.res_num("signWidthPixels")?,
            height_pixels: response.res_num("signHeightPixels")?,
            horiz_border_mm: response.res_num("horizBorder")?,
            vert_border_mm: response.res_num("vertBorder")?,
            horiz_pitch_mm: response.res_num("horizPitch")?,
            vert_pitch_mm: response.res_num("vertPitch")?,
            char_width_pixels: response.res_num("characterWidthPixels")?,
            char_height_pixels: response.res_num("characterHeightPixels")?,
        };
        info!(
            target: LOG_TARGET,
            "{}: {} {} ({}x{}), version {}",
            self.sign.name(),
            config.make,
            config.model,
            config.width_pixels,
            config.height_pixels,
            config.version
        );
        self.sign.set_version_notify(&config.version);
        self.sign.set_sign_config(config);
        Ok(())
    }

    fn cleanup(&self, success: bool) {
        if success {
            if !self.sign.is_configured() {
                self.sign.request_configure();
            }
        } else {
            self.sign.set_configured(false);
        }
    }
}

impl<S: SignDevice> Debug for Dms<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dms")
            .field("sign", &self.sign.name())
            .field("reader", &self.reader)
            .finish()
    }
}

const CONFIG_CHILDREN: [&str; 15] = [
    "signAccess",
    "model",
    "make",
    "version",
    "type",
    "horizBorder",
    "vertBorder",
    "horizPitch",
    "vertPitch",
    "signHeight",
    "signWidth",
    "characterHeightPixels",
    "characterWidthPixels",
    "signHeightPixels",
    "signWidthPixels",
];

const STATUS_CHILDREN: [&str; 12] = [
    "MsgTextAvailable",
    "MsgText",
    "ActPriority",
    "RunPriority",
    "Owner",
    "UseOnTime",
    "OnTime",
    "UseOffTime",
    "OffTime",
    "DisplayTimeMS",
    "UseBitmap",
    "Bitmap",
];

/// Returns a request id: the current time in milliseconds plus a random offset.
fn request_id() -> i64 {
    Utc::now().timestamp_millis() + i64::from(rand::random::<u16>())
}

/// Minutes from `now` until `off`, rounded up and never negative.
fn minutes_until(off: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let seconds = (off - now).num_seconds().max(0);
    u32::try_from((seconds + 59) / 60).unwrap_or(u32::MAX)
}

/// Phases shared by the DMS XML operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DmsPhase {
    /// Read the sign configuration.
    QueryConfig,

    /// Perform the operation's own request.
    Work,
}

macro_rules! dms_transaction {
    ($op:ident, $name:expr) => {
        impl<S: SignDevice + 'static> Debug for $op<S> {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($op)).field("dms", &self.dms).finish()
            }
        }

        impl<S: SignDevice + 'static> Configure for $op<S> {
            fn configure(&mut self) -> DmsPhase {
                DmsPhase::QueryConfig
            }
        }

        impl<S: SignDevice + 'static> Transaction for $op<S> {
            type Phase = DmsPhase;

            fn name(&self) -> &'static str {
                $name
            }

            fn controller(&self) -> &dyn Controller {
                self.dms.sign.as_ref()
            }

            fn begin(&mut self) -> DmsPhase {
                DmsPhase::Work
            }

            fn poll(&mut self, phase: DmsPhase, transport: &mut dyn Transport) -> Result<Option<DmsPhase>, CommError> {
                match phase {
                    DmsPhase::QueryConfig => self.dms.query_config(transport)?,
                    DmsPhase::Work => self.work(transport)?,
                }
                Ok(None)
            }

            fn cleanup(&mut self, success: bool) {
                self.finish(success);
                self.dms.cleanup(success);
            }
        }
    };
}

/// Reads a sign's configuration: its make, model, firmware version and geometry.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use roadlink::dmsxml::OpQueryConfig;
/// use roadlink::{Progress, RetryPolicy};
/// use roadlink_core::Controller;
/// use roadlink_testing::{MockController, VirtualDms, VirtualLink};
/// use roadlink_core::DropAddress;
///
/// let mut link = VirtualLink::new().with_device(Arc::new(Mutex::new(VirtualDms::new(6))));
/// let sign = Arc::new(MockController::new("V66E01", DropAddress(6)));
/// let mut op = OpQueryConfig::operation(sign.clone(), RetryPolicy::Limited(2));
/// while op.step(&mut link).unwrap() == Progress::Continue {}
/// assert!(sign.is_configured());
/// ```
pub struct OpQueryConfig<S> {
    dms: Dms<S>,
}

impl<S: SignDevice + 'static> OpQueryConfig<S> {
    /// Creates the transaction for `sign`.
    pub fn new(sign: Arc<S>) -> Self {
        OpQueryConfig { dms: Dms::new(sign) }
    }

    /// Creates a queueable operation at device priority.
    pub fn operation(sign: Arc<S>, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(Self::new(sign), Priority::Device, retry))
    }
}

impl<S: SignDevice + 'static> Debug for OpQueryConfig<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpQueryConfig").field("dms", &self.dms).finish()
    }
}

impl<S: SignDevice + 'static> Transaction for OpQueryConfig<S> {
    type Phase = DmsPhase;

    fn name(&self) -> &'static str {
        "QueryConfig"
    }

    fn controller(&self) -> &dyn Controller {
        self.dms.sign.as_ref()
    }

    fn begin(&mut self) -> DmsPhase {
        DmsPhase::QueryConfig
    }

    fn poll(&mut self, _phase: DmsPhase, transport: &mut dyn Transport) -> Result<Option<DmsPhase>, CommError> {
        self.dms.query_config(transport)?;
        self.dms.sign.set_configured(true);
        Ok(None)
    }

    fn cleanup(&mut self, success: bool) {
        self.dms.cleanup(success);
    }
}

/// Reads the message a sign is displaying.
pub struct OpQueryMsg<S> {
    dms: Dms<S>,
}

impl<S: SignDevice + 'static> OpQueryMsg<S> {
    /// Creates the transaction for `sign`.
    pub fn new(sign: Arc<S>) -> Self {
        OpQueryMsg { dms: Dms::new(sign) }
    }

    /// Creates a queueable operation at `priority`, reading configuration first if needed.
    pub fn operation(sign: Arc<S>, priority: Priority, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(ConfigGuard::new(Self::new(sign)), priority, retry))
    }

    fn work(&mut self, transport: &mut dyn Transport) -> Result<(), CommError> {
        let mut elem = self.dms.request("StatusReqMsg", "StatusRespMsg");
        for name in &STATUS_CHILDREN {
            elem.add_res(name);
        }
        let response = self.dms.transact(transport, elem)?;
        let status = if response.res_bool("MsgTextAvailable")? {
            let duration = if response.res_bool("UseOffTime")? {
                Some(minutes_until(response.res_date("OffTime")?, Utc::now()))
            } else {
                None
            };
            MessageStatus {
                multi: response.res_string("MsgText")?.to_string(),
                owner: response.res_string("Owner")?.to_string(),
                duration,
                priority: response.res_num("ActPriority")?,
            }
        } else {
            MessageStatus::default()
        };
        let page_ms: u32 = response.res_num("DisplayTimeMS")?;
        info!(
            target: LOG_TARGET,
            "{}: showing {:?} (owner {:?}, page {} ms)",
            self.dms.sign.name(),
            status.multi,
            status.owner,
            page_ms
        );
        self.dms.sign.set_error_status("");
        self.dms.sign.set_message_status(status);
        Ok(())
    }

    fn finish(&mut self, _success: bool) {}
}

dms_transaction!(OpQueryMsg, "QueryMsg");

/// Sends a message to a sign, as a single or multi-page message depending on its page count.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use roadlink::dmsxml::{OpSendMsg, SignMessage};
/// use roadlink::{Progress, RetryPolicy};
/// use roadlink_core::DropAddress;
/// use roadlink_testing::{MockController, VirtualDms, VirtualLink};
///
/// let sign_server = Arc::new(Mutex::new(VirtualDms::new(9)));
/// let mut link = VirtualLink::new().with_device(sign_server.clone());
/// let sign = Arc::new(MockController::new("V9", DropAddress(9)));
///
/// let message = SignMessage::new("CRASH[nl]AHEAD", "ops").with_duration(15);
/// let mut op = OpSendMsg::operation(sign, message, RetryPolicy::Limited(1));
/// while op.step(&mut link).unwrap() == Progress::Continue {}
/// assert_eq!("CRASH[nl]AHEAD", sign_server.lock().shown().unwrap().text);
/// ```
pub struct OpSendMsg<S> {
    dms: Dms<S>,
    message: SignMessage,
}

impl<S: SignDevice + 'static> OpSendMsg<S> {
    /// Creates the transaction sending `message` to `sign`.
    pub fn new(sign: Arc<S>, message: SignMessage) -> Self {
        OpSendMsg {
            dms: Dms::new(sign),
            message,
        }
    }

    /// Creates a queueable operation at command priority.
    pub fn operation(sign: Arc<S>, message: SignMessage, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(ConfigGuard::new(Self::new(sign, message)), Priority::Command, retry))
    }

    fn work(&mut self, transport: &mut dyn Transport) -> Result<(), CommError> {
        let message = &self.message;
        let bitmap = message.bitmap_hex()?;
        let (req_name, res_name) = if message.page_count() > 1 {
            ("SetMultPgReqMsg", "SetMultPgRespMsg")
        } else {
            ("SetSnglPgReqMsg", "SetSnglPgRespMsg")
        };
        let on_time = Utc::now();
        let mut elem = self.dms.request(req_name, res_name);
        elem.add_req("MsgText", &message.multi);
        elem.add_req("UseOnTime", true);
        elem.add_req("OnTime", format_date(on_time));
        elem.add_req("UseOffTime", message.duration.is_some());
        let off_time = message
            .duration
            .map(|minutes| format_date(on_time + ChronoDuration::minutes(i64::from(minutes))))
            .unwrap_or_default();
        elem.add_req("OffTime", off_time);
        elem.add_req("DisplayTimeMS", message.page_on_ms);
        elem.add_req("ActPriority", message.act_priority);
        elem.add_req("RunPriority", message.run_priority);
        elem.add_req("Owner", &message.owner);
        elem.add_req("Bitmap", bitmap);
        info!(
            target: LOG_TARGET,
            "{}: sending {:?} ({} pages)",
            self.dms.sign.name(),
            message.multi,
            message.page_count()
        );
        let _ = self.dms.transact(transport, elem)?;
        self.dms.sign.set_message_status(MessageStatus {
            multi: message.multi.clone(),
            owner: message.owner.clone(),
            duration: message.duration,
            priority: message.act_priority,
        });
        Ok(())
    }

    fn finish(&mut self, _success: bool) {
        self.dms.sign.clear_pending_command();
    }
}

dms_transaction!(OpSendMsg, "SendMsg");

/// Blanks a sign.
pub struct OpBlank<S> {
    dms: Dms<S>,
    owner: String,
}

impl<S: SignDevice + 'static> OpBlank<S> {
    /// Creates the transaction blanking `sign` on behalf of `owner`.
    pub fn new<O: Into<String>>(sign: Arc<S>, owner: O) -> Self {
        OpBlank {
            dms: Dms::new(sign),
            owner: owner.into(),
        }
    }

    /// Creates a queueable operation at command priority.
    pub fn operation<O: Into<String>>(sign: Arc<S>, owner: O, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(ConfigGuard::new(Self::new(sign, owner)), Priority::Command, retry))
    }

    fn work(&mut self, transport: &mut dyn Transport) -> Result<(), CommError> {
        let mut elem = self.dms.request("SetBlankMsgReqMsg", "SetBlankMsgRespMsg");
        elem.add_req("ActPriority", 1);
        elem.add_req("Owner", &self.owner);
        info!(target: LOG_TARGET, "{}: blanking", self.dms.sign.name());
        let _ = self.dms.transact(transport, elem)?;
        self.dms.sign.set_message_status(MessageStatus::default());
        Ok(())
    }

    fn finish(&mut self, _success: bool) {
        self.dms.sign.clear_pending_command();
    }
}

dms_transaction!(OpBlank, "Blank");

/// Resets a sign controller.
pub struct OpReset<S> {
    dms: Dms<S>,
}

impl<S: SignDevice + 'static> OpReset<S> {
    /// Creates the transaction for `sign`.
    pub fn new(sign: Arc<S>) -> Self {
        OpReset { dms: Dms::new(sign) }
    }

    /// Creates a queueable operation at command priority.
    pub fn operation(sign: Arc<S>, retry: RetryPolicy) -> Box<dyn Operation> {
        Box::new(Op::new(ConfigGuard::new(Self::new(sign)), Priority::Command, retry))
    }

    fn work(&mut self, transport: &mut dyn Transport) -> Result<(), CommError> {
        let elem = self.dms.request("ResetDMSReqMsg", "ResetDMSRespMsg");
        info!(target: LOG_TARGET, "{}: resetting", self.dms.sign.name());
        let _ = self.dms.transact(transport, elem)?;
        self.dms.sign.set_message_status(MessageStatus::default());
        Ok(())
    }

    fn finish(&mut self, _success: bool) {
        self.dms.sign.clear_pending_command();
    }
}

dms_transaction!(OpReset, "Reset");

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    use crate::core::{DropAddress, ErrorClass};
    use crate::operation::{Disposition, Progress};
    use roadlink_testing::{ControllerCall, MockController, ShownMessage, VirtualDms, VirtualLink};

    fn setup(address: u16) -> (Arc<Mutex<VirtualDms>>, VirtualLink, Arc<MockController>) {
        let server = Arc::new(Mutex::new(VirtualDms::new(u32::from(address))));
        let link = VirtualLink::new().with_device(server.clone()).with_chunk_size(13);
        let sign = Arc::new(MockController::new("sign", DropAddress(address)));
        (server, link, sign)
    }

    fn run(op: &mut dyn Operation, link: &mut dyn Transport) -> Result<(), CommError> {
        while op.step(link)? == Progress::Continue {}
        Ok(())
    }

    #[test]
    fn config_reported_to_sign() {
        let (_server, mut link, sign) = setup(3);
        run(OpQueryConfig::operation(sign.clone(), RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        let calls = sign.calls();
        assert!(calls.contains(&ControllerCall::Version("2.1.0".into())));
        assert!(calls.iter().any(|call| matches!(
            call,
            ControllerCall::SignConfig(config) if config.width_pixels == 96 && config.model == "VMS-96"
        )));
        assert!(sign.is_configured());
    }

    #[test]
    fn query_configures_first_then_reads_status() {
        let (server, mut link, sign) = setup(4);
        server.lock().show(ShownMessage {
            text: "LEFT LANE[nl]CLOSED".into(),
            owner: "tmc".into(),
            act_priority: 3,
            off_time: Some(format_date(Utc::now() + ChronoDuration::minutes(10))),
            ..ShownMessage::default()
        });
        let mut op = OpQueryMsg::operation(sign.clone(), Priority::Poll, RetryPolicy::Limited(1));
        run(op.as_mut(), &mut link).unwrap();
        assert_eq!(vec!["GetDmsConfigReqMsg", "StatusReqMsg"], server.lock().received());
        let status = sign
            .calls()
            .into_iter()
            .find_map(|call| match call {
                ControllerCall::MessageStatus(status) => Some(status),
                _ => None,
            })
            .unwrap();
        assert_eq!("LEFT LANE[nl]CLOSED", status.multi);
        assert_eq!("tmc", status.owner);
        assert_eq!(3, status.priority);
        assert!(matches!(status.duration, Some(9..=10)));
    }

    #[test]
    fn multi_page_message_sent_with_bitmaps() {
        let (server, mut link, sign) = setup(5);
        let message = SignMessage::new("A[np]B", "ops")
            .with_priorities(4, 2)
            .with_bitmaps(vec![vec![0xFF; BITMAP_PAGE_LEN], vec![0x00; BITMAP_PAGE_LEN]]);
        run(OpSendMsg::operation(sign.clone(), message, RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        let server = server.lock();
        let shown = server.shown().unwrap();
        assert!(shown.multi_page);
        assert_eq!(4 * BITMAP_PAGE_LEN, shown.bitmap.len());
        assert!(shown.bitmap.starts_with("ffff"));
        assert_eq!((4, 2), (shown.act_priority, shown.run_priority));
        assert!(shown.on_time.is_some());
        assert!(shown.off_time.is_none());
        assert_eq!(Some(&ControllerCall::ClearPendingCommand), sign.calls().last());
    }

    #[test]
    fn bad_bitmap_abandons_and_clears_command() {
        let (server, mut link, _) = setup(5);
        let sign = Arc::new(MockController::new("sign", DropAddress(5)).with_configured(true));
        let message = SignMessage::new("X", "ops").with_bitmaps(vec![vec![0; 10]]);
        let mut op = OpSendMsg::operation(sign.clone(), message, RetryPolicy::Limited(3));
        let error = op.step(&mut link).unwrap_err();
        assert_eq!(ErrorClass::Protocol, error.class());
        assert_eq!(Disposition::Abandon, op.fail(&error));
        assert!(server.lock().received().is_empty());
        let calls = sign.calls();
        assert!(calls.contains(&ControllerCall::ClearPendingCommand));
        assert!(calls.contains(&ControllerCall::SetConfigured(false)));
    }

    #[test]
    fn rejected_request_counts_against_retries() {
        let (server, mut link, _) = setup(6);
        let sign = Arc::new(MockController::new("sign", DropAddress(6)).with_configured(true));
        server.lock().fail_next("");
        let mut op = OpBlank::operation(sign.clone(), "ops", RetryPolicy::Limited(1));
        let error = op.step(&mut link).unwrap_err();
        assert_eq!(ErrorClass::Controller, error.class());
        assert!(error.to_string().contains(FAILURE_UNKNOWN));
        assert_eq!(Disposition::Retry, op.fail(&error));
        run(op.as_mut(), &mut link).unwrap();
        assert!(op.is_success());
        assert!(sign.calls().contains(&ControllerCall::ClearPendingCommand));
    }

    #[test]
    fn silent_server_times_out() {
        let (server, link, _) = setup(7);
        let mut link = link.with_timeout(Duration::from_millis(60));
        let sign = Arc::new(MockController::new("sign", DropAddress(7)).with_configured(true));
        server.lock().ignore_next(1);
        let mut op = OpReset::operation(sign, RetryPolicy::Limited(1));
        let error = op.step(&mut link).unwrap_err();
        assert_eq!(ErrorClass::Timeout, error.class());
        assert_eq!(0, server.lock().resets());
    }

    #[test]
    fn reset_clears_display() {
        let (server, mut link, sign) = setup(8);
        server.lock().show(ShownMessage {
            text: "OLD".into(),
            ..ShownMessage::default()
        });
        run(OpReset::operation(sign.clone(), RetryPolicy::Limited(1)).as_mut(), &mut link).unwrap();
        assert_eq!(1, server.lock().resets());
        assert!(server.lock().shown().is_none());
        assert!(sign.calls().contains(&ControllerCall::MessageStatus(MessageStatus::default())));
    }

    #[test]
    fn remaining_minutes_round_up() {
        let now = Utc::now();
        assert_eq!(0, minutes_until(now - ChronoDuration::minutes(1), now));
        assert_eq!(1, minutes_until(now + ChronoDuration::seconds(1), now));
        assert_eq!(5, minutes_until(now + ChronoDuration::minutes(5), now));
    }
}
