use std::collections::HashMap;

use log::{debug, info, warn};

use roadlink_core::dmsxml::{parse_children, push_tag, second_tag_name, INTER_STATUS_TAG, ROOT_TAG};
use roadlink_core::SignConfig;

use crate::virtual_link::VirtualDevice;

/// A message shown on a [`VirtualDms`], as last sent by a set-message request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShownMessage {
    /// MULTI text.
    pub text: String,

    /// Owner that sent the message.
    pub owner: String,

    /// Activation priority.
    pub act_priority: u8,

    /// Run-time priority.
    pub run_priority: u8,

    /// Page on-time in milliseconds.
    pub display_ms: u32,

    /// Time the message starts, as sent.
    pub on_time: Option<String>,

    /// Time the message ends, as sent.
    pub off_time: Option<String>,

    /// Hex encoded bitmap pages.
    pub bitmap: String,

    /// Whether it was sent as a multi-page message.
    pub multi_page: bool,
}

/// A simulated DMS XML sign server fronting one sign.
///
/// Requests for other addresses are left for other devices on the link. Every response can
/// be preceded by intermediate status notes, and the next response can be made invalid to
/// exercise error handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDms {
    address: u32,
    config: SignConfig,
    shown: Option<ShownMessage>,
    inter_status: Vec<String>,
    fail_next: Option<String>,
    silent: usize,
    received: Vec<String>,
    resets: usize,
}

impl VirtualDms {
    /// Creates a blank full-matrix sign at `address`.
    pub fn new(address: u32) -> Self {
        VirtualDms {
            address,
            config: SignConfig {
                model: "VMS-96".into(),
                make: "Virtual Signs".into(),
                version: "2.1.0".into(),
                sign_type: "Full Matrix".into(),
                width_pixels: 96,
                height_pixels: 25,
                horiz_border_mm: 50,
                vert_border_mm: 60,
                horiz_pitch_mm: 33,
                vert_pitch_mm: 33,
                char_width_pixels: 0,
                char_height_pixels: 0,
            },
            shown: None,
            inter_status: Vec::new(),
            fail_next: None,
            silent: 0,
            received: Vec::new(),
            resets: 0,
        }
    }

    /// Replaces the configuration the sign reports.
    pub fn with_config(mut self, config: SignConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends `notes` as intermediate status before every response.
    pub fn with_inter_status<S: Into<String>>(mut self, notes: Vec<S>) -> Self {
        self.inter_status = notes.into_iter().map(Into::into).collect();
        self
    }

    /// Answers the next request with `IsValid` false and `error` as its `ErrMsg`.
    ///
    /// An empty `error` leaves `ErrMsg` empty.
    pub fn fail_next<S: Into<String>>(&mut self, error: S) {
        self.fail_next = Some(error.into());
    }

    /// Ignores the next `count` requests.
    pub fn ignore_next(&mut self, count: usize) {
        self.silent = count;
    }

    /// Displays a message as if another system had sent it.
    pub fn show(&mut self, message: ShownMessage) {
        self.shown = Some(message);
    }

    /// The message currently displayed, if any.
    pub fn shown(&self) -> Option<&ShownMessage> {
        self.shown.as_ref()
    }

    /// Names of the requests received, oldest first.
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Number of reset requests handled.
    pub fn resets(&self) -> usize {
        self.resets
    }

    fn config_children(&self, doc: &mut String) {
        let c = &self.config;
        push_tag(doc, "signAccess", "Modem");
        push_tag(doc, "model", &c.model);
        push_tag(doc, "make", &c.make);
        push_tag(doc, "version", &c.version);
        push_tag(doc, "type", &c.sign_type);
        push_tag(doc, "horizBorder", &c.horiz_border_mm.to_string());
        push_tag(doc, "vertBorder", &c.vert_border_mm.to_string());
        push_tag(doc, "horizPitch", &c.horiz_pitch_mm.to_string());
        push_tag(doc, "vertPitch", &c.vert_pitch_mm.to_string());
        let height = c.height_pixels * c.vert_pitch_mm + 2 * c.vert_border_mm;
        let width = c.width_pixels * c.horiz_pitch_mm + 2 * c.horiz_border_mm;
        push_tag(doc, "signHeight", &height.to_string());
        push_tag(doc, "signWidth", &width.to_string());
        push_tag(doc, "characterHeightPixels", &c.char_height_pixels.to_string());
        push_tag(doc, "characterWidthPixels", &c.char_width_pixels.to_string());
        push_tag(doc, "signHeightPixels", &c.height_pixels.to_string());
        push_tag(doc, "signWidthPixels", &c.width_pixels.to_string());
    }

    fn status_children(&self, doc: &mut String) {
        let blank = ShownMessage::default();
        let shown = self.shown.as_ref().unwrap_or(&blank);
        let flag = |set: bool| if set { "true" } else { "false" };
        push_tag(doc, "MsgTextAvailable", flag(!shown.text.is_empty()));
        push_tag(doc, "MsgText", &shown.text);
        push_tag(doc, "ActPriority", &shown.act_priority.to_string());
        push_tag(doc, "RunPriority", &shown.run_priority.to_string());
        push_tag(doc, "Owner", &shown.owner);
        push_tag(doc, "UseOnTime", flag(shown.on_time.is_some()));
        push_tag(doc, "OnTime", shown.on_time.as_deref().unwrap_or(""));
        push_tag(doc, "UseOffTime", flag(shown.off_time.is_some()));
        push_tag(doc, "OffTime", shown.off_time.as_deref().unwrap_or(""));
        push_tag(doc, "DisplayTimeMS", &shown.display_ms.to_string());
        push_tag(doc, "UseBitmap", flag(!shown.bitmap.is_empty()));
        push_tag(doc, "Bitmap", &shown.bitmap);
    }

    fn store_message(&mut self, values: &HashMap<String, String>, multi_page: bool) {
        let value = |name: &str| values.get(name).cloned().unwrap_or_default();
        let priority = |name: &str| values.get(name).and_then(|v| v.parse::<u8>().ok()).unwrap_or_default();
        let time = |flag: &str, name: &str| match values.get(flag).map(String::as_str) {
            Some("true") => values.get(name).cloned(),
            _ => None,
        };
        let message = ShownMessage {
            text: value("MsgText"),
            owner: value("Owner"),
            act_priority: priority("ActPriority"),
            run_priority: priority("RunPriority"),
            display_ms: values
                .get("DisplayTimeMS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or_default(),
            on_time: time("UseOnTime", "OnTime"),
            off_time: time("UseOffTime", "OffTime"),
            bitmap: value("Bitmap"),
            multi_page,
        };
        info!("Vsign {} now showing {:?}", self.address, message.text);
        self.shown = Some(message);
    }
}

fn document(element: &str, body: &str) -> String {
    format!("<{root}><{el}>{body}</{el}></{root}>", root = ROOT_TAG, el = element, body = body)
}

impl VirtualDevice for VirtualDms {
    fn process(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let xml = std::str::from_utf8(request).ok()?;
        let name = second_tag_name(ROOT_TAG, xml).ok()??;
        let values: HashMap<String, String> = parse_children(ROOT_TAG, &name, xml).ok()?.into_iter().collect();
        if values.get("Address").and_then(|a| a.parse::<u32>().ok()) != Some(self.address) {
            return None;
        }
        debug!("Vsign {}: {}", self.address, name);
        self.received.push(name.clone());
        if self.silent > 0 {
            self.silent -= 1;
            return None;
        }

        let response = name.replace("ReqMsg", "RespMsg");
        let mut body = String::new();
        push_tag(&mut body, "Id", values.get("Id").map(String::as_str).unwrap_or("0"));
        if let Some(error) = self.fail_next.take() {
            warn!("Vsign {} rejecting {}: {}", self.address, name, error);
            push_tag(&mut body, "IsValid", "false");
            push_tag(&mut body, "ErrMsg", &error);
        } else {
            push_tag(&mut body, "IsValid", "true");
            push_tag(&mut body, "ErrMsg", "");
            match name.as_str() {
                "GetDmsConfigReqMsg" => self.config_children(&mut body),
                "StatusReqMsg" => self.status_children(&mut body),
                "SetSnglPgReqMsg" => self.store_message(&values, false),
                "SetMultPgReqMsg" => self.store_message(&values, true),
                "SetBlankMsgReqMsg" => self.shown = None,
                "ResetDMSReqMsg" => {
                    self.resets += 1;
                    self.shown = None;
                }
                _ => return None,
            }
        }

        let mut reply = String::new();
        for (id, note) in self.inter_status.iter().enumerate() {
            let mut status = String::new();
            push_tag(&mut status, "Id", &id.to_string());
            push_tag(&mut status, "Msg", note);
            reply.push_str(&document(INTER_STATUS_TAG, &status));
        }
        reply.push_str(&document(&response, &body));
        Some(reply.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use roadlink_core::dmsxml::{self, TokenReader, XmlElem, XmlElems};

    use crate::virtual_link::VirtualLink;

    fn blank_request(address: u32) -> XmlElems {
        let mut elem = XmlElem::new("SetBlankMsgReqMsg", "SetBlankMsgRespMsg");
        elem.add_req("Id", 17);
        elem.add_req("Address", address);
        elem.add_res("Id");
        elem.add_res("IsValid");
        elem.add_res("ErrMsg");
        let mut elems = XmlElems::new();
        elems.add(elem);
        elems
    }

    #[test]
    fn answers_after_inter_status() {
        let sign = Arc::new(Mutex::new(VirtualDms::new(4).with_inter_status(vec!["Dialing", "Connected"])));
        sign.lock().show(ShownMessage {
            text: "ROAD WORK".into(),
            ..Default::default()
        });
        let mut link = VirtualLink::new().with_device(sign.clone()).with_chunk_size(13);
        let mut elems = blank_request(4);
        let completion =
            dmsxml::exchange(&mut link, &mut TokenReader::new(), &mut elems, Duration::from_secs(2)).unwrap();
        assert_eq!(vec!["Dialing".to_string(), "Connected".to_string()], completion.inter_status);
        let response = elems.get("SetBlankMsgRespMsg").unwrap();
        assert!(response.res_bool("IsValid").unwrap());
        assert_eq!(17, response.res_num::<u32>("Id").unwrap());
        assert_eq!(None, sign.lock().shown());
    }

    #[test]
    fn rejection_carries_error_text() {
        let sign = Arc::new(Mutex::new(VirtualDms::new(4)));
        sign.lock().fail_next("Sign is in local mode");
        let mut link = VirtualLink::new().with_device(sign.clone());
        let mut elems = blank_request(4);
        let _ = dmsxml::exchange(&mut link, &mut TokenReader::new(), &mut elems, Duration::from_secs(2)).unwrap();
        let response = elems.get("SetBlankMsgRespMsg").unwrap();
        assert!(!response.res_bool("IsValid").unwrap());
        assert_eq!("Sign is in local mode", response.res_string("ErrMsg").unwrap());
    }

    #[test]
    fn other_addresses_ignored() {
        let mut sign = VirtualDms::new(4);
        let request = blank_request(5).build_request(ROOT_TAG);
        assert_eq!(None, sign.process(request.as_bytes()));
        assert!(sign.received().is_empty());
    }

    #[test]
    fn stores_sent_message() {
        let mut sign = VirtualDms::new(4);
        let request = "<DmsXml><SetMultPgReqMsg><Id>1</Id><Address>4</Address>\
                       <MsgText>A[np]B</MsgText><UseOnTime>true</UseOnTime>\
                       <OnTime>2024-05-01T10:00:00Z</OnTime><UseOffTime>false</UseOffTime>\
                       <OffTime></OffTime><DisplayTimeMS>2500</DisplayTimeMS>\
                       <ActPriority>3</ActPriority><RunPriority>4</RunPriority>\
                       <Owner>ops</Owner><Bitmap>00ff</Bitmap></SetMultPgReqMsg></DmsXml>";
        let _ = sign.process(request.as_bytes()).unwrap();
        let shown = sign.shown().unwrap();
        assert_eq!("A[np]B", shown.text);
        assert_eq!(Some("2024-05-01T10:00:00Z".to_string()), shown.on_time);
        assert_eq!(None, shown.off_time);
        assert_eq!(2500, shown.display_ms);
        assert!(shown.multi_page);
    }
}
