use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use log::warn;
use num_traits::Num;

use crate::errors::CommError;

use super::xml;
use super::LOG_TARGET;

/// One request element and the response element expected in return.
///
/// Request children are written in the order they were added. Response children are
/// registered by name up front and filled in when the response arrives; children the
/// sign sends that weren't registered are ignored.
///
/// # Examples
///
/// ```
/// use roadlink_core::dmsxml::XmlElem;
///
/// let mut elem = XmlElem::new("StatusReqMsg", "StatusRespMsg");
/// elem.add_req("Address", 3);
/// elem.add_res("IsValid");
///
/// let mut doc = String::new();
/// elem.push_request(&mut doc);
/// assert_eq!("<StatusReqMsg><Address>3</Address></StatusReqMsg>", doc);
/// assert!(!elem.was_read());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlElem {
    req_name: String,
    res_name: String,
    req: Vec<(String, String)>,
    res: Vec<(String, Option<String>)>,
    was_read: bool,
}

impl XmlElem {
    /// Creates an element sent as `req_name` and answered by `res_name`.
    pub fn new<R: Into<String>, S: Into<String>>(req_name: R, res_name: S) -> Self {
        XmlElem {
            req_name: req_name.into(),
            res_name: res_name.into(),
            req: Vec::new(),
            res: Vec::new(),
            was_read: false,
        }
    }

    /// Name of the request element.
    pub fn req_name(&self) -> &str {
        &self.req_name
    }

    /// Name of the expected response element.
    pub fn res_name(&self) -> &str {
        &self.res_name
    }

    /// Adds a request child.
    pub fn add_req<V: Display>(&mut self, name: &str, value: V) {
        self.req.push((name.to_string(), value.to_string()));
    }

    /// Registers an expected response child.
    pub fn add_res(&mut self, name: &str) {
        self.res.push((name.to_string(), None));
    }

    /// Whether the response element has been read.
    pub fn was_read(&self) -> bool {
        self.was_read
    }

    /// Appends the request element to `doc`.
    pub fn push_request(&self, doc: &mut String) {
        xml::push_open(doc, &self.req_name);
        for (name, value) in &self.req {
            xml::push_tag(doc, name, value);
        }
        xml::push_close(doc, &self.req_name);
    }

    /// Stores the children of a received response element.
    pub fn read_response(&mut self, children: Vec<(String, String)>) {
        for (name, value) in children {
            if let Some(slot) = self.res.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = Some(value);
            }
        }
        self.was_read = true;
    }

    /// Returns a response child's text.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the child wasn't registered or wasn't received.
    pub fn res_string(&self, name: &str) -> Result<&str, CommError> {
        self.res
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, value)| value.as_deref())
            .ok_or_else(|| CommError::parsing(format!("{} is missing {}", self.res_name, name)))
    }

    /// Returns a response child as a boolean (`true` or `false`, any case).
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the child is missing or isn't a boolean.
    pub fn res_bool(&self, name: &str) -> Result<bool, CommError> {
        let value = self.res_string(name)?.trim();
        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(CommError::parsing(format!("Invalid boolean {} for {}", value, name)))
        }
    }

    /// Returns a response child as a decimal number.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the child is missing or isn't a number of type `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use roadlink_core::dmsxml::XmlElem;
    ///
    /// let mut elem = XmlElem::new("GetDmsConfigReqMsg", "GetDmsConfigRespMsg");
    /// elem.add_res("signWidthPixels");
    /// elem.read_response(vec![("signWidthPixels".into(), " 96 ".into())]);
    /// assert_eq!(96u32, elem.res_num("signWidthPixels").unwrap());
    /// assert!(elem.res_num::<u8>("signHeightPixels").is_err());
    /// ```
    pub fn res_num<T: Num>(&self, name: &str) -> Result<T, CommError> {
        let value = self.res_string(name)?.trim();
        T::from_str_radix(value, 10).map_err(|_| CommError::parsing(format!("Invalid number {} for {}", value, name)))
    }

    /// Returns a response child as a date/time.
    ///
    /// Accepts RFC 3339 stamps, or stamps without an offset which are taken as UTC.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the child is missing or isn't a date/time.
    pub fn res_date(&self, name: &str) -> Result<DateTime<Utc>, CommError> {
        let value = self.res_string(name)?.trim();
        DateTime::parse_from_rfc3339(value)
            .map(|stamp| stamp.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map(|naive| naive.and_utc()))
            .map_err(|_| CommError::parsing(format!("Invalid date {} for {}", value, name)))
    }
}

impl Display for XmlElem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.req_name, self.res_name)?;
        if self.was_read {
            write!(f, " (read)")?;
        }
        Ok(())
    }
}

/// Formats a date/time the way request elements carry them.
pub fn format_date(stamp: DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// The elements of one request/response exchange.
///
/// Intermediate status elements may arrive before the final response; their `Msg` text is
/// queued and can be collected with [`take_inter_status`](Self::take_inter_status).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct XmlElems {
    elems: Vec<XmlElem>,
    inter_status: Vec<String>,
}

impl XmlElems {
    /// Creates an empty container.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an element to the exchange.
    pub fn add(&mut self, elem: XmlElem) {
        self.elems.push(elem);
    }

    /// Returns the element answered by `res_name`.
    pub fn get(&self, res_name: &str) -> Option<&XmlElem> {
        self.elems.iter().find(|e| e.res_name == res_name)
    }

    /// Builds the request document: `<root><Req>...</Req>...</root>`.
    pub fn build_request(&self, root: &str) -> String {
        let mut doc = String::new();
        xml::push_open(&mut doc, root);
        for elem in &self.elems {
            elem.push_request(&mut doc);
        }
        xml::push_close(&mut doc, root);
        doc
    }

    /// Parses one complete `root` token from the sign.
    ///
    /// Response elements that match no registered element are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Parsing`] if the token is malformed.
    pub fn parse_response(&mut self, root: &str, inter_status_tag: &str, token: &str) -> Result<(), CommError> {
        let name = xml::second_tag_name(root, token)?
            .ok_or_else(|| CommError::parsing(format!("Empty {} response", root)))?;
        let children = xml::parse_children(root, &name, token)?;
        if name == inter_status_tag {
            self.inter_status
                .extend(children.into_iter().filter(|(n, _)| n == "Msg").map(|(_, v)| v));
            return Ok(());
        }
        match self.elems.iter_mut().find(|e| e.res_name == name) {
            Some(elem) => elem.read_response(children),
            None => warn!(target: LOG_TARGET, "Ignoring unexpected {} response", name),
        }
        Ok(())
    }

    /// Whether every registered response element has been read.
    pub fn is_read_done(&self) -> bool {
        !self.elems.is_empty() && self.elems.iter().all(XmlElem::was_read)
    }

    /// Removes and returns queued intermediate status messages.
    pub fn take_inter_status(&mut self) -> Vec<String> {
        std::mem::take(&mut self.inter_status)
    }
}
