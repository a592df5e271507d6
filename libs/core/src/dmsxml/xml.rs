use lazy_static::lazy_static;
use regex::Regex;
use roxmltree::{Document, Node};

use crate::errors::CommError;

lazy_static! {
    static ref MARKUP: Regex = Regex::new("[&<>]").unwrap(); // Regex is valid so safe to unwrap.
}

/// Escapes `&`, `<` and `>` in an element value.
///
/// # Examples
///
/// ```
/// use roadlink_core::dmsxml::escape_value;
///
/// assert_eq!("a &amp; b &lt; c &gt; d", escape_value("a & b < c > d"));
/// ```
pub fn escape_value(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Strips characters that can't appear in an element name.
pub fn sanitize_name(name: &str) -> String {
    MARKUP.replace_all(name, "").into_owned()
}

/// Appends `<name>value</name>`, sanitizing the name and escaping the value.
pub fn push_tag(doc: &mut String, name: &str, value: &str) {
    let name = sanitize_name(name);
    push_open(doc, &name);
    doc.push_str(&escape_value(value));
    push_close(doc, &name);
}

/// Appends `<name>`.
pub fn push_open(doc: &mut String, name: &str) {
    doc.push('<');
    doc.push_str(name);
    doc.push('>');
}

/// Appends `</name>`.
pub fn push_close(doc: &mut String, name: &str) {
    doc.push_str("</");
    doc.push_str(name);
    doc.push('>');
}

fn parse(xml: &str) -> Result<Document<'_>, CommError> {
    Document::parse(xml).map_err(|e| CommError::parsing(format!("Malformed XML: {}", e)))
}

fn find_root<'a, 'input>(doc: &'a Document<'input>, root: &str) -> Result<Node<'a, 'input>, CommError> {
    let mut found = doc.descendants().filter(|n| n.has_tag_name(root));
    match (found.next(), found.next()) {
        (Some(node), None) => Ok(node),
        _ => Err(CommError::parsing(format!("Didn't find exactly one {} tag", root))),
    }
}

fn text_content(node: Node<'_, '_>) -> String {
    node.descendants().filter(|n| n.is_text()).filter_map(|n| n.text()).collect()
}

/// Returns the name of the first element inside the single `root` element.
///
/// # Errors
///
/// Returns [`CommError::Parsing`] if the document is malformed or doesn't contain exactly
/// one `root` element.
///
/// # Examples
///
/// ```
/// use roadlink_core::dmsxml::second_tag_name;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// #
/// let name = second_tag_name("tag1", "<tag1><tag2>value</tag2></tag1>")?;
/// assert_eq!(Some("tag2".to_string()), name);
/// #
/// # Ok(()) }
/// ```
pub fn second_tag_name(root: &str, xml: &str) -> Result<Option<String>, CommError> {
    let doc = parse(xml)?;
    let top = find_root(&doc, root)?;
    Ok(top
        .children()
        .find(|n| n.is_element())
        .map(|n| n.tag_name().name().to_string()))
}

/// Returns the name and text of every child of `root`/`element`.
///
/// # Errors
///
/// Returns [`CommError::Parsing`] if the document is malformed or either element is missing.
pub fn parse_children(root: &str, element: &str, xml: &str) -> Result<Vec<(String, String)>, CommError> {
    let doc = parse(xml)?;
    let top = find_root(&doc, root)?;
    let parent = top
        .children()
        .find(|n| n.has_tag_name(element))
        .ok_or_else(|| CommError::parsing(format!("Didn't find tag {} in {}", element, root)))?;
    Ok(parent
        .children()
        .filter(|n| n.is_element())
        .map(|n| (n.tag_name().name().to_string(), text_content(n)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_escaped_tags() {
        let mut doc = String::new();
        push_tag(&mut doc, "name1", "value1");
        push_tag(&mut doc, "name2<>&", "value2 & value 3 < value 4 > value5");
        assert_eq!(
            "<name1>value1</name1><name2>value2 &amp; value 3 &lt; value 4 &gt; value5</name2>",
            doc
        );
    }

    #[test]
    fn nested_children() {
        let pairs = parse_children("top", "tn", "<top><tn><a>a</a><b>b</b></tn></top>").unwrap();
        assert_eq!(
            vec![("a".to_string(), "a".to_string()), ("b".to_string(), "b".to_string())],
            pairs
        );
    }

    #[test]
    fn escaped_text_is_unescaped() {
        let pairs = parse_children("r", "m", "<r><m><ErrMsg>x &amp; y</ErrMsg></m></r>").unwrap();
        assert_eq!("x & y", pairs[0].1);
    }

    #[test]
    fn wrong_second_level_rejected() {
        let xml = "<DmsXml><SetTimeRespMsg><IsValid>false</IsValid></SetTimeRespMsg></DmsXml>";
        assert!(matches!(
            parse_children("DmsXml", "SetInitRespMsg", xml),
            Err(CommError::Parsing { .. })
        ));
    }

    #[test]
    fn unescaped_ampersand_rejected() {
        let error = second_tag_name("tag1", "<tag1><tag2>value & value</tag2></tag1>").unwrap_err();
        assert!(matches!(error, CommError::Parsing { .. }));
    }

    #[test]
    fn missing_root_rejected() {
        assert!(second_tag_name("DmsXml", "<Other><a/></Other>").is_err());
    }
}
