//! SAML XML reading and writing
//!
//! Reads IdP documents into a small element tree (namespace prefixes are
//! dropped, only local names are kept) and renders the few messages the
//! service provider sends.

use crate::error::AppError;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// SAML 2.0 protocol namespace
pub const NS_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
/// SAML 2.0 assertion namespace
pub const NS_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// SAML 2.0 metadata namespace
pub const NS_METADATA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
/// HTTP-Redirect binding URI
pub const BINDING_HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
/// HTTP-POST binding URI
pub const BINDING_HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
/// Unspecified NameID format
pub const NAMEID_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// One element of a parsed document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Local name (prefix stripped)
    pub name: String,
    /// Attributes by local name
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order
    pub children: Vec<XmlElement>,
    /// Concatenated text content
    pub text: String,
}

impl XmlElement {
    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> Result<XmlElement, AppError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(element_from_start(&start)?),
                Ok(Event::Empty(start)) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Ok(Event::Text(text)) => {
                    if let Some(current) = stack.last_mut() {
                        let value = text
                            .unescape()
                            .map_err(|e| AppError::Parse(format!("Invalid XML text: {}", e)))?;
                        current.text.push_str(&value);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(AppError::Parse(format!(
                        "Invalid XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
            }
        }

        root.ok_or_else(|| AppError::Parse("XML document has no root element".to_string()))
    }

    /// Attribute value by local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child with this local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children with this local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a path of direct children
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names
            .iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// First descendant (depth-first) with this local name
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Trimmed text, `None` when empty
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, AppError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| AppError::Parse(format!("Invalid XML attribute: {}", e)))?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| AppError::Parse(format!("Invalid XML attribute value: {}", e)))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        ..Default::default()
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

/// Parameters of an AuthnRequest
#[derive(Debug, Clone)]
pub struct AuthnRequestParams<'a> {
    /// Request ID (must start with a letter or underscore)
    pub id: &'a str,
    /// RFC 3339 issue instant
    pub issue_instant: &'a str,
    /// IdP single sign-on URL
    pub destination: &'a str,
    /// SP entity ID
    pub issuer: &'a str,
    /// SP assertion consumer service URL
    pub acs_url: &'a str,
}

/// Render an AuthnRequest asking for an HTTP-POST response
pub fn authn_request_xml(params: &AuthnRequestParams<'_>) -> String {
    format!(
        concat!(
            r#"<samlp:AuthnRequest xmlns:samlp="{ns_p}" xmlns:saml="{ns_a}" ID="{id}" "#,
            r#"Version="2.0" IssueInstant="{instant}" Destination="{dest}" "#,
            r#"ProtocolBinding="{binding}" AssertionConsumerServiceURL="{acs}">"#,
            r#"<saml:Issuer>{issuer}</saml:Issuer>"#,
            r#"<samlp:NameIDPolicy Format="{format}" AllowCreate="true"/>"#,
            r#"</samlp:AuthnRequest>"#
        ),
        ns_p = NS_PROTOCOL,
        ns_a = NS_ASSERTION,
        id = escape(params.id),
        instant = escape(params.issue_instant),
        dest = escape(params.destination),
        binding = BINDING_HTTP_POST,
        acs = escape(params.acs_url),
        issuer = escape(params.issuer),
        format = NAMEID_UNSPECIFIED,
    )
}

/// Parameters of a LogoutRequest
#[derive(Debug, Clone)]
pub struct LogoutRequestParams<'a> {
    /// Request ID
    pub id: &'a str,
    /// RFC 3339 issue instant
    pub issue_instant: &'a str,
    /// IdP single logout URL
    pub destination: &'a str,
    /// SP entity ID
    pub issuer: &'a str,
    /// NameID of the session being ended
    pub name_id: &'a str,
    /// NameID format, when known
    pub name_id_format: Option<&'a str>,
    /// Session index, when known
    pub session_index: Option<&'a str>,
}

/// Render a LogoutRequest for an existing session
pub fn logout_request_xml(params: &LogoutRequestParams<'_>) -> String {
    let format_attr = params
        .name_id_format
        .map(|f| format!(r#" Format="{}""#, escape(f)))
        .unwrap_or_default();
    let session_index = params
        .session_index
        .map(|s| format!("<samlp:SessionIndex>{}</samlp:SessionIndex>", escape(s)))
        .unwrap_or_default();

    format!(
        concat!(
            r#"<samlp:LogoutRequest xmlns:samlp="{ns_p}" xmlns:saml="{ns_a}" ID="{id}" "#,
            r#"Version="2.0" IssueInstant="{instant}" Destination="{dest}">"#,
            r#"<saml:Issuer>{issuer}</saml:Issuer>"#,
            r#"<saml:NameID{format_attr}>{name_id}</saml:NameID>"#,
            r#"{session_index}"#,
            r#"</samlp:LogoutRequest>"#
        ),
        ns_p = NS_PROTOCOL,
        ns_a = NS_ASSERTION,
        id = escape(params.id),
        instant = escape(params.issue_instant),
        dest = escape(params.destination),
        issuer = escape(params.issuer),
        format_attr = format_attr,
        name_id = escape(params.name_id),
        session_index = session_index,
    )
}

/// Render the SP metadata document
pub fn sp_metadata_xml(entity_id: &str, acs_url: &str, sls_url: Option<&str>) -> String {
    let sls = sls_url
        .map(|url| {
            format!(
                r#"<md:SingleLogoutService Binding="{}" Location="{}"/>"#,
                BINDING_HTTP_REDIRECT,
                escape(url)
            )
        })
        .unwrap_or_default();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<md:EntityDescriptor xmlns:md="{ns_md}" entityID="{entity}">"#,
            r#"<md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="true" "#,
            r#"protocolSupportEnumeration="{ns_p}">"#,
            r#"{sls}"#,
            r#"<md:NameIDFormat>{format}</md:NameIDFormat>"#,
            r#"<md:AssertionConsumerService Binding="{binding}" Location="{acs}" index="0" isDefault="true"/>"#,
            r#"</md:SPSSODescriptor>"#,
            r#"</md:EntityDescriptor>"#
        ),
        ns_md = NS_METADATA,
        ns_p = NS_PROTOCOL,
        entity = escape(entity_id),
        sls = sls,
        format = NAMEID_UNSPECIFIED,
        binding = BINDING_HTTP_POST,
        acs = escape(acs_url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_prefixes() {
        let root = XmlElement::parse(
            r#"<saml2p:Response xmlns:saml2p="urn:x" ID="r1">
                 <saml2:Issuer xmlns:saml2="urn:y">https://idp</saml2:Issuer>
                 <saml2p:Status><saml2p:StatusCode Value="ok"/></saml2p:Status>
               </saml2p:Response>"#,
        )
        .unwrap();

        assert_eq!(root.name, "Response");
        assert_eq!(root.attr("ID"), Some("r1"));
        assert_eq!(root.attr("saml2p"), None);
        assert_eq!(root.child("Issuer").and_then(|i| i.text()), Some("https://idp"));
        assert_eq!(
            root.path(&["Status", "StatusCode"]).and_then(|s| s.attr("Value")),
            Some("ok")
        );
    }

    #[test]
    fn test_parse_unescapes_text() {
        let root = XmlElement::parse("<a><b>x &amp; y</b></a>").unwrap();
        assert_eq!(root.find("b").and_then(|b| b.text()), Some("x & y"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_authn_request_escapes_values() {
        let xml = authn_request_xml(&AuthnRequestParams {
            id: "_abc",
            issue_instant: "2024-01-01T00:00:00Z",
            destination: "https://idp/sso?a=1&b=2",
            issuer: "sp",
            acs_url: "http://localhost/saml/acs",
        });
        let root = XmlElement::parse(&xml).unwrap();
        assert_eq!(root.name, "AuthnRequest");
        assert_eq!(root.attr("Destination"), Some("https://idp/sso?a=1&b=2"));
        assert_eq!(root.child("Issuer").and_then(|i| i.text()), Some("sp"));
    }

    #[test]
    fn test_sp_metadata_wants_signed_assertions() {
        let xml = sp_metadata_xml("sp", "http://localhost/saml/acs", None);
        let root = XmlElement::parse(&xml).unwrap();
        let descriptor = root.child("SPSSODescriptor").unwrap();
        assert_eq!(descriptor.attr("WantAssertionsSigned"), Some("true"));
        assert_eq!(
            descriptor
                .child("AssertionConsumerService")
                .and_then(|a| a.attr("Location")),
            Some("http://localhost/saml/acs")
        );
        assert!(descriptor.child("SingleLogoutService").is_none());
    }
}
