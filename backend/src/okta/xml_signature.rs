//! Enveloped XML signatures on SAML messages
//!
//! Covers what an Okta IdP produces: exclusive canonicalization (with an
//! optional InclusiveNamespaces prefix list), the enveloped-signature
//! transform, SHA-256 digests and RSA SHA-256 signatures, checked against the
//! signing certificates published in the IdP metadata.
//!
//! Only a Signature that is a direct child of the element it references is
//! accepted, and the reference must name that element's own `ID`.

use crate::error::AppError;
use crate::okta::saml_xml::NS_ASSERTION;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

/// XML signature namespace
pub const NS_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
/// Exclusive canonicalization, without comments
pub const ALG_EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
/// Enveloped-signature transform
pub const ALG_ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
/// RSA PKCS#1 v1.5 with SHA-256
pub const ALG_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
/// SHA-256 digest
pub const ALG_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";

/// prefix ("" for the default namespace) -> namespace URI
type Scope = BTreeMap<String, String>;

#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Attribute {
    qname: String,
    prefix: String,
    local: String,
    namespace: String,
    value: String,
}

/// Namespace-aware element, kept as written so it can be canonicalized
#[derive(Debug, Clone)]
struct Element {
    qname: String,
    prefix: String,
    local: String,
    namespace: String,
    scope: Scope,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    /// Unqualified attribute by name
    fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.prefix.is_empty() && a.local == local)
            .map(|a| a.value.as_str())
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    fn children_in<'a, 'b>(
        &'a self,
        namespace: &'b str,
        local: &'b str,
    ) -> impl Iterator<Item = &'a Element> + 'b
    where
        'a: 'b,
    {
        self.elements()
            .filter(move |e| e.namespace == namespace && e.local == local)
    }

    fn child_in(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.children_in(namespace, local).next()
    }

    fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

fn split_qname(qname: &str) -> (String, String) {
    match qname.split_once(':') {
        Some((prefix, local)) => (prefix.to_string(), local.to_string()),
        None => (String::new(), qname.to_string()),
    }
}

fn resolve(scope: &Scope, prefix: &str) -> Result<String, AppError> {
    match prefix {
        "" => Ok(scope.get("").cloned().unwrap_or_default()),
        "xml" => Ok(NS_XML.to_string()),
        _ => scope
            .get(prefix)
            .cloned()
            .ok_or_else(|| AppError::Parse(format!("Unbound namespace prefix {}", prefix))),
    }
}

/// Attribute value after XML attribute-value normalization
fn attribute_value(raw: &[u8]) -> Result<String, AppError> {
    let raw = std::str::from_utf8(raw)
        .map_err(|e| AppError::Parse(format!("XML attribute is not UTF-8: {}", e)))?;
    let normalized = raw
        .replace("\r\n", "\n")
        .replace(|c: char| matches!(c, '\t' | '\n' | '\r'), " ");
    unescape(&normalized)
        .map(|value| value.into_owned())
        .map_err(|e| AppError::Parse(format!("Invalid XML attribute value: {}", e)))
}

fn open_element(start: &BytesStart<'_>, parent: Option<&Scope>) -> Result<Element, AppError> {
    let qname = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (prefix, local) = split_qname(&qname);

    let mut scope = parent.cloned().unwrap_or_default();
    let mut raw_attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| AppError::Parse(format!("Invalid XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attribute_value(&attr.value)?;
        if key == "xmlns" {
            scope.insert(String::new(), value);
        } else if let Some(declared) = key.strip_prefix("xmlns:") {
            scope.insert(declared.to_string(), value);
        } else {
            raw_attributes.push((key, value));
        }
    }

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (qname, value) in raw_attributes {
        let (prefix, local) = split_qname(&qname);
        let namespace = if prefix.is_empty() {
            String::new()
        } else {
            resolve(&scope, &prefix)?
        };
        attributes.push(Attribute {
            qname,
            prefix,
            local,
            namespace,
            value,
        });
    }

    Ok(Element {
        namespace: resolve(&scope, &prefix)?,
        qname,
        prefix,
        local,
        scope,
        attributes,
        children: Vec::new(),
    })
}

fn push_text(element: &mut Element, text: &str) {
    match element.children.last_mut() {
        Some(Node::Text(existing)) => existing.push_str(text),
        _ => element.children.push(Node::Text(text.to_string())),
    }
}

fn close(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), AppError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(AppError::Parse("XML document has several root elements".into())),
    }
    Ok(())
}

/// Parse a document keeping prefixes, declarations and whitespace
fn parse(xml: &str) -> Result<Element, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = open_element(&start, stack.last().map(|e| &e.scope))?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = open_element(&start, stack.last().map(|e| &e.scope))?;
                close(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                if let Some(element) = stack.pop() {
                    close(&mut stack, &mut root, element)?;
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    let value = text
                        .unescape()
                        .map_err(|e| AppError::Parse(format!("Invalid XML text: {}", e)))?;
                    push_text(current, &value.replace("\r\n", "\n"));
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    push_text(current, &String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::DocType(_)) => {
                return Err(AppError::Saml("SAML messages must not carry a DTD".into()))
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

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

struct Canonicalizer<'a> {
    inclusive_prefixes: &'a [String],
    skip: Option<&'a Element>,
    out: String,
}

impl Canonicalizer<'_> {
    fn element(&mut self, element: &Element, rendered: &Scope) {
        let mut utilized: Vec<&str> = vec![element.prefix.as_str()];
        utilized.extend(
            element
                .attributes
                .iter()
                .filter(|a| !a.prefix.is_empty())
                .map(|a| a.prefix.as_str()),
        );
        utilized.extend(
            self.inclusive_prefixes
                .iter()
                .map(String::as_str)
                .filter(|p| element.scope.contains_key(*p)),
        );

        let mut declare = Scope::new();
        for prefix in utilized {
            if prefix == "xml" {
                continue;
            }
            let uri = element.scope.get(prefix).map(String::as_str).unwrap_or("");
            let current = rendered.get(prefix).map(String::as_str);
            if prefix.is_empty() && uri.is_empty() {
                if current.is_some_and(|u| !u.is_empty()) {
                    declare.insert(String::new(), String::new());
                }
            } else if current != Some(uri) {
                declare.insert(prefix.to_string(), uri.to_string());
            }
        }

        self.out.push('<');
        self.out.push_str(&element.qname);
        for (prefix, uri) in &declare {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            escape_attribute(uri, &mut self.out);
            self.out.push('"');
        }

        let mut attributes: Vec<&Attribute> = element.attributes.iter().collect();
        attributes.sort_by(|a, b| {
            (a.namespace.as_str(), a.local.as_str()).cmp(&(b.namespace.as_str(), b.local.as_str()))
        });
        for attribute in attributes {
            self.out.push(' ');
            self.out.push_str(&attribute.qname);
            self.out.push_str("=\"");
            escape_attribute(&attribute.value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');

        let mut scope = rendered.clone();
        scope.extend(declare);
        for child in &element.children {
            match child {
                Node::Element(child) => {
                    if self.skip.is_some_and(|skip| std::ptr::eq(skip, child)) {
                        continue;
                    }
                    self.element(child, &scope);
                }
                Node::Text(text) => escape_text(text, &mut self.out),
            }
        }

        self.out.push_str("</");
        self.out.push_str(&element.qname);
        self.out.push('>');
    }
}

/// Exclusive canonical form of `element`, leaving out `skip`
fn canonical_form(element: &Element, skip: Option<&Element>, inclusive_prefixes: &[String]) -> String {
    let mut canonicalizer = Canonicalizer {
        inclusive_prefixes,
        skip,
        out: String::new(),
    };
    canonicalizer.element(element, &Scope::new());
    canonicalizer.out
}

fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .child_in(ALG_EXC_C14N, "InclusiveNamespaces")
        .and_then(|n| n.attr("PrefixList"))
        .map(|list| {
            list.split_whitespace()
                .map(|p| if p == "#default" { String::new() } else { p.to_string() })
                .collect()
        })
        .unwrap_or_default()
}

fn decode_b64(value: &str, what: &str) -> Result<Vec<u8>, AppError> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| AppError::Saml(format!("{} is not valid base64: {}", what, e)))
}

fn algorithm(element: &Element) -> &str {
    element.attr("Algorithm").unwrap_or_default()
}

/// RSA public key of a base64 DER certificate from the IdP metadata
pub fn certificate_key(certificate: &str) -> Result<RsaPublicKey, AppError> {
    let der = decode_b64(certificate, "IdP signing certificate")?;
    let certificate = Certificate::from_der(&der)
        .map_err(|e| AppError::Saml(format!("Invalid IdP signing certificate: {}", e)))?;
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| AppError::Saml(format!("Invalid IdP signing certificate: {}", e)))?;
    RsaPublicKey::from_public_key_der(&spki).map_err(|e| {
        AppError::Saml(format!("IdP signing certificate has no RSA key: {}", e))
    })
}

/// Check the Signature directly under `element`
///
/// # Returns
/// * `false` when the element carries no Signature
///
/// # Errors
/// * `AppError::Saml` when a Signature is present and does not verify
fn verify_enveloped(element: &Element, keys: &[RsaPublicKey]) -> Result<bool, AppError> {
    let mut signatures = element.children_in(NS_DSIG, "Signature");
    let Some(signature) = signatures.next() else {
        return Ok(false);
    };
    if signatures.next().is_some() {
        return Err(AppError::Saml(format!("{} carries several signatures", element.local)));
    }

    let signed_info = signature
        .child_in(NS_DSIG, "SignedInfo")
        .ok_or_else(|| AppError::Saml("Signature has no SignedInfo".into()))?;

    let c14n = signed_info
        .child_in(NS_DSIG, "CanonicalizationMethod")
        .ok_or_else(|| AppError::Saml("SignedInfo has no CanonicalizationMethod".into()))?;
    if algorithm(c14n) != ALG_EXC_C14N {
        return Err(AppError::Saml(format!(
            "Unsupported canonicalization {}",
            algorithm(c14n)
        )));
    }
    let method = signed_info
        .child_in(NS_DSIG, "SignatureMethod")
        .map(algorithm)
        .unwrap_or_default();
    if method != ALG_RSA_SHA256 {
        return Err(AppError::Saml(format!("Unsupported signature method {}", method)));
    }

    let mut references = signed_info.children_in(NS_DSIG, "Reference");
    let reference = references
        .next()
        .ok_or_else(|| AppError::Saml("SignedInfo has no Reference".into()))?;
    if references.next().is_some() {
        return Err(AppError::Saml("SignedInfo has several references".into()));
    }
    let id = element
        .attr("ID")
        .ok_or_else(|| AppError::Saml(format!("Signed {} has no ID", element.local)))?;
    if reference.attr("URI") != Some(format!("#{}", id).as_str()) {
        return Err(AppError::Saml(format!(
            "Signature does not reference the enclosing {}",
            element.local
        )));
    }

    let mut enveloped = false;
    let mut exclusive = None;
    if let Some(transforms) = reference.child_in(NS_DSIG, "Transforms") {
        for transform in transforms.children_in(NS_DSIG, "Transform") {
            match algorithm(transform) {
                ALG_ENVELOPED_SIGNATURE => enveloped = true,
                ALG_EXC_C14N => exclusive = Some(inclusive_prefixes(transform)),
                other => {
                    return Err(AppError::Saml(format!("Unsupported transform {}", other)))
                }
            }
        }
    }
    let (true, Some(prefixes)) = (enveloped, exclusive) else {
        return Err(AppError::Saml(
            "Reference must use the enveloped-signature and exclusive c14n transforms".into(),
        ));
    };

    let digest_method = reference
        .child_in(NS_DSIG, "DigestMethod")
        .map(algorithm)
        .unwrap_or_default();
    if digest_method != ALG_SHA256 {
        return Err(AppError::Saml(format!("Unsupported digest method {}", digest_method)));
    }
    let expected = reference
        .child_in(NS_DSIG, "DigestValue")
        .map(|d| decode_b64(&d.text(), "DigestValue"))
        .transpose()?
        .ok_or_else(|| AppError::Saml("Reference has no DigestValue".into()))?;

    let digest = Sha256::digest(canonical_form(element, Some(signature), &prefixes).as_bytes());
    if digest.as_slice() != expected.as_slice() {
        return Err(AppError::Saml(format!(
            "Digest of the signed {} does not match",
            element.local
        )));
    }

    let signature_value = signature
        .child_in(NS_DSIG, "SignatureValue")
        .map(|s| decode_b64(&s.text(), "SignatureValue"))
        .transpose()?
        .ok_or_else(|| AppError::Saml("Signature has no SignatureValue".into()))?;
    let signature_value = Signature::try_from(signature_value.as_slice())
        .map_err(|e| AppError::Saml(format!("Malformed SignatureValue: {}", e)))?;

    let canonical_info = canonical_form(signed_info, None, &inclusive_prefixes(c14n));
    let trusted = keys.iter().any(|key| {
        VerifyingKey::<Sha256>::new(key.clone())
            .verify(canonical_info.as_bytes(), &signature_value)
            .is_ok()
    });
    if !trusted {
        return Err(AppError::Saml(
            "Signature does not verify against the IdP signing certificate".into(),
        ));
    }
    Ok(true)
}

/// Which parts of a SAML Response carry a valid signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseSignatures {
    /// The Response itself is signed
    pub response: bool,
    /// Its assertion is signed
    pub assertion: bool,
}

/// Verify the signatures on a Response and on its assertion
///
/// # Arguments
/// * `xml` - Decoded Response document
/// * `certificates` - Base64 DER signing certificates of the IdP
///
/// # Errors
/// * `AppError::Saml` when no certificate is known, when the Response holds
///   more than one assertion, or when a present signature does not verify
pub fn verify_response(xml: &str, certificates: &[String]) -> Result<ResponseSignatures, AppError> {
    if certificates.is_empty() {
        return Err(AppError::Saml("IdP metadata has no signing certificate".into()));
    }
    let keys = certificates
        .iter()
        .map(|c| certificate_key(c))
        .collect::<Result<Vec<_>, _>>()?;

    let root = parse(xml)?;
    let mut assertions = root.elements().filter(|e| e.local == "Assertion");
    let assertion = assertions.next();
    if assertions.next().is_some() {
        return Err(AppError::Saml("Response contains several assertions".into()));
    }

    let response = verify_enveloped(&root, &keys)?;
    let assertion = match assertion {
        Some(assertion) if assertion.namespace == NS_ASSERTION => {
            verify_enveloped(assertion, &keys)?
        }
        _ => false,
    };
    tracing::debug!(response, assertion, "Checked SAML signatures");
    Ok(ResponseSignatures {
        response,
        assertion,
    })
}

#[cfg(test)]
fn find_by_id<'a>(element: &'a Element, id: &str) -> Option<&'a Element> {
    if element.attr("ID") == Some(id) {
        return Some(element);
    }
    element.elements().find_map(|child| find_by_id(child, id))
}

/// Sign the element with `ID="id"` the way an IdP does and put the
/// Signature where `marker` (an XML comment) sits
#[cfg(test)]
pub(crate) fn sign_element(
    xml: &str,
    id: &str,
    marker: &str,
    key: &rsa::RsaPrivateKey,
    inclusive: &[&str],
) -> String {
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{SignatureEncoding, Signer};

    let prefixes: Vec<String> = inclusive.iter().map(|p| p.to_string()).collect();
    let root = parse(xml).unwrap();
    let element = find_by_id(&root, id).unwrap();
    let digest = STANDARD.encode(Sha256::digest(
        canonical_form(element, None, &prefixes).as_bytes(),
    ));

    let inclusive_namespaces = if inclusive.is_empty() {
        String::new()
    } else {
        format!(
            r#"<ec:InclusiveNamespaces xmlns:ec="{}" PrefixList="{}"></ec:InclusiveNamespaces>"#,
            ALG_EXC_C14N,
            inclusive.join(" ")
        )
    };
    let signed_info = format!(
        concat!(
            r#"<ds:SignedInfo xmlns:ds="{ns}">"#,
            r#"<ds:CanonicalizationMethod Algorithm="{c14n}"></ds:CanonicalizationMethod>"#,
            r#"<ds:SignatureMethod Algorithm="{rsa}"></ds:SignatureMethod>"#,
            r##"<ds:Reference URI="#{id}"><ds:Transforms>"##,
            r#"<ds:Transform Algorithm="{enveloped}"></ds:Transform>"#,
            r#"<ds:Transform Algorithm="{c14n}">{inclusive}</ds:Transform>"#,
            r#"</ds:Transforms><ds:DigestMethod Algorithm="{sha}"></ds:DigestMethod>"#,
            r#"<ds:DigestValue>{digest}</ds:DigestValue></ds:Reference></ds:SignedInfo>"#
        ),
        ns = NS_DSIG,
        c14n = ALG_EXC_C14N,
        rsa = ALG_RSA_SHA256,
        id = id,
        enveloped = ALG_ENVELOPED_SIGNATURE,
        inclusive = inclusive_namespaces,
        sha = ALG_SHA256,
        digest = digest,
    );

    let signature = SigningKey::<Sha256>::new(key.clone()).sign(signed_info.as_bytes());
    let signature_xml = format!(
        r#"<ds:Signature xmlns:ds="{}">{}<ds:SignatureValue>{}</ds:SignatureValue></ds:Signature>"#,
        NS_DSIG,
        signed_info,
        STANDARD.encode(signature.to_vec())
    );
    assert!(xml.contains(marker), "marker {} not found", marker);
    xml.replacen(marker, &signature_xml, 1)
}

/// Body of a PEM block, i.e. the base64 DER text
#[cfg(test)]
pub(crate) fn pem_body(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<String>()
}


#[cfg(test)]
mod tests {
    use super::fixtures::{idp_key, untrusted_key, IDP_CERT_PEM};
    use super::*;

    const MARKER: &str = "<!--signature-->";

    fn c14n(xml: &str) -> String {
        canonical_form(&parse(xml).unwrap(), None, &[])
    }

    fn certs() -> Vec<String> {
        vec![pem_body(IDP_CERT_PEM)]
    }

    fn response(inner_marker: &str) -> String {
        format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:xs="http://www.w3.org/2001/XMLSchema" ID="r1">
  <saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">http://www.okta.com/exk1</saml:Issuer>
  <saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="a1">
    <saml:Issuer>http://www.okta.com/exk1</saml:Issuer>{inner_marker}
    <saml:Subject><saml:NameID>jane@example.com</saml:NameID></saml:Subject>
    <saml:AttributeStatement>
      <saml:Attribute Name="groups">
        <saml:AttributeValue xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="xs:string">users</saml:AttributeValue>
      </saml:Attribute>
    </saml:AttributeStatement>
  </saml:Assertion>
</samlp:Response>"#
        )
    }

    #[test]
    fn test_c14n_prunes_unused_namespaces_and_sorts_attributes() {
        let xml = r#"<root xmlns="urn:d" xmlns:a="urn:a" xmlns:unused="urn:u"><a:child z="1" a:y="2" b="3"/><plain>x &amp; &lt;y&gt;</plain></root>"#;
        assert_eq!(
            c14n(xml),
            r#"<root xmlns="urn:d"><a:child xmlns:a="urn:a" b="3" z="1" a:y="2"></a:child><plain>x &amp; &lt;y&gt;</plain></root>"#
        );
    }

    #[test]
    fn test_c14n_of_subtree_pulls_in_ancestor_namespaces() {
        let root = parse(r#"<root xmlns="urn:d" xmlns:a="urn:a" xmlns:unused="urn:u"><a:child b="3"/><plain>t</plain></root>"#).unwrap();
        let child = root.elements().next().unwrap();
        assert_eq!(
            canonical_form(child, None, &[]),
            r#"<a:child xmlns:a="urn:a" b="3"></a:child>"#
        );

        let plain = root.elements().nth(1).unwrap();
        assert_eq!(
            canonical_form(plain, None, &["unused".to_string()]),
            r#"<plain xmlns="urn:d" xmlns:unused="urn:u">t</plain>"#
        );
    }

    #[test]
    fn test_c14n_undeclares_default_namespace() {
        assert_eq!(
            c14n(r#"<r xmlns="urn:d"><s xmlns=""/></r>"#),
            r#"<r xmlns="urn:d"><s xmlns=""></s></r>"#
        );
    }

    #[test]
    fn test_c14n_escapes_attribute_values_and_drops_comments() {
        assert_eq!(
            c14n("<e b=\"p\nq\" a=\"x&#9;y&#xA;&quot;&lt;&gt;\"><!-- note -->t&gt;</e>"),
            r#"<e a="x&#x9;y&#xA;&quot;&lt;>" b="p q">t&gt;</e>"#
        );
    }

    #[test]
    fn test_signed_assertion_verifies() {
        let xml = sign_element(&response(MARKER), "a1", MARKER, &idp_key(), &["xs"]);
        let signatures = verify_response(&xml, &certs()).unwrap();
        assert_eq!(
            signatures,
            ResponseSignatures {
                response: false,
                assertion: true
            }
        );
    }

    #[test]
    fn test_signed_response_and_assertion_verify() {
        let response_marker = "<!--response-signature-->";
        let xml = response(MARKER).replacen(
            "</saml:Issuer>",
            &format!("</saml:Issuer>{}", response_marker),
            1,
        );
        let xml = sign_element(&xml, "a1", MARKER, &idp_key(), &[]);
        let xml = sign_element(&xml, "r1", response_marker, &idp_key(), &[]);

        let signatures = verify_response(&xml, &certs()).unwrap();
        assert!(signatures.response);
        assert!(signatures.assertion);
    }

    #[test]
    fn test_unsigned_response_reports_no_signature() {
        let signatures = verify_response(&response(""), &certs()).unwrap();
        assert_eq!(signatures, ResponseSignatures::default());
    }

    #[test]
    fn test_tampered_assertion_fails_digest() {
        let xml = sign_element(&response(MARKER), "a1", MARKER, &idp_key(), &[]);
        let tampered = xml.replace("jane@example.com", "admin@example.com");
        let err = verify_response(&tampered, &certs()).unwrap_err();
        assert!(err.to_string().contains("Digest"), "{}", err);
    }

    #[test]
    fn test_inclusive_prefix_is_part_of_the_digest() {
        // Dropping the declaration the prefix list pulls in changes the digest
        let xml = sign_element(&response(MARKER), "a1", MARKER, &idp_key(), &["xs"]);
        let moved = xml.replace(
            r#" xmlns:xs="http://www.w3.org/2001/XMLSchema""#,
            r#" xmlns:xs="urn:other""#,
        );
        assert!(verify_response(&moved, &certs()).is_err());
    }

    #[test]
    fn test_untrusted_key_is_rejected() {
        let xml = sign_element(&response(MARKER), "a1", MARKER, &untrusted_key(), &[]);
        let err = verify_response(&xml, &certs()).unwrap_err();
        assert!(err.to_string().contains("IdP signing certificate"), "{}", err);
    }

    #[test]
    fn test_reference_must_name_the_enclosing_element() {
        let xml = sign_element(&response(MARKER), "a1", MARKER, &idp_key(), &[]);
        let retargeted = xml.replace(r##"URI="#a1""##, r##"URI="#r1""##);
        assert!(verify_response(&retargeted, &certs()).is_err());
    }

    #[test]
    fn test_second_assertion_is_rejected() {
        let xml = sign_element(&response(MARKER), "a1", MARKER, &idp_key(), &[]);
        let wrapped = xml.replace(
            "</samlp:Response>",
            r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="evil"><saml:Subject><saml:NameID>admin@example.com</saml:NameID></saml:Subject></saml:Assertion></samlp:Response>"#,
        );
        let err = verify_response(&wrapped, &certs()).unwrap_err();
        assert!(err.to_string().contains("several assertions"));
    }

    #[test]
    fn test_doctype_is_rejected() {
        let xml = format!("<!DOCTYPE x [<!ENTITY e \"v\">]>{}", response(""));
        assert!(verify_response(&xml, &certs()).is_err());
    }

    #[test]
    fn test_certificate_key_parses_fixture() {
        assert!(certificate_key(&pem_body(IDP_CERT_PEM)).is_ok());
        assert!(certificate_key("bm90IGEgY2VydA==").is_err());
        assert!(verify_response(&response(""), &[]).is_err());
    }
}
