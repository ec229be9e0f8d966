use std::io::BufReader;
use std::time::Duration;

use tracing::trace;
use ureq::Agent;
use xmltree::{Element, EmitterConfig, XMLNode};

use crate::errors::StreamingError;

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - SOAP `Body` element if the reply parsed as an envelope
pub struct SoapCallResult {
    pub status: u16,
    pub raw_body: String,
    pub body: Option<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpFault {
    pub error_code: u32,
    pub error_description: String,
}

/// HTTP agent reading bodies of 4xx/5xx replies, which carry SOAP faults.
pub fn soap_agent(timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build();
    config.into()
}

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

fn text_element(name: &str, text: &str) -> Element {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.to_string()));
    element
}

fn write_envelope(body_child: Element) -> Result<String, StreamingError> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new().write_document_declaration(true);
    envelope
        .write_with_config(&mut buf, config)
        .map_err(|err| StreamingError::SoapAction(format!("cannot write envelope: {err}")))?;
    String::from_utf8(buf)
        .map_err(|err| StreamingError::SoapAction(format!("envelope is not UTF-8: {err}")))
}

/// SOAP request for `action`; argument values are escaped by the emitter.
pub fn build_soap_request(
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, StreamingError> {
    let mut request = Element::new(&format!("u:{action}"));
    request
        .attributes
        .insert("xmlns:u".to_string(), service_type.to_string());
    for (name, value) in args {
        request
            .children
            .push(XMLNode::Element(text_element(name, value)));
    }

    write_envelope(request)
}

/// Extracts the `Body` element of a SOAP envelope.
pub fn parse_soap_body(xml: &[u8]) -> Result<Element, StreamingError> {
    let root = Element::parse(BufReader::new(xml))
        .map_err(|err| StreamingError::ParsingError(format!("Invalid SOAP XML: {err}")))?;

    if !root.name.ends_with("Envelope") {
        return Err(StreamingError::ParsingError(format!(
            "Expected SOAP Envelope, got {}",
            root.name
        )));
    }

    find_child_with_suffix(&root, "Body")
        .cloned()
        .ok_or_else(|| StreamingError::ParsingError("Missing SOAP Body".to_string()))
}

/// Invoke a UPnP SOAP action on a control URL.
///
/// - `control_url`: full HTTP URL of the service control endpoint
/// - `service_type`: service URN, e.g. "urn:schemas-upnp-org:service:AVTransport:1"
/// - `action`: action name, e.g. "GetTransportInfo"
/// - `args`: list of (name, value) pairs, e.g. &[("InstanceID", "0")]
pub fn invoke_upnp_action(
    agent: &Agent,
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<SoapCallResult, StreamingError> {
    let body_xml = build_soap_request(service_type, action, args)?;
    let soap_action_header = format!(r#""{}#{}""#, service_type, action);

    trace!(url = control_url, action, "SOAP request");
    let mut response = agent
        .post(control_url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPAction", &soap_action_header)
        .send(body_xml)
        .map_err(|err| StreamingError::SoapAction(format!("{action} to {control_url}: {err}")))?;

    let status = response.status().as_u16();
    let raw_body = response
        .body_mut()
        .read_to_string()
        .map_err(|err| StreamingError::SoapAction(format!("{action}: cannot read body: {err}")))?;

    // A reply that is not SOAP still hands back its status and raw body
    let body = parse_soap_body(raw_body.as_bytes()).ok();

    Ok(SoapCallResult {
        status,
        raw_body,
        body,
    })
}

/// Checks the HTTP status and UPnP fault of a reply, returning its SOAP body.
pub fn ensure_success<'a>(
    action: &str,
    result: &'a SoapCallResult,
) -> Result<&'a Element, StreamingError> {
    if !(200..300).contains(&result.status) {
        if let Some(fault) = result.body.as_ref().and_then(parse_upnp_error) {
            return Err(StreamingError::SoapUpnpError(
                action.to_string(),
                fault.error_code,
                fault.error_description,
                result.status,
            ));
        }
        return Err(StreamingError::SoapActionWrongBody(
            action.to_string(),
            result.status,
            result.raw_body.clone(),
        ));
    }

    result
        .body
        .as_ref()
        .ok_or_else(|| StreamingError::SoapNoEnvelope(action.to_string()))
}

/// Reads `Fault/detail/UPnPError` from a SOAP body.
pub fn parse_upnp_error(body: &Element) -> Option<UpnpFault> {
    let fault = find_child_with_suffix(body, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    let error_code = find_child_with_suffix(upnp_error, "errorCode")
        .and_then(|e| e.get_text())
        .and_then(|t| t.trim().parse::<u32>().ok())?;
    let error_description = find_child_with_suffix(upnp_error, "errorDescription")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Some(UpnpFault {
        error_code,
        error_description,
    })
}

pub fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}

pub fn extract_child_text(parent: &Element, suffix: &str) -> Result<String, StreamingError> {
    let text = extract_child_text_allow_empty(parent, suffix)?;
    if text.is_empty() {
        return Err(StreamingError::ParsingError(format!(
            "{suffix} element missing text in {}",
            parent.name
        )));
    }
    Ok(text)
}

pub fn extract_child_text_allow_empty(
    parent: &Element,
    suffix: &str,
) -> Result<String, StreamingError> {
    let child = find_child_with_suffix(parent, suffix)
        .ok_or_else(|| StreamingError::upnp_missing_return_value(suffix))?;
    Ok(child
        .get_text()
        .map(|t| t.trim().to_string())
        .unwrap_or_default())
}
