use std::time::Duration;

use tracing::debug;
use ureq::Agent;
use xmltree::Element;

use crate::errors::StreamingError;
use crate::upnp::soap::{
    ensure_success, extract_child_text, extract_child_text_allow_empty, find_child_with_suffix,
    invoke_upnp_action, soap_agent,
};

pub const AVTRANSPORT_SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:AVTransport:1";
const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    PausedPlayback,
    Transitioning,
    NoMediaPresent,
    Unknown(String),
}

impl TransportState {
    pub fn from_upnp_state(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "STOPPED" => TransportState::Stopped,
            "PLAYING" => TransportState::Playing,
            "PAUSED_PLAYBACK" => TransportState::PausedPlayback,
            "TRANSITIONING" => TransportState::Transitioning,
            "NO_MEDIA_PRESENT" => TransportState::NoMediaPresent,
            _ => TransportState::Unknown(raw.trim().to_string()),
        }
    }

    /// Playing or paused: the renderer holds a loaded track.
    pub fn is_active(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::PausedPlayback)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaInfo {
    pub current_uri: Option<String>,
    pub media_duration: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportInfo {
    pub current_transport_state: TransportState,
    pub current_transport_status: String,
    pub current_speed: String,
}

/// Whole seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionInfo {
    pub track_duration: u64,
    pub rel_time: u64,
    pub track_uri: Option<String>,
}

/// The AVTransport actions the streamer needs, on instance 0.
pub trait AvTransport: Send + Sync {
    fn control_url(&self) -> &str;

    fn get_media_info(&self) -> Result<MediaInfo, StreamingError>;

    fn get_transport_info(&self) -> Result<TransportInfo, StreamingError>;

    fn get_position_info(&self) -> Result<PositionInfo, StreamingError>;

    fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> Result<(), StreamingError>;

    fn play(&self) -> Result<(), StreamingError>;

    fn stop(&self) -> Result<(), StreamingError>;

    fn pause(&self) -> Result<(), StreamingError>;

    /// Called once when the device is removed.
    fn release(&self) {}
}

/// AVTransport:1 over SOAP/HTTP.
#[derive(Debug, Clone)]
pub struct AvTransportClient {
    agent: Agent,
    control_url: String,
    service_type: String,
    instance_id: String,
}

impl AvTransportClient {
    pub fn new(
        control_url: impl Into<String>,
        service_type: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: soap_agent(timeout),
            control_url: control_url.into(),
            service_type: service_type.into(),
            instance_id: "0".to_string(),
        }
    }

    fn call(&self, action: &str, extra_args: &[(&str, &str)]) -> Result<Element, StreamingError> {
        let mut args: Vec<(&str, &str)> = vec![("InstanceID", self.instance_id.as_str())];
        args.extend_from_slice(extra_args);

        let result = invoke_upnp_action(
            &self.agent,
            &self.control_url,
            &self.service_type,
            action,
            &args,
        )?;
        let body = ensure_success(action, &result)?;
        Ok(body.clone())
    }
}

impl AvTransport for AvTransportClient {
    fn control_url(&self) -> &str {
        &self.control_url
    }

    fn get_media_info(&self) -> Result<MediaInfo, StreamingError> {
        let body = self.call("GetMediaInfo", &[])?;
        parse_media_info(&body)
    }

    fn get_transport_info(&self) -> Result<TransportInfo, StreamingError> {
        let body = self.call("GetTransportInfo", &[])?;
        parse_transport_info(&body)
    }

    fn get_position_info(&self) -> Result<PositionInfo, StreamingError> {
        let body = self.call("GetPositionInfo", &[])?;
        parse_position_info(&body)
    }

    fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> Result<(), StreamingError> {
        debug!(url = %self.control_url, uri, "SetAVTransportURI");
        self.call(
            "SetAVTransportURI",
            &[("CurrentURI", uri), ("CurrentURIMetaData", metadata)],
        )
        .map(|_| ())
    }

    fn play(&self) -> Result<(), StreamingError> {
        self.call("Play", &[("Speed", "1")]).map(|_| ())
    }

    fn stop(&self) -> Result<(), StreamingError> {
        self.call("Stop", &[]).map(|_| ())
    }

    fn pause(&self) -> Result<(), StreamingError> {
        self.call("Pause", &[]).map(|_| ())
    }
}

fn response_element<'a>(body: &'a Element, action: &str) -> Result<&'a Element, StreamingError> {
    let name = format!("{action}Response");
    find_child_with_suffix(body, &name)
        .ok_or_else(|| StreamingError::upnp_missing_return_value(&name))
}

pub fn parse_media_info(body: &Element) -> Result<MediaInfo, StreamingError> {
    let response = response_element(body, "GetMediaInfo")?;

    let current_uri = extract_child_text_allow_empty(response, "CurrentURI")?;
    let media_duration = find_child_with_suffix(response, "MediaDuration")
        .and_then(|e| e.get_text())
        .map(|t| upnp_time_secs(&t))
        .unwrap_or(0);

    Ok(MediaInfo {
        current_uri: Some(current_uri).filter(|uri| !uri.is_empty()),
        media_duration,
    })
}

pub fn parse_transport_info(body: &Element) -> Result<TransportInfo, StreamingError> {
    let response = response_element(body, "GetTransportInfo")?;

    let state = extract_child_text(response, "CurrentTransportState")?;
    let current_transport_status =
        extract_child_text_allow_empty(response, "CurrentTransportStatus")?;
    let current_speed = extract_child_text_allow_empty(response, "CurrentSpeed")?;

    Ok(TransportInfo {
        current_transport_state: TransportState::from_upnp_state(&state),
        current_transport_status,
        current_speed,
    })
}

pub fn parse_position_info(body: &Element) -> Result<PositionInfo, StreamingError> {
    let response = response_element(body, "GetPositionInfo")?;

    let track_duration = extract_child_text_allow_empty(response, "TrackDuration")?;
    let rel_time = extract_child_text_allow_empty(response, "RelTime")?;
    let track_uri = find_child_with_suffix(response, "TrackURI")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(PositionInfo {
        track_duration: upnp_time_secs(&track_duration),
        rel_time: upnp_time_secs(&rel_time),
        track_uri,
    })
}

/// Parses `H+:MM:SS[.F+]` or `H+:MM:SS[.F0/F1]` into whole seconds.
pub fn parse_upnp_time(input: &str) -> Result<u64, StreamingError> {
    let trimmed = input.trim();
    let clock = trimmed.split('.').next().unwrap_or_default();
    let parts: Vec<&str> = clock.split(':').collect();

    if clock.is_empty() || parts.len() > 3 {
        return Err(StreamingError::ParsingError(format!(
            "Invalid time format '{input}': expected H:MM:SS"
        )));
    }

    let mut total = 0u64;
    for part in parts {
        let value = part.trim_start_matches('+').parse::<u64>().map_err(|_| {
            StreamingError::ParsingError(format!(
                "Invalid numeric value '{part}' in time string '{input}'"
            ))
        })?;
        total = total
            .checked_mul(60)
            .and_then(|minutes| minutes.checked_add(value))
            .ok_or_else(|| {
                StreamingError::ParsingError(format!("Time string '{input}' out of range"))
            })?;
    }
    Ok(total)
}

/// Like [`parse_upnp_time`], with `NOT_IMPLEMENTED` and garbage read as 0.
pub fn upnp_time_secs(input: &str) -> u64 {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_IMPLEMENTED) {
        return 0;
    }
    parse_upnp_time(trimmed).unwrap_or(0)
}
