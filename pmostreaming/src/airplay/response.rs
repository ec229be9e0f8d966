use std::collections::HashMap;

pub const CONTENT_TYPE_PARAMETERS: &str = "text/parameters";

const HTTP_OK: u16 = 200;

/// Decoded reply of an AirPlay receiver.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandResponse {
    code: u16,
    message: Option<String>,
    headers: Vec<(String, String)>,
    content_length: usize,
    content_type: Option<String>,
    content_parameters: HashMap<String, String>,
}

impl CommandResponse {
    /// Decodes the status line and headers.
    ///
    /// A status line that does not read `<version> <code> <message>` yields
    /// code 0 and no message.
    pub fn decode_http_response<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut response = CommandResponse::default();
        let mut lines = lines.iter().map(|line| line.as_ref());

        if let Some(status_line) = lines.next() {
            if let Some((code, message)) = parse_status_line(status_line) {
                response.code = code;
                response.message = Some(message);
            }
        }

        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("Content-Length") {
                response.content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("Content-Type") {
                response.content_type = Some(value.to_string());
            }
            response.headers.push((name.to_string(), value.to_string()));
        }

        response
    }

    /// Parses a `text/parameters` body: one `key: value` per line.
    pub fn decode_content_parameters(&mut self, body: &str) {
        for line in body.lines() {
            if let Some((key, value)) = line.split_once(':') {
                self.content_parameters
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    pub fn has_parameters_body(&self) -> bool {
        self.content_type.as_deref() == Some(CONTENT_TYPE_PARAMETERS)
    }

    pub fn is_success(&self) -> bool {
        self.code == HTTP_OK
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_parameters(&self) -> &HashMap<String, String> {
        &self.content_parameters
    }

    /// Whole seconds of a fractional parameter; absent or invalid counts as 0.
    pub fn seconds_parameter(&self, key: &str) -> u64 {
        truncate_seconds(self.content_parameters.get(key).map(String::as_str))
    }
}

fn parse_status_line(line: &str) -> Option<(u16, String)> {
    let (_version, rest) = line.trim_end().split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (code, message) = match rest.split_once(char::is_whitespace) {
        Some((code, message)) => (code, message.trim()),
        None => (rest, ""),
    };
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = code.parse::<u16>().ok()?;
    Some((code, message.to_string()))
}

pub fn truncate_seconds(value: Option<&str>) -> u64 {
    value
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| secs.trunc() as u64)
        .unwrap_or(0)
}
