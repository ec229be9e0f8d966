//! Requests of the AirPlay remote-playback protocol.
//!
//! The protocol borrows the HTTP/1.1 request shape but is spoken directly on
//! the receiver's control socket, with bare `\n` line endings.

use std::fmt;

const EOL: &str = "\n";
const USER_AGENT: &str = "MediaControl/1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandMethod {
    Get,
    Post,
}

impl CommandMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandMethod::Get => "GET",
            CommandMethod::Post => "POST",
        }
    }
}

impl fmt::Display for CommandMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AirplayCommand {
    /// Loads `content_url` and starts at `start_position` (fraction of the content).
    Play {
        content_url: String,
        start_position: f64,
    },
    Stop,
    /// Playback speed: 0 pauses, 1 plays at normal speed.
    Rate { value: f64 },
    /// Jumps to `position` seconds.
    Seek { position: f64 },
    /// Asks for duration and position.
    Status,
}

impl AirplayCommand {
    pub fn play(content_url: impl Into<String>, start_position: f64) -> Self {
        AirplayCommand::Play {
            content_url: content_url.into(),
            start_position,
        }
    }

    pub fn rate(value: f64) -> Self {
        AirplayCommand::Rate { value }
    }

    pub fn seek(position: f64) -> Self {
        AirplayCommand::Seek { position }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AirplayCommand::Play { .. } => "PLAY",
            AirplayCommand::Stop => "STOP",
            AirplayCommand::Rate { .. } => "RATE",
            AirplayCommand::Seek { .. } => "SEEK",
            AirplayCommand::Status => "PLAY_STATUS",
        }
    }

    pub fn method(&self) -> CommandMethod {
        match self {
            AirplayCommand::Status => CommandMethod::Get,
            _ => CommandMethod::Post,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            AirplayCommand::Play { .. } => "play",
            AirplayCommand::Stop => "stop",
            AirplayCommand::Rate { .. } => "rate",
            AirplayCommand::Seek { .. } | AirplayCommand::Status => "scrub",
        }
    }

    pub fn url_parameters(&self) -> Vec<(&'static str, String)> {
        match self {
            AirplayCommand::Rate { value } => vec![("value", format_decimal(*value))],
            AirplayCommand::Seek { position } => vec![("position", format_decimal(*position))],
            _ => Vec::new(),
        }
    }

    /// Body parameters, in wire order.
    pub fn post_parameters(&self) -> Vec<(&'static str, String)> {
        match self {
            AirplayCommand::Play {
                content_url,
                start_position,
            } => vec![
                ("Content-Location", content_url.clone()),
                ("Start-Position", format!("{:.6}", start_position)),
            ],
            _ => Vec::new(),
        }
    }

    /// Request target: `/path` followed by the query string, if any.
    pub fn url(&self) -> String {
        let mut url = format!("/{}", self.path());
        let params = self.url_parameters();
        if !params.is_empty() {
            let query = params
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    pub fn body(&self) -> String {
        self.post_parameters()
            .iter()
            .map(|(key, value)| format!("{key}: {value}{EOL}"))
            .collect()
    }

    /// Full request text as written on the socket.
    pub fn to_request(&self) -> String {
        let body = self.body();

        let mut request = format!("{} {} HTTP/1.1{EOL}", self.method(), self.url());
        request.push_str(&format!("Content-Length: {}{EOL}", body.len()));
        request.push_str(&format!("User-Agent: {USER_AGENT}{EOL}"));
        if !body.is_empty() {
            request.push_str(EOL);
            request.push_str(&body);
        }
        request.push_str(EOL);
        request
    }
}

/// Decimal text with at least one fractional digit: `0.0`, `1.0`, `2.5`.
fn format_decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
