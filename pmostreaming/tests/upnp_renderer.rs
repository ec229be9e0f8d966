use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use pmostreaming::scheduler::poll_playing_sessions;
use pmostreaming::{
    ContentMetadata, DeviceId, EventOutcome, SessionStatus, StreamingConfig, StreamingEvent,
    StreamingEventType, StreamingService,
};

const SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

#[derive(Default)]
struct RendererState {
    current_uri: String,
    transport_state: String,
    actions: Vec<String>,
    failing_action: Option<&'static str>,
}

/// AVTransport renderer answering SOAP over HTTP on the loopback interface.
#[derive(Clone)]
struct FakeRenderer {
    port: u16,
    state: Arc<Mutex<RendererState>>,
}

impl FakeRenderer {
    fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let renderer = Self {
            port,
            state: Arc::new(Mutex::new(RendererState {
                transport_state: "NO_MEDIA_PRESENT".to_string(),
                ..RendererState::default()
            })),
        };

        let server = renderer.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let server = server.clone();
                thread::spawn(move || server.serve(stream));
            }
        });
        renderer
    }

    fn control_url(&self) -> String {
        format!("http://127.0.0.1:{}/AVTransport/control", self.port)
    }

    fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    fn set_transport_state(&self, state: &str) {
        self.state.lock().unwrap().transport_state = state.to_string();
    }

    fn fail_on(&self, action: &'static str) {
        self.state.lock().unwrap().failing_action = Some(action);
    }

    fn serve(&self, stream: TcpStream) {
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);

        loop {
            let mut request_line = String::new();
            if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
                return;
            }

            let mut content_length = 0;
            let mut soap_action = String::new();
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).unwrap_or(0) == 0 {
                    return;
                }
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    match name.trim().to_ascii_lowercase().as_str() {
                        "content-length" => content_length = value.trim().parse().unwrap(),
                        "soapaction" => soap_action = value.trim().trim_matches('"').to_string(),
                        _ => {}
                    }
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            let body = String::from_utf8(body).unwrap();

            let action = soap_action
                .rsplit_once('#')
                .map(|(_, action)| action.to_string())
                .unwrap_or_default();
            let (status, envelope) = self.handle(&action, &body);

            let reply = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: text/xml; charset=\"utf-8\"\r\n\
                 Content-Length: {}\r\n\r\n{envelope}",
                if status == 200 { "OK" } else { "Internal Server Error" },
                envelope.len()
            );
            if writer.write_all(reply.as_bytes()).is_err() {
                return;
            }
        }
    }

    fn handle(&self, action: &str, body: &str) -> (u16, String) {
        let mut state = self.state.lock().unwrap();
        state.actions.push(action.to_string());

        if state.failing_action.is_some_and(|failing| failing == action) {
            return (500, fault(701, "Transition not available"));
        }

        let content = match action {
            "GetMediaInfo" => format!(
                "<NrTracks>1</NrTracks><MediaDuration>0:03:45</MediaDuration>\
                 <CurrentURI>{}</CurrentURI><CurrentURIMetaData></CurrentURIMetaData>",
                state.current_uri
            ),
            "GetTransportInfo" => format!(
                "<CurrentTransportState>{}</CurrentTransportState>\
                 <CurrentTransportStatus>OK</CurrentTransportStatus><CurrentSpeed>1</CurrentSpeed>",
                state.transport_state
            ),
            "GetPositionInfo" => format!(
                "<Track>1</Track><TrackDuration>0:03:45</TrackDuration>\
                 <TrackURI>{}</TrackURI><RelTime>0:01:02</RelTime>",
                state.current_uri
            ),
            "SetAVTransportURI" => {
                state.current_uri = between(body, "<CurrentURI>", "</CurrentURI>");
                state.transport_state = "STOPPED".to_string();
                String::new()
            }
            "Play" => {
                state.transport_state = "PLAYING".to_string();
                String::new()
            }
            "Pause" => {
                state.transport_state = "PAUSED_PLAYBACK".to_string();
                String::new()
            }
            "Stop" => {
                state.transport_state = "STOPPED".to_string();
                String::new()
            }
            _ => return (500, fault(401, "Invalid Action")),
        };

        (
            200,
            envelope(&format!(
                r#"<u:{action}Response xmlns:u="{SERVICE}">{content}</u:{action}Response>"#
            )),
        )
    }
}

fn between(text: &str, start: &str, end: &str) -> String {
    text.split_once(start)
        .and_then(|(_, rest)| rest.split_once(end))
        .map(|(value, _)| value.to_string())
        .unwrap_or_default()
}

fn envelope(inner: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0"?><s:Envelope "#,
            r#"xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
            "<s:Body>{inner}</s:Body></s:Envelope>"
        ),
        inner = inner
    )
}

fn fault(code: u32, description: &str) -> String {
    envelope(&format!(
        "<s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>\
         <detail><UPnPError xmlns=\"urn:schemas-upnp-org:control-1-0\">\
         <errorCode>{code}</errorCode><errorDescription>{description}</errorDescription>\
         </UPnPError></detail></s:Fault>"
    ))
}

fn setup() -> (FakeRenderer, StreamingService, Receiver<StreamingEvent>, DeviceId) {
    let renderer = FakeRenderer::start();
    let service = StreamingService::start(StreamingConfig {
        status_update_delay_seconds: 0,
        airplay_enabled: false,
        upnp_http_timeout: Duration::from_secs(2),
        ..StreamingConfig::default()
    })
    .unwrap();
    let events = service.events().subscribe();
    let id = DeviceId::new("uuid:5f9ec1b3-ed59-79bb-4530-745e1d0c3c5a");
    service.manager().add_device(service.upnp_device(
        id.clone(),
        "Living room",
        "127.0.0.1",
        &renderer.control_url(),
        vec!["audio/flac".to_string()],
    ));
    (renderer, service, events, id)
}

fn next_event(rx: &Receiver<StreamingEvent>) -> StreamingEvent {
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

fn wait_for_status(service: &StreamingService, id: &DeviceId, status: SessionStatus) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while service.manager().get_session(id).unwrap().status != status {
        assert!(Instant::now() < deadline, "session never reached {status:?}");
        thread::sleep(Duration::from_millis(20));
    }
}

fn track() -> ContentMetadata {
    ContentMetadata::new("42", "7", "Blue in Green", "audio/flac").with_size(31_457_280)
}

#[test]
fn play_then_progress_then_renderer_stops() {
    let (renderer, service, events, id) = setup();
    let url = "http://127.0.0.1:8080/content/42.flac";

    service.manager().play(&id, url, &track()).unwrap();
    assert_eq!(next_event(&events), StreamingEvent::success(StreamingEventType::Play, id.clone()));
    assert_eq!(renderer.actions(), vec!["GetMediaInfo", "SetAVTransportURI", "Play"]);
    wait_for_status(&service, &id, SessionStatus::Playing);

    poll_playing_sessions(service.manager());
    assert_eq!(next_event(&events), StreamingEvent::status(id.clone(), 225, 62));

    renderer.set_transport_state("STOPPED");
    poll_playing_sessions(service.manager());
    assert_eq!(next_event(&events), StreamingEvent::success(StreamingEventType::Stop, id.clone()));
    wait_for_status(&service, &id, SessionStatus::Waiting);

    let session = service.manager().get_session(&id).unwrap();
    assert_eq!(session.content_url, url);
    assert_eq!(session.content_name, "Blue in Green");
    assert_eq!((session.duration, session.position), (225, 62));
}

#[test]
fn replaying_loaded_content_only_sends_play() {
    let (renderer, service, events, id) = setup();
    let url = "http://127.0.0.1:8080/content/42.flac";

    service.manager().play(&id, url, &track()).unwrap();
    assert!(next_event(&events).is_success());
    service.manager().pause(&id).unwrap();
    assert_eq!(next_event(&events).kind, StreamingEventType::Pause);

    service.manager().play(&id, url, &track()).unwrap();
    assert!(next_event(&events).is_success());

    assert_eq!(
        renderer.actions(),
        vec!["GetMediaInfo", "SetAVTransportURI", "Play", "Pause", "GetMediaInfo", "Play"]
    );
}

#[test]
fn upnp_fault_becomes_a_failure_event() {
    let (renderer, service, events, id) = setup();
    renderer.fail_on("SetAVTransportURI");

    service
        .manager()
        .play(&id, "http://127.0.0.1:8080/content/42.flac", &track())
        .unwrap();

    let event = next_event(&events);
    assert_eq!(event.kind, StreamingEventType::Play);
    match event.outcome {
        EventOutcome::Failure { message } => assert!(message.contains("701"), "{message}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        service.manager().get_session(&id).unwrap().status,
        SessionStatus::Waiting
    );
}
