use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use pmostreaming::scheduler::poll_playing_sessions;
use pmostreaming::{
    AirplayCommand, AsyncControlPoint, ContentMetadata, ControlPoint, Device, DeviceId,
    EventOutcome, SessionStatus, StreamingConfig, StreamingError, StreamingEvent,
    StreamingEventType, StreamingService, SyncControlPoint,
};

/// Reply of the fake receiver: status code and optional `text/parameters` body.
type Responder = fn(&str) -> (u16, Option<&'static str>);

/// Minimal AirPlay receiver on the loopback interface.
///
/// Every connection is kept open and served request after request, as a real
/// receiver does with the control socket.
struct FakeReceiver {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<usize>>,
}

impl FakeReceiver {
    fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));

        let seen = Arc::clone(&requests);
        let accepted = Arc::clone(&connections);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                *accepted.lock().unwrap() += 1;
                let seen = Arc::clone(&seen);
                thread::spawn(move || serve(stream, responder, seen));
            }
        });

        Self {
            port,
            requests,
            connections,
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }

    fn wait_for(&self, request: &str) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.requests().iter().any(|r| r == request) {
            assert!(Instant::now() < deadline, "receiver never got {request}");
            thread::sleep(Duration::from_millis(20));
        }
    }
}

fn serve(stream: TcpStream, responder: Responder, seen: Arc<Mutex<Vec<String>>>) {
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
            return;
        }
        let request_line = request_line.trim_end().to_string();
        if request_line.is_empty() {
            continue;
        }

        let mut content_length = 0;
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).unwrap_or(0) == 0 {
                return;
            }
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some(value) = header.strip_prefix("Content-Length:") {
                content_length = value.trim().parse().unwrap();
            }
        }
        if content_length > 0 {
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            let mut terminator = String::new();
            reader.read_line(&mut terminator).unwrap();
        }

        let target = request_line
            .rsplit_once(' ')
            .map(|(target, _)| target.to_string())
            .unwrap_or_default();
        seen.lock().unwrap().push(target.clone());

        let (code, body) = responder(&target);
        let reason = if code == 200 { "OK" } else { "Not Found" };
        let mut reply = format!("HTTP/1.1 {code} {reason}\r\n");
        match body {
            Some(body) => {
                reply.push_str("Content-Type: text/parameters\r\n");
                reply.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
            }
            None => reply.push_str("Content-Length: 0\r\n\r\n"),
        }
        if writer.write_all(reply.as_bytes()).is_err() {
            return;
        }
    }
}

fn finished_track(target: &str) -> (u16, Option<&'static str>) {
    if target == "GET /scrub" {
        (200, Some("duration: 10.000000\nposition: 10.000000\n"))
    } else {
        (200, None)
    }
}

fn no_rate(target: &str) -> (u16, Option<&'static str>) {
    if target.starts_with("POST /rate") {
        (404, None)
    } else {
        (200, None)
    }
}

fn device(port: u16) -> Arc<Device> {
    Arc::new(Device::airplay(
        DeviceId::new("apple-tv"),
        "Apple TV",
        "127.0.0.1",
        port,
        Some("0x5A7FFFF7,0x1E"),
        Duration::from_secs(2),
    ))
}

fn quiet_service() -> StreamingService {
    StreamingService::start(StreamingConfig {
        status_update_delay_seconds: 0,
        upnp_enabled: false,
        ..StreamingConfig::default()
    })
    .unwrap()
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

#[test]
fn sync_control_point_reuses_the_control_socket() {
    let receiver = FakeReceiver::start(finished_track);
    let device = device(receiver.port);
    let control_point = SyncControlPoint::new();
    let (tx, rx) = unbounded();

    for command in [
        AirplayCommand::play("http://server/movie.mp4", 0.0),
        AirplayCommand::Status,
    ] {
        let tx = tx.clone();
        control_point.execute(
            Arc::clone(&device),
            command,
            Box::new(move |result| tx.send(result).unwrap()),
        );
    }

    let play = rx.recv().unwrap().unwrap();
    assert_eq!(play.code(), 200);
    let status = rx.recv().unwrap().unwrap();
    assert_eq!(status.seconds_parameter("duration"), 10);
    assert_eq!(status.seconds_parameter("position"), 10);

    assert_eq!(receiver.requests(), vec!["POST /play", "GET /scrub"]);
    assert_eq!(receiver.connections(), 1);
}

#[test]
fn async_control_point_reports_rejections() {
    let receiver = FakeReceiver::start(no_rate);
    let control_point = AsyncControlPoint::new(2).unwrap();
    let (tx, rx) = unbounded();

    control_point.execute(
        device(receiver.port),
        AirplayCommand::rate(0.0),
        Box::new(move |result| tx.send(result).unwrap()),
    );

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(result, Err(StreamingError::CommandRejected { code: 404, .. })));
    assert_eq!(receiver.requests(), vec!["POST /rate?value=0.0"]);
}

#[test]
fn finished_track_is_stopped_after_status_poll() {
    let receiver = FakeReceiver::start(finished_track);
    let service = quiet_service();
    let events = service.events().subscribe();
    let id = DeviceId::new("apple-tv");
    service.manager().add_device(service.airplay_device(
        id.clone(),
        "Apple TV",
        "127.0.0.1",
        receiver.port,
        None,
    ));

    let metadata = ContentMetadata::new("42", "7", "Movie", "video/mp4");
    service.manager().play(&id, "http://server/movie.mp4", &metadata).unwrap();
    assert_eq!(next_event(&events), StreamingEvent::success(StreamingEventType::Play, id.clone()));
    wait_for_status(&service, &id, SessionStatus::Playing);

    poll_playing_sessions(service.manager());

    assert_eq!(next_event(&events), StreamingEvent::status(id.clone(), 10, 10));
    assert_eq!(next_event(&events), StreamingEvent::success(StreamingEventType::Stop, id.clone()));
    receiver.wait_for("POST /stop");
    wait_for_status(&service, &id, SessionStatus::Waiting);

    let session = service.manager().get_session(&id).unwrap();
    assert_eq!(session.content_name, "Movie");
    assert_eq!(session.duration, 10);
}

#[test]
fn pause_rejected_by_receiver_keeps_session_playing() {
    let receiver = FakeReceiver::start(no_rate);
    let service = quiet_service();
    let events = service.events().subscribe();
    let id = DeviceId::new("apple-tv");
    service.manager().add_device(service.airplay_device(
        id.clone(),
        "Apple TV",
        "127.0.0.1",
        receiver.port,
        None,
    ));

    service
        .manager()
        .play(&id, "http://server/movie.mp4", &ContentMetadata::default())
        .unwrap();
    assert!(next_event(&events).is_success());
    wait_for_status(&service, &id, SessionStatus::Playing);

    service.manager().pause(&id).unwrap();

    let event = next_event(&events);
    assert_eq!(event.kind, StreamingEventType::Pause);
    assert!(matches!(event.outcome, EventOutcome::Failure { .. }));
    assert_eq!(
        service.manager().get_session(&id).unwrap().status,
        SessionStatus::Playing
    );
}

#[test]
fn unreachable_receiver_fails_play() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let service = quiet_service();
    let events = service.events().subscribe();
    let id = DeviceId::new("apple-tv");
    service.manager().add_device(service.airplay_device(
        id.clone(),
        "Apple TV",
        "127.0.0.1",
        port,
        None,
    ));

    service
        .manager()
        .play(&id, "http://server/movie.mp4", &ContentMetadata::default())
        .unwrap();

    let event = next_event(&events);
    assert_eq!(event.kind, StreamingEventType::Play);
    assert!(!event.is_success());
    assert_eq!(
        service.manager().get_session(&id).unwrap().status,
        SessionStatus::Waiting
    );
}
