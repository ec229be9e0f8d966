use std::env;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use pmostreaming::airplay::DEFAULT_AIRPLAY_PORT;
use pmostreaming::{ContentMetadata, DeviceId, SessionStatus, StreamingConfig, StreamingService};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (host, port, url) = match args.as_slice() {
        [host, url] => (host.clone(), DEFAULT_AIRPLAY_PORT, url.clone()),
        [host, port, url] => (
            host.clone(),
            port.parse::<u16>().context("invalid port")?,
            url.clone(),
        ),
        _ => bail!("usage: airplay_play <host> [port] <media-url>"),
    };

    let config = StreamingConfig::from_global_config()?;
    let service = StreamingService::start(config)?;
    let manager = service.manager();

    let id = DeviceId::new(format!("airplay:{host}:{port}"));
    manager.add_device(service.airplay_device(id.clone(), &host, &host, port, None));

    let metadata = ContentMetadata::new("demo", "0", &url, "video/mp4");
    manager.play(&id, &url, &metadata)?;
    println!("Playing {url} on {host}:{port}, Ctrl-C to quit");

    let mut started = false;
    loop {
        thread::sleep(Duration::from_secs(1));
        let session = manager.get_session(&id)?;
        println!(
            "  {:?} {}/{}s",
            session.status, session.position, session.duration
        );
        match session.status {
            SessionStatus::Playing | SessionStatus::Paused => started = true,
            SessionStatus::Waiting if started => break,
            SessionStatus::Waiting => {}
        }
    }

    println!("Playback finished");
    service.shutdown();
    Ok(())
}
