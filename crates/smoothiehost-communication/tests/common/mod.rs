#![allow(dead_code)]

use async_trait::async_trait;
use smoothiehost_communication::communication::BoxedTransport;
use smoothiehost_communication::{Connector, Endpoint, SmoothieLink};
use smoothiehost_core::{ConnectionError, LinkConfig, LinkEvent, LinkEvents};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

pub const ENDPOINT: &str = "net://controller:23";

/// Hands out pre-made in-memory pipes, one per connect
#[derive(Default)]
pub struct DuplexConnector {
    pending: Mutex<Vec<DuplexStream>>,
}

impl DuplexConnector {
    /// Queue a pipe and return the controller's end
    pub fn add(&self) -> DuplexStream {
        let (host, controller) = tokio::io::duplex(4096);
        self.pending.lock().unwrap().insert(0, host);
        controller
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn open(&self, endpoint: &Endpoint) -> smoothiehost_core::Result<BoxedTransport> {
        match self.pending.lock().unwrap().pop() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(ConnectionError::FailedToOpen {
                endpoint: endpoint.to_string(),
                reason: "no controller".to_string(),
            }
            .into()),
        }
    }
}

/// Link config without polling
pub fn quiet_config() -> LinkConfig {
    let mut config = LinkConfig::default();
    config.polling.interval_ms = 0;
    config
}

pub fn new_link(config: LinkConfig) -> (SmoothieLink, LinkEvents, Arc<DuplexConnector>) {
    let connector = Arc::new(DuplexConnector::default());
    let (link, events) = SmoothieLink::with_connector(config, connector.clone());
    (link, events, connector)
}

/// Reply the way a Smoothieboard does to the commands the tests send
pub fn smoothie_reply(line: &str) -> String {
    match line {
        "version" => "Build version: edge-94de12c, Build date: Oct 28 2014 13:24:47, MCU: LPC1769, System Clock: 100MHz\n".to_string(),
        "?" => "<Idle,MPos:0.0000,0.0000,0.0000,WPos:0.0000,0.0000,0.0000>\n".to_string(),
        "M105" => "ok T:21.0 /0.0 @0 B:20.5 /0.0 @0\n".to_string(),
        "M20" => "Begin file list\njob.nc\nconfig\nEnd file list\nok\n".to_string(),
        l if l.starts_with("M28 ") => format!("Writing to file: /sd/{}\nok\n", &l[4..]),
        "M29" => "Done saving file.\nok\n".to_string(),
        _ => "ok\n".to_string(),
    }
}

/// Run a fake controller on `stream`, forwarding every received line
///
/// With `reply` set to `None` the controller never answers.
pub fn spawn_controller(
    stream: DuplexStream,
    reply: Option<fn(&str) -> String>,
) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx.send(line.clone());
            if let Some(reply) = reply {
                if writer.write_all(reply(&line).as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    });
    rx
}

/// Controller whose replies are written by the test
pub struct ManualController {
    pub lines: mpsc::UnboundedReceiver<String>,
    replies: mpsc::UnboundedSender<String>,
}

impl ManualController {
    pub fn reply(&self, text: &str) {
        self.replies.send(text.to_string()).unwrap();
    }
}

pub fn spawn_manual_controller(stream: DuplexStream) -> ManualController {
    let (line_tx, lines) = mpsc::unbounded_channel();
    let (replies, mut reply_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut input = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                line = input.next_line() => match line {
                    Ok(Some(line)) => {
                        let _ = line_tx.send(line);
                    }
                    _ => break,
                },
                Some(text) = reply_rx.recv() => {
                    if writer.write_all(text.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    ManualController { lines, replies }
}

/// Wait for the first event matching `pred`, skipping others
pub async fn wait_for(events: &mut LinkEvents, pred: impl Fn(&LinkEvent) -> bool) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for link event")
}

/// Collect every event up to and including the first matching `pred`
pub async fn collect_until(
    events: &mut LinkEvents,
    pred: impl Fn(&LinkEvent) -> bool,
) -> Vec<LinkEvent> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut seen = Vec::new();
        loop {
            match events.recv().await {
                Some(event) => {
                    let done = pred(&event);
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for link event")
}

/// Next line the controller received
pub async fn received(lines: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), lines.recv())
        .await
        .expect("timed out waiting for controller input")
        .expect("controller stopped")
}

/// Connect and wait until the controller has identified itself
pub async fn connect_ready(
    link: &SmoothieLink,
    events: &mut LinkEvents,
    connector: &DuplexConnector,
) -> mpsc::UnboundedReceiver<String> {
    let mut lines = spawn_controller(connector.add(), Some(smoothie_reply));
    link.connect(ENDPOINT).unwrap();
    wait_for(events, |e| matches!(e, LinkEvent::Connected(_))).await;
    assert_eq!(received(&mut lines).await, "version");
    wait_for(events, |e| matches!(e, LinkEvent::Log(l) if l.starts_with("Build version"))).await;
    lines
}
