//! Persistent TCP connection to the simulator.
//!
//! State lives behind one mutex shared by the caller, the connect thread and
//! the response reader thread. Every transition is published while the lock
//! is held, so observers see transitions in the order they happened. A
//! generation counter lets background threads notice that the connection
//! they were serving has been replaced or torn down.

use log::{debug, error, info, warn};
use std::fmt;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::protocol::{encode_heartbeat, encode_shot, OutboundShot, SimulatorResponse};
use crate::config::SimulatorConfig;
use crate::error::RecorderError;
use crate::pipeline::EventBus;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Last attempt or connection failed. Counts as disconnected.
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

struct LinkInner {
    state: ConnectionState,
    stream: Option<TcpStream>,
    generation: u64,
    last_response: Option<SimulatorResponse>,
}

struct Shared {
    inner: Mutex<LinkInner>,
    events: Arc<EventBus<ConnectionState>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `state` and notifies, skipping no-op transitions.
    fn transition(&self, inner: &mut LinkInner, state: ConnectionState) {
        if inner.state == state {
            return;
        }
        info!("Simulator link: {} -> {}", inner.state, state);
        inner.state = state.clone();
        self.events.publish(state);
    }

    /// Drops the stream of the current generation after a failure.
    fn fail(&self, inner: &mut LinkInner, state: ConnectionState) {
        if let Some(stream) = inner.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        inner.generation += 1;
        self.transition(inner, state);
    }
}

/// Client side of the simulator connection.
pub struct SimulatorLink {
    config: SimulatorConfig,
    shared: Arc<Shared>,
}

impl SimulatorLink {
    /// Transitions are published on `events`.
    pub fn new(config: SimulatorConfig, events: Arc<EventBus<ConnectionState>>) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                inner: Mutex::new(LinkInner {
                    state: ConnectionState::Disconnected,
                    stream: None,
                    generation: 0,
                    last_response: None,
                }),
                events,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state.clone()
    }

    /// Most recent reply from the simulator on the current connection.
    pub fn last_response(&self) -> Option<SimulatorResponse> {
        self.shared.lock().last_response.clone()
    }

    /// Connects to the configured address.
    pub fn connect_configured(&self) -> bool {
        let (ip, port) = (self.config.ip.clone(), self.config.port);
        self.connect(&ip, port)
    }

    /// Starts a connection attempt in the background.
    ///
    /// Returns false without doing anything while connecting or connected.
    pub fn connect(&self, ip: &str, port: u16) -> bool {
        let generation = {
            let mut inner = self.shared.lock();
            if matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!("Connect ignored, link is {}", inner.state);
                return false;
            }
            inner.generation += 1;
            inner.last_response = None;
            self.shared.transition(&mut inner, ConnectionState::Connecting);
            inner.generation
        };

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let address = format!("{}:{}", ip, port);
        thread::spawn(move || run_connect(shared, config, address, generation));
        true
    }

    /// Tears the connection down. Safe to call in any state.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if let Some(stream) = inner.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared
            .transition(&mut inner, ConnectionState::Disconnected);
    }

    /// Writes one shot message.
    ///
    /// Requires `Connected`. A failed write drops the connection and is
    /// reported, not retried.
    pub fn send_shot(&self, shot: &OutboundShot) -> Result<(), RecorderError> {
        let line = encode_shot(&self.config.device_id, shot)?;

        let mut inner = self.shared.lock();
        if !inner.state.is_connected() {
            return Err(RecorderError::NotConnected);
        }
        let Some(stream) = inner.stream.as_mut() else {
            return Err(RecorderError::NotConnected);
        };

        match stream.write_all(line.as_bytes()).and_then(|_| stream.flush()) {
            Ok(()) => {
                debug!("Sent shot {} ({} bytes)", shot.shot_number, line.len());
                Ok(())
            }
            Err(e) => {
                error!("Sending shot {} failed: {}", shot.shot_number, e);
                self.shared
                    .fail(&mut inner, ConnectionState::Error(format!("write failed: {}", e)));
                Err(RecorderError::ConnectionIo { source: e })
            }
        }
    }
}

impl Drop for SimulatorLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn resolve(address: &str) -> Result<SocketAddr, String> {
    address
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| "address did not resolve".to_string())
}

/// Opens the stream and sends the heartbeat handshake.
fn open_stream(config: &SimulatorConfig, address: &str) -> Result<TcpStream, String> {
    let addr = resolve(address)?;
    let timeout = Duration::from_millis(config.handshake_timeout_ms.max(1));
    let mut stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| e.to_string())?;

    stream
        .set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms.max(1))))
        .map_err(|e| e.to_string())?;
    let _ = stream.set_nodelay(true);

    let heartbeat = encode_heartbeat(&config.device_id).map_err(|e| e.to_string())?;
    stream
        .write_all(heartbeat.as_bytes())
        .map_err(|e| format!("handshake failed: {}", e))?;
    Ok(stream)
}

fn run_connect(shared: Arc<Shared>, config: SimulatorConfig, address: String, generation: u64) {
    info!("Connecting to simulator at {}", address);
    let result = open_stream(&config, &address);

    let mut inner = shared.lock();
    if inner.generation != generation {
        debug!("Connect attempt to {} superseded", address);
        if let Ok(stream) = result {
            let _ = stream.shutdown(Shutdown::Both);
        }
        return;
    }

    let stream = match result {
        Ok(stream) => stream,
        Err(reason) => {
            warn!("Could not connect to simulator at {}: {}", address, reason);
            let failure = RecorderError::ConnectFailed {
                address: address.clone(),
                description: reason,
            };
            shared.fail(&mut inner, ConnectionState::Error(failure.to_string()));
            return;
        }
    };

    let reader = match stream.try_clone() {
        Ok(reader) => reader,
        Err(e) => {
            shared.fail(&mut inner, ConnectionState::Error(e.to_string()));
            return;
        }
    };
    inner.stream = Some(stream);
    shared.transition(&mut inner, ConnectionState::Connected);
    drop(inner);

    thread::spawn(move || read_responses(shared, reader, generation));
}

/// Reads simulator replies until the stream ends.
fn read_responses(shared: Arc<Shared>, stream: TcpStream, generation: u64) {
    let responses = serde_json::Deserializer::from_reader(BufReader::new(stream))
        .into_iter::<SimulatorResponse>();

    let mut end_state = ConnectionState::Disconnected;
    for response in responses {
        match response {
            Ok(response) => {
                if response.is_error() {
                    warn!("Simulator replied {}: {}", response.code, response.message);
                } else {
                    info!("Simulator replied {}: {}", response.code, response.message);
                }
                let mut inner = shared.lock();
                if inner.generation != generation {
                    return;
                }
                inner.last_response = Some(response);
            }
            Err(e) if e.is_io() => {
                end_state = ConnectionState::Error(format!("read failed: {}", e));
                break;
            }
            Err(e) if e.is_eof() => break,
            Err(e) => {
                // The stream cannot resync after malformed JSON; keep the
                // connection for sending.
                warn!("Unreadable simulator reply, ignoring further replies: {}", e);
                return;
            }
        }
    }

    let mut inner = shared.lock();
    if inner.generation == generation {
        info!("Simulator connection closed");
        shared.fail(&mut inner, end_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shots::BallData;
    use serde_json::Value;
    use std::io::{BufRead, BufReader as StdBufReader};
    use std::net::TcpListener;
    use std::sync::mpsc::Receiver;

    const WAIT: Duration = Duration::from_secs(5);

    fn link() -> (SimulatorLink, Receiver<ConnectionState>) {
        let events = Arc::new(EventBus::new());
        let states = events.subscribe();
        (SimulatorLink::new(SimulatorConfig::default(), events), states)
    }

    fn wait_for(
        states: &Receiver<ConnectionState>,
        wanted: fn(&ConnectionState) -> bool,
    ) -> ConnectionState {
        loop {
            let state = states.recv_timeout(WAIT).expect("no state change");
            if wanted(&state) {
                return state;
            }
        }
    }

    fn shot(number: u32) -> OutboundShot {
        OutboundShot {
            shot_number: number,
            ball: Some(BallData {
                speed: Some(150.0),
                carry_distance: Some(240.0),
                ..BallData::default()
            }),
            ..OutboundShot::default()
        }
    }

    fn read_json(reader: &mut impl BufRead) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn test_connect_handshake_and_send() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = StdBufReader::new(stream);
            let heartbeat = read_json(&mut reader);
            writer
                .write_all(br#"{"Code":201,"Message":"GSPro Player Information","Player":{"Handed":"RH","Club":"DR"}}"#)
                .unwrap();
            let shot = read_json(&mut reader);
            (heartbeat, shot)
        });

        let (link, states) = link();
        assert!(link.connect("127.0.0.1", port));
        assert_eq!(states.recv_timeout(WAIT).unwrap(), ConnectionState::Connecting);
        assert_eq!(states.recv_timeout(WAIT).unwrap(), ConnectionState::Connected);
        assert!(!link.connect("127.0.0.1", port));

        link.send_shot(&shot(1)).unwrap();
        let (heartbeat, sent) = server.join().unwrap();

        assert_eq!(heartbeat["ShotDataOptions"]["IsHeartBeat"], true);
        assert_eq!(sent["ShotNumber"], 1);
        assert_eq!(sent["BallData"]["Speed"], 150.0);

        for _ in 0..100 {
            if link.last_response().is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(link.last_response().unwrap().code, 201);
    }

    #[test]
    fn test_closed_connection_rejects_sends() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = StdBufReader::new(stream);
            read_json(&mut reader);
        });

        let (link, states) = link();
        link.connect("127.0.0.1", port);
        wait_for(&states, ConnectionState::is_connected);
        server.join().unwrap();

        let state = wait_for(&states, |s| !s.is_connected());
        assert!(matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Error(_)
        ));
        assert!(matches!(
            link.send_shot(&shot(2)),
            Err(RecorderError::NotConnected)
        ));
    }

    #[test]
    fn test_refused_connection_reports_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (link, states) = link();
        link.connect("127.0.0.1", port);
        let state = wait_for(&states, |s| matches!(s, ConnectionState::Error(_)));
        assert!(state.to_string().contains("Could not connect"));

        // Error counts as disconnected, so a new attempt is allowed
        assert!(link.connect("127.0.0.1", port));
    }

    #[test]
    fn test_send_before_connect_is_rejected() {
        let (link, _states) = link();
        assert!(matches!(
            link.send_shot(&shot(1)),
            Err(RecorderError::NotConnected)
        ));
    }

    #[test]
    fn test_empty_shot_refused_without_touching_link() {
        let (link, states) = link();
        let err = link.send_shot(&OutboundShot::default()).unwrap_err();
        assert!(matches!(err, RecorderError::EmptyShot { .. }));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(states.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = StdBufReader::new(stream);
            read_json(&mut reader);
            let mut rest = String::new();
            let _ = reader.read_line(&mut rest);
        });

        let (link, states) = link();
        link.disconnect();
        assert!(states.try_recv().is_err());

        link.connect("127.0.0.1", port);
        wait_for(&states, ConnectionState::is_connected);

        link.disconnect();
        link.disconnect();
        assert_eq!(states.recv_timeout(WAIT).unwrap(), ConnectionState::Disconnected);
        assert_eq!(link.state(), ConnectionState::Disconnected);

        server.join().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(states.try_recv().is_err());
    }
}
