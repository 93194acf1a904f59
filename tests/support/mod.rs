//! Simulated unit for integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use rinnai_touch::{FrameCodec, RinnaiClient, RinnaiClientBuilder};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

pub fn heat_status() -> Value {
    json!([
        {"SYST": {
            "CFG": {"TU": "C", "MTSP": "N", "ZA": "Living    ", "ZB": "Bedrooms  "},
            "AVM": {"HG": "Y", "CG": "Y", "EC": "N"},
            "OSS": {"MD": "H"}
        }},
        {"HGOM": {
            "CFG": {"ZAIS": "Y", "ZBIS": "Y", "ZCIS": "N", "ZDIS": "N"},
            "OOP": {"ST": "F", "FL": "08"},
            "GSO": {"OP": "M", "SP": "20", "AO": "N"},
            "ZAO": {"UE": "Y"},
            "ZAS": {"MT": "215", "AE": "N"}
        }}
    ])
}

pub fn evap_status() -> Value {
    json!([
        {"SYST": {"CFG": {"TU": "C", "MTSP": "N"}, "OSS": {"MD": "E"}}},
        {"ECOM": {
            "CFG": {"ZAIS": "N"},
            "GSO": {"SW": "N", "OP": "M", "SP": "25", "PS": "F", "FL": "05"},
            "GSS": {"MT": "243", "BY": "N"}
        }}
    ])
}

#[derive(Clone)]
pub struct UnitOptions {
    pub initial: Value,
    /// Resend the status this often without being asked.
    pub push_interval: Option<Duration>,
    /// Apply received commands to the status and answer with it.
    pub reflect_commands: bool,
}

impl Default for UnitOptions {
    fn default() -> Self {
        Self {
            initial: heat_status(),
            push_interval: None,
            reflect_commands: true,
        }
    }
}

struct UnitState {
    status: Value,
    seq: u32,
    commands: Vec<String>,
    connections: u32,
    handlers: Vec<JoinHandle<()>>,
}

pub struct FakeUnit {
    pub address: SocketAddr,
    state: Arc<Mutex<UnitState>>,
    accept: JoinHandle<()>,
}

impl FakeUnit {
    pub async fn start(options: UnitOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(UnitState {
            status: options.initial.clone(),
            seq: 0,
            commands: Vec::new(),
            connections: 0,
            handlers: Vec::new(),
        }));

        let accept_state = state.clone();
        let accept = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let handler = tokio::spawn(serve(stream, accept_state.clone(), options.clone()));
                let mut s = accept_state.lock().unwrap();
                s.connections += 1;
                s.handlers.push(handler);
            }
        });

        Self {
            address,
            state,
            accept,
        }
    }

    pub fn host(&self) -> IpAddr {
        self.address.ip()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn connections(&self) -> u32 {
        self.state.lock().unwrap().connections
    }

    pub fn status(&self) -> Value {
        self.state.lock().unwrap().status.clone()
    }

    /// Drop every open connection, as a unit reboot would.
    pub fn kick(&self) {
        for handler in self.state.lock().unwrap().handlers.drain(..) {
            handler.abort();
        }
    }

    /// A client builder pointed at this unit with test-friendly timings.
    pub fn client(&self) -> RinnaiClientBuilder {
        RinnaiClient::builder()
            .address(self.host())
            .port(self.port())
            .connect_timeout(Duration::from_secs(1))
            .settle_delay(Duration::from_millis(50))
    }
}

impl Drop for FakeUnit {
    fn drop(&mut self) {
        self.accept.abort();
        self.kick();
    }
}

async fn send_status(
    writer: &mut OwnedWriteHalf,
    state: &Arc<Mutex<UnitState>>,
) -> std::io::Result<()> {
    let frame = {
        let mut s = state.lock().unwrap();
        s.seq = (s.seq + 1) % 255;
        format!("N{:06}{}", s.seq, s.status)
    };
    writer.write_all(frame.as_bytes()).await
}

fn apply_command(status: &mut Value, body: &Value) {
    let Some((group, rest)) = body.as_object().and_then(|m| m.iter().next()) else {
        return;
    };
    let Some((section, rest)) = rest.as_object().and_then(|m| m.iter().next()) else {
        return;
    };
    let Some((command, value)) = rest.as_object().and_then(|m| m.iter().next()) else {
        return;
    };
    let slot = if group == "SYST" { 0 } else { 1 };
    status[slot][group][section][command] = value.clone();
}

async fn serve(stream: TcpStream, state: Arc<Mutex<UnitState>>, options: UnitOptions) {
    let (read_half, mut writer) = stream.into_split();
    let mut frames = FramedRead::new(read_half, FrameCodec);
    if send_status(&mut writer, &state).await.is_err() {
        return;
    }

    let push = options.push_interval;
    let mut ticker = tokio::time::interval(push.unwrap_or(Duration::from_secs(3600)));
    ticker.tick().await;

    loop {
        tokio::select! {
            frame = frames.next() => {
                let Some(Ok(frame)) = frame else { return };
                let body: Value = serde_json::from_str(&frame.body).unwrap_or(Value::Null);
                {
                    let mut s = state.lock().unwrap();
                    s.commands.push(frame.body.clone());
                    if options.reflect_commands {
                        apply_command(&mut s.status, &body);
                    }
                }
                if options.reflect_commands && send_status(&mut writer, &state).await.is_err() {
                    return;
                }
            }
            _ = ticker.tick(), if push.is_some() => {
                if send_status(&mut writer, &state).await.is_err() {
                    return;
                }
            }
        }
    }
}
