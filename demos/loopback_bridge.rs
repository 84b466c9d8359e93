//! Example: Bridging topics over an in-memory loopback transport
//!
//! The transport here echoes every sent frame back as a cloud-to-device message, which
//! is enough to watch the whole path: framing on publish, wildcard matching on receive,
//! and the pump/sleep rhythm of a delivery.
//!
//! # Key Concepts
//!
//! - Implement `IotPlatform` and `IotSession` over whatever SDK the device uses
//! - Subscribe with `+` and `#` wildcards; matching happens on the device
//! - Use the `_blocking` API when there is no async executor
//!
//! Run with `cargo run --example loopback_bridge`.

use std::collections::VecDeque;
use std::convert::Infallible;

use embassy_time::Duration;
use myrtio_iot_bridge::transport::{
    ConfirmationResult, ConnectionDescriptor, ConnectionStatus, InboundMessage, IotPlatform,
    IotSession, SendToken, SessionEvents, SessionOption, StatusReason,
};
use myrtio_iot_bridge::{BridgeClient, BridgeOptions, Topic};

const TEMPERATURE_TOPIC: &str = "sensors/kitchen/temp";
const SWITCH_TOPIC: &str = "actuators/kitchen/light";

struct LoopbackPlatform;

impl IotPlatform for LoopbackPlatform {
    type Error = Infallible;
    type Session = LoopbackSession;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn create_session(
        &mut self,
        descriptor: &ConnectionDescriptor<'_>,
    ) -> Result<Self::Session, Self::Error> {
        println!("session for {}", descriptor.connection_string);
        Ok(LoopbackSession::default())
    }
}

#[derive(Default)]
struct LoopbackSession {
    connected: bool,
    queued: VecDeque<(Vec<u8>, SendToken)>,
}

impl IotSession for LoopbackSession {
    type Error = Infallible;

    fn set_option(&mut self, _option: SessionOption) -> Result<(), Self::Error> {
        Ok(())
    }

    fn submit_send(&mut self, frame: &[u8], token: SendToken) -> Result<(), Self::Error> {
        self.queued.push_back((frame.to_vec(), token));
        Ok(())
    }

    fn pump_once(&mut self, events: &mut dyn SessionEvents) {
        if !self.connected {
            self.connected = true;
            events.on_connection_status(ConnectionStatus::Authenticated, StatusReason::Ok);
        }
        while let Some((frame, token)) = self.queued.pop_front() {
            events.on_send_confirmed(token, ConfirmationResult::Ok);
            let disposition = events.on_message(InboundMessage::bytes(&frame));
            println!("echoed {:?} -> {:?}", String::from_utf8_lossy(&frame), disposition);
        }
    }

    fn destroy(self) {
        println!("session destroyed");
    }
}

struct StdDelay;

impl embedded_hal::delay::DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(ns.into()));
    }
}

fn print_message(topic: Topic<'_>, payload: &[u8]) {
    println!("received {} bytes on {}", payload.len(), topic);
}

fn main() {
    let options = BridgeOptions::new("HostName=hub.local;DeviceId=demo;SharedAccessKey=none")
        .with_pump_interval(Duration::from_millis(200));
    let mut client = BridgeClient::<_, _, _, 4, 256>::new(
        LoopbackPlatform,
        StdDelay,
        options,
        print_message,
    );

    if let Err(e) = client.connect_blocking() {
        eprintln!("connect failed: {}", e);
        return;
    }
    for pattern in ["sensors/+/temp", "actuators/#"] {
        if let Err(e) = client.subscribe(pattern) {
            eprintln!("subscribe {} failed: {}", pattern, e);
        }
    }

    for (topic, payload) in [
        (TEMPERATURE_TOPIC, b"21.5".as_slice()),
        (SWITCH_TOPIC, b"on".as_slice()),
        ("diagnostics/uptime", b"3600".as_slice()),
    ] {
        match client.publish_blocking(topic, payload) {
            Ok(report) => println!(
                "{}: submitted {}, confirmed {}",
                topic, report.submitted, report.confirmed
            ),
            Err(e) => eprintln!("{}: {}", topic, e),
        }
    }

    client.disconnect();
}
