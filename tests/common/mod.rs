//! Scripted transport and delay provider shared by the integration tests.
//!
//! The platform, its sessions and the delay all write into one [`MockState`], so a test
//! can move them into a client and still inspect what happened afterwards.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use myrtio_iot_bridge::CancelToken;
use myrtio_iot_bridge::Topic;
use myrtio_iot_bridge::delivery::ReceiveHandler;
use myrtio_iot_bridge::transport::{
    ConfirmationResult, ConnectionDescriptor, ConnectionStatus, ContentKind, Disposition,
    InboundMessage, IotPlatform, IotSession, SendToken, SessionEvents, SessionOption,
    StatusReason,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    InitFailed,
    CreateFailed,
    OptionRejected,
    SubmitRejected,
}

#[derive(Default)]
pub struct MockState {
    // Script
    pub fail_init: bool,
    pub fail_create: bool,
    pub fail_option: bool,
    pub fail_submit: bool,
    /// Result reported for every submitted send on the next pump.
    pub confirm_with: Option<ConfirmationResult>,
    /// Feed every submitted frame back as an inbound message on the next pump.
    pub loopback: bool,
    /// Report an authenticated connection on the first pump.
    pub announce_connection: bool,
    /// Cancel this token once the given number of pumps has run.
    pub cancel_after: Option<(usize, &'static CancelToken)>,
    pub inbound: VecDeque<(ContentKind, Vec<u8>)>,
    pub methods: VecDeque<String>,

    // Observations
    pub initialized: usize,
    pub shutdowns: usize,
    pub sessions_created: usize,
    pub destroyed: usize,
    pub connection_string: Option<String>,
    pub options: Vec<SessionOption>,
    pub submitted: Vec<(Vec<u8>, SendToken)>,
    pub pending_confirmations: Vec<SendToken>,
    pub pumps: usize,
    pub dispositions: Vec<Disposition>,
    pub method_statuses: Vec<i32>,
    pub delays_ms: Vec<u32>,
}

pub type SharedState = Rc<RefCell<MockState>>;

pub fn shared_state() -> SharedState {
    Rc::new(RefCell::new(MockState::default()))
}

pub struct MockPlatform {
    pub state: SharedState,
}

impl MockPlatform {
    pub fn new(state: &SharedState) -> Self {
        Self {
            state: Rc::clone(state),
        }
    }
}

impl IotPlatform for MockPlatform {
    type Error = MockError;
    type Session = MockSession;

    fn initialize(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_init {
            return Err(MockError::InitFailed);
        }
        state.initialized += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.state.borrow_mut().shutdowns += 1;
    }

    fn create_session(
        &mut self,
        descriptor: &ConnectionDescriptor<'_>,
    ) -> Result<Self::Session, Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_create {
            return Err(MockError::CreateFailed);
        }
        state.sessions_created += 1;
        state.connection_string = Some(descriptor.connection_string.to_string());
        Ok(MockSession {
            state: Rc::clone(&self.state),
        })
    }
}

pub struct MockSession {
    state: SharedState,
}

impl IotSession for MockSession {
    type Error = MockError;

    fn set_option(&mut self, option: SessionOption) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_option {
            return Err(MockError::OptionRejected);
        }
        state.options.push(option);
        Ok(())
    }

    fn submit_send(&mut self, frame: &[u8], token: SendToken) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_submit {
            return Err(MockError::SubmitRejected);
        }
        state.submitted.push((frame.to_vec(), token));
        if state.confirm_with.is_some() {
            state.pending_confirmations.push(token);
        }
        if state.loopback {
            state
                .inbound
                .push_back((ContentKind::ByteArray, frame.to_vec()));
        }
        Ok(())
    }

    fn pump_once(&mut self, events: &mut dyn SessionEvents) {
        // Take the script out first; the handler must not see the state borrowed.
        let (announce, confirmations, result, inbound, methods, cancel) = {
            let mut state = self.state.borrow_mut();
            state.pumps += 1;
            let announce = state.announce_connection && state.pumps == 1;
            let cancel = match state.cancel_after {
                Some((after, token)) if state.pumps >= after => Some(token),
                _ => None,
            };
            (
                announce,
                std::mem::take(&mut state.pending_confirmations),
                state.confirm_with,
                std::mem::take(&mut state.inbound),
                std::mem::take(&mut state.methods),
                cancel,
            )
        };

        if announce {
            events.on_connection_status(ConnectionStatus::Authenticated, StatusReason::Ok);
        }
        if let Some(result) = result {
            for token in confirmations {
                events.on_send_confirmed(token, result);
            }
        }
        for (kind, body) in inbound {
            let disposition = events.on_message(InboundMessage { kind, body: &body });
            self.state.borrow_mut().dispositions.push(disposition);
        }
        for method in methods {
            let status = events.on_method(&method, b"{}");
            self.state.borrow_mut().method_statuses.push(status);
        }
        if let Some(token) = cancel {
            token.cancel();
        }
    }

    fn destroy(self) {
        self.state.borrow_mut().destroyed += 1;
    }
}

/// Records every sleep instead of sleeping.
pub struct MockDelay {
    state: SharedState,
}

impl MockDelay {
    pub fn new(state: &SharedState) -> Self {
        Self {
            state: Rc::clone(state),
        }
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().delays_ms.push(ns / 1_000_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().delays_ms.push(ms);
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().delays_ms.push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().delays_ms.push(ms);
    }
}

/// Records the sleep, then never wakes. Only a cancel token can end a delivery using it.
pub struct StalledDelay {
    state: SharedState,
}

impl StalledDelay {
    pub fn new(state: &SharedState) -> Self {
        Self {
            state: Rc::clone(state),
        }
    }
}

impl embedded_hal_async::delay::DelayNs for StalledDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().delays_ms.push(ns / 1_000_000);
        core::future::pending::<()>().await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.state.borrow_mut().delays_ms.push(ms);
        core::future::pending::<()>().await;
    }
}

/// Receive handler that keeps everything it is given.
#[derive(Default)]
pub struct Recorder {
    pub received: Rc<RefCell<Vec<(String, Vec<u8>)>>>,
}

impl Recorder {
    pub fn received(&self) -> Rc<RefCell<Vec<(String, Vec<u8>)>>> {
        Rc::clone(&self.received)
    }
}

impl ReceiveHandler for Recorder {
    fn on_receive(&mut self, topic: Topic<'_>, payload: &[u8]) {
        self.received
            .borrow_mut()
            .push((topic.as_str().to_string(), payload.to_vec()));
    }
}

/// A cancel token that lives for the rest of the test binary.
pub fn leaked_cancel_token() -> &'static CancelToken {
    Box::leak(Box::new(CancelToken::new()))
}
