//! # IoT Transport Abstraction
//!
//! This module defines the traits the bridge uses to talk to the device-to-cloud
//! transport (the vendor SDK that owns TLS, authentication and the wire protocol). The
//! bridge never looks inside a session; it only drives it through these operations.
//!
//! The transport is callback driven, but callbacks are not registered as function
//! pointers with an opaque context. Instead every [`IotSession::pump_once`] call receives
//! a [`SessionEvents`] object, and the session invokes it for whatever became due during
//! that pump step. All callbacks therefore run inline on the thread driving the pump.

/// Everything the transport needs to open a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionDescriptor<'a> {
    /// The device connection string issued by the cloud endpoint.
    pub connection_string: &'a str,
}

/// Session options the bridge may set right after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionOption {
    /// Ask the transport to trace its protocol traffic to its own log.
    LogTrace(bool),
}

/// Identifies one send submission so its confirmation can be matched to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendToken(pub u32);

/// Outcome reported by the transport for a submitted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfirmationResult {
    /// The cloud endpoint acknowledged the message.
    Ok,
    /// The session was destroyed before the message went out.
    BecauseDestroy,
    /// The message expired in the transport's queue.
    MessageTimeout,
    /// The transport gave up on the message.
    Error,
}

/// Connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    Authenticated,
    Unauthenticated,
}

/// Why the connection state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusReason {
    Ok,
    ExpiredSasToken,
    DeviceDisabled,
    BadCredential,
    RetryExpired,
    NoNetwork,
    CommunicationError,
    NoPingResponse,
}

/// How the transport encoded an inbound message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ContentKind {
    ByteArray,
    String,
    Unknown,
}

/// A cloud-to-device message as handed over by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InboundMessage<'a> {
    pub kind: ContentKind,
    pub body: &'a [u8],
}

impl<'a> InboundMessage<'a> {
    /// A byte-array message, the only kind the bridge accepts.
    pub fn bytes(body: &'a [u8]) -> Self {
        Self {
            kind: ContentKind::ByteArray,
            body,
        }
    }
}

/// What the transport should report back to the cloud for an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disposition {
    /// Acknowledge receipt; the message is complete.
    Accepted,
    /// Refuse the message; it is dropped without redelivery.
    Rejected,
}

/// Status returned for a direct-method invocation that nobody handles.
pub const METHOD_STATUS_OK: i32 = 200;

/// Receiver for everything a pump step can report.
pub trait SessionEvents {
    /// A cloud-to-device message arrived.
    fn on_message(&mut self, message: InboundMessage<'_>) -> Disposition;

    /// The transport finished processing a submitted send.
    fn on_send_confirmed(&mut self, token: SendToken, result: ConfirmationResult);

    /// The connection was established or lost. Informational only.
    fn on_connection_status(&mut self, status: ConnectionStatus, reason: StatusReason);

    /// The cloud invoked a direct method on the device.
    ///
    /// Returns the status code reported back to the caller. The default acknowledges
    /// every method without acting on it.
    fn on_method(&mut self, _method: &str, _payload: &[u8]) -> i32 {
        METHOD_STATUS_OK
    }
}

/// A live device session. Owned by the bridge between `create_session` and `destroy`.
pub trait IotSession {
    /// The error type returned by the session.
    type Error: core::fmt::Debug;

    /// Set a session option.
    fn set_option(&mut self, option: SessionOption) -> Result<(), Self::Error>;

    /// Queue `frame` for asynchronous sending.
    ///
    /// Returns immediately. A later pump step reports the outcome through
    /// [`SessionEvents::on_send_confirmed`] with the same `token`. An `Err` means the
    /// transport refused the submission outright and no confirmation will follow.
    fn submit_send(&mut self, frame: &[u8], token: SendToken) -> Result<(), Self::Error>;

    /// Service pending I/O once without blocking, invoking `events` for anything due.
    fn pump_once(&mut self, events: &mut dyn SessionEvents);

    /// Tear the session down.
    fn destroy(self);
}

/// The transport subsystem: process-wide setup plus a session factory.
pub trait IotPlatform {
    /// The error type returned by the platform and its sessions.
    type Error: core::fmt::Debug;

    /// The session type this platform creates.
    type Session: IotSession<Error = Self::Error>;

    /// Bring the transport subsystem up. Called once before `create_session`.
    fn initialize(&mut self) -> Result<(), Self::Error>;

    /// Release the transport subsystem. Called once after the session is destroyed.
    fn shutdown(&mut self);

    /// Open a session described by `descriptor`.
    fn create_session(
        &mut self,
        descriptor: &ConnectionDescriptor<'_>,
    ) -> Result<Self::Session, Self::Error>;
}
