//! # Delivery Loop
//!
//! Sends one outbound frame through a session and pumps the transport while doing so.
//!
//! The transport is not preemptive: nothing happens on the wire, and no callback fires,
//! unless somebody calls [`IotSession::pump_once`]. A delivery therefore looks like
//!
//! ```text
//! repeat
//!     submit the frame, unless `max_confirmations` submissions were already made
//!     pump the session once
//!     sleep `pump_interval`
//! until an iteration made no submission
//! ```
//!
//! With the default `max_confirmations = 1` that is one submit cycle plus one drain
//! cycle. Confirmations that arrive during those pumps are counted in the returned
//! [`DeliveryReport`], but the loop never waits for them: it is bounded by submissions,
//! not by acknowledgements.
//!
//! The same pump steps also deliver inbound messages, which are decoded, matched against
//! the subscription registry, and handed to the [`ReceiveHandler`].

use core::pin::pin;

use embassy_time::Duration;
use embedded_hal::delay::DelayNs as BlockingDelayNs;
use embedded_hal_async::delay::DelayNs;
use futures::future::{Either, select};

use crate::cancel::CancelToken;
use crate::error::BridgeError;
use crate::frame::FrameCodec;
use crate::registry::SubscriptionRegistry;
use crate::topic::Topic;
use crate::transport::{
    ConfirmationResult, ConnectionStatus, ContentKind, Disposition, InboundMessage, IotSession,
    SendToken, SessionEvents, StatusReason,
};

/// Number of send submissions per delivery unless configured otherwise.
pub const DEFAULT_MAX_CONFIRMATIONS: usize = 1;

/// Sleep between pump steps unless configured otherwise.
pub const DEFAULT_PUMP_INTERVAL: Duration = Duration::from_secs(5);

/// Receives `(topic, payload)` for every inbound message that matched a subscription.
///
/// Implemented for any `FnMut(Topic<'_>, &[u8])`.
pub trait ReceiveHandler {
    fn on_receive(&mut self, topic: Topic<'_>, payload: &[u8]);
}

impl<F> ReceiveHandler for F
where
    F: FnMut(Topic<'_>, &[u8]),
{
    fn on_receive(&mut self, topic: Topic<'_>, payload: &[u8]) {
        self(topic, payload)
    }
}

/// Knobs for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// How many times the frame is submitted before the loop winds down. Never less
    /// than one submission is made.
    pub max_confirmations: usize,
    /// Sleep after every pump step.
    pub pump_interval: Duration,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            max_confirmations: DEFAULT_MAX_CONFIRMATIONS,
            pump_interval: DEFAULT_PUMP_INTERVAL,
        }
    }
}

impl DeliveryOptions {
    fn pump_interval_ms(&self) -> u32 {
        u32::try_from(self.pump_interval.as_millis()).unwrap_or(u32::MAX)
    }
}

/// What a finished delivery observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeliveryReport {
    pub token: SendToken,
    /// Send submissions accepted by the transport.
    pub submitted: usize,
    /// Confirmations with [`ConfirmationResult::Ok`] seen during the loop.
    pub confirmed: usize,
    /// Confirmations with any other result seen during the loop.
    pub failed: usize,
    /// Pump steps performed.
    pub pump_cycles: usize,
}

/// State of one outbound frame while its loop runs.
#[derive(Debug)]
pub struct DeliveryAttempt {
    token: SendToken,
    max_confirmations: usize,
    submitted: usize,
    confirmed: usize,
    failed: usize,
    pump_cycles: usize,
    finishing: bool,
}

impl DeliveryAttempt {
    /// A budget of `0` is treated as `1`: a delivery always submits at least once.
    pub fn new(token: SendToken, max_confirmations: usize) -> Self {
        Self {
            token,
            max_confirmations: max_confirmations.max(1),
            submitted: 0,
            confirmed: 0,
            failed: 0,
            pump_cycles: 0,
            finishing: false,
        }
    }

    pub fn token(&self) -> SendToken {
        self.token
    }

    /// Submit once more if the budget allows, otherwise mark the loop as finishing.
    pub fn submit<S: IotSession>(&mut self, session: &mut S, frame: &[u8]) -> Result<(), S::Error> {
        if self.submitted < self.max_confirmations {
            session.submit_send(frame, self.token)?;
            self.submitted += 1;
            debug!(
                "submitted send {} ({}/{})",
                self.token.0,
                self.submitted,
                self.max_confirmations
            );
        } else {
            self.finishing = true;
        }
        Ok(())
    }

    /// Count a confirmation. Returns `false` if it belongs to another send.
    pub fn record_confirmation(&mut self, token: SendToken, result: ConfirmationResult) -> bool {
        if token != self.token {
            return false;
        }
        match result {
            ConfirmationResult::Ok => self.confirmed += 1,
            _ => self.failed += 1,
        }
        true
    }

    /// The last iteration made no submission.
    pub fn is_finished(&self) -> bool {
        self.finishing
    }

    pub fn report(&self) -> DeliveryReport {
        DeliveryReport {
            token: self.token,
            submitted: self.submitted,
            confirmed: self.confirmed,
            failed: self.failed,
            pump_cycles: self.pump_cycles,
        }
    }
}

/// Everything inbound dispatch needs: the codec limits, the subscriptions, the handler.
pub struct Inbound<'a, H, const MAX_SUBSCRIPTIONS: usize> {
    pub codec: FrameCodec,
    pub registry: &'a SubscriptionRegistry<MAX_SUBSCRIPTIONS>,
    pub handler: &'a mut H,
}

impl<'a, H, const MAX_SUBSCRIPTIONS: usize> Inbound<'a, H, MAX_SUBSCRIPTIONS>
where
    H: ReceiveHandler,
{
    pub fn new(
        codec: FrameCodec,
        registry: &'a SubscriptionRegistry<MAX_SUBSCRIPTIONS>,
        handler: &'a mut H,
    ) -> Self {
        Self {
            codec,
            registry,
            handler,
        }
    }

    /// Decode, match, and hand one inbound message to the handler.
    ///
    /// Anything that is not a byte array, fails to decode, or has no subscription is
    /// rejected and dropped. The handler only sees accepted messages.
    pub fn dispatch(&mut self, message: InboundMessage<'_>) -> Disposition {
        if message.kind != ContentKind::ByteArray {
            warn!("rejecting inbound message with content kind {:?}", message.kind);
            return Disposition::Rejected;
        }

        let frame = match self.codec.decode(message.body) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("rejecting malformed inbound frame: {:?}", e);
                return Disposition::Rejected;
            }
        };

        if !self.registry.resolve(&frame.topic) {
            warn!("rejecting inbound frame for unsubscribed topic {}", frame.topic.as_str());
            return Disposition::Rejected;
        }

        trace!(
            "delivering {} bytes on {}",
            frame.payload.len(),
            frame.topic.as_str()
        );
        self.handler.on_receive(frame.topic, frame.payload);
        Disposition::Accepted
    }

    fn events<'e>(
        &'e mut self,
        attempt: Option<&'e mut DeliveryAttempt>,
    ) -> PumpEvents<'e, H, MAX_SUBSCRIPTIONS> {
        PumpEvents {
            inbound: Inbound {
                codec: self.codec,
                registry: self.registry,
                handler: &mut *self.handler,
            },
            attempt,
        }
    }
}

/// The [`SessionEvents`] object handed to the session for one pump step.
struct PumpEvents<'a, H, const MAX_SUBSCRIPTIONS: usize> {
    inbound: Inbound<'a, H, MAX_SUBSCRIPTIONS>,
    attempt: Option<&'a mut DeliveryAttempt>,
}

impl<H, const MAX_SUBSCRIPTIONS: usize> SessionEvents for PumpEvents<'_, H, MAX_SUBSCRIPTIONS>
where
    H: ReceiveHandler,
{
    fn on_message(&mut self, message: InboundMessage<'_>) -> Disposition {
        self.inbound.dispatch(message)
    }

    fn on_send_confirmed(&mut self, token: SendToken, result: ConfirmationResult) {
        let counted = self
            .attempt
            .as_deref_mut()
            .is_some_and(|attempt| attempt.record_confirmation(token, result));
        if counted {
            debug!("send {} confirmed: {:?}", token.0, result);
        } else {
            debug!("confirmation for send {} outside its delivery: {:?}", token.0, result);
        }
    }

    fn on_connection_status(&mut self, status: ConnectionStatus, reason: StatusReason) {
        match status {
            ConnectionStatus::Authenticated => info!("device connected to the cloud"),
            ConnectionStatus::Unauthenticated => {
                info!("device disconnected from the cloud: {:?}", reason)
            }
        }
    }
}

/// Pump the session once outside any delivery, dispatching inbound messages.
pub fn pump_idle<S, H, const MAX_SUBSCRIPTIONS: usize>(
    session: &mut S,
    inbound: &mut Inbound<'_, H, MAX_SUBSCRIPTIONS>,
) where
    S: IotSession,
    H: ReceiveHandler,
{
    session.pump_once(&mut inbound.events(None));
}

/// Drives a [`DeliveryAttempt`] against a session.
pub struct DeliveryLoop<'a, S, D> {
    session: &'a mut S,
    delay: &'a mut D,
    options: DeliveryOptions,
    cancel: Option<&'a CancelToken>,
}

impl<'a, S, D> DeliveryLoop<'a, S, D>
where
    S: IotSession,
{
    pub fn new(session: &'a mut S, delay: &'a mut D, options: DeliveryOptions) -> Self {
        Self {
            session,
            delay,
            options,
            cancel: None,
        }
    }

    /// Stop the loop early when `token` is cancelled.
    pub fn with_cancel(mut self, token: Option<&'a CancelToken>) -> Self {
        self.cancel = token;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    /// Submit (if due) and pump once. Shared by the async and blocking loops.
    fn step<H, const MAX_SUBSCRIPTIONS: usize>(
        &mut self,
        attempt: &mut DeliveryAttempt,
        frame: &[u8],
        inbound: &mut Inbound<'_, H, MAX_SUBSCRIPTIONS>,
    ) -> Result<(), BridgeError<S::Error>>
    where
        H: ReceiveHandler,
    {
        if self.is_cancelled() {
            info!("delivery of send {} cancelled", attempt.token.0);
            return Err(BridgeError::Cancelled);
        }

        attempt.submit(&mut *self.session, frame).map_err(|e| {
            error!("transport rejected send {}", attempt.token.0);
            BridgeError::SendRejected(e)
        })?;

        self.session.pump_once(&mut inbound.events(Some(&mut *attempt)));
        attempt.pump_cycles += 1;
        Ok(())
    }

    /// Send `frame` and pump until the submission budget is spent.
    ///
    /// # Errors
    ///
    /// `SendRejected` if the transport refuses a submission (nothing is retried), and
    /// `Cancelled` if the cancel token fires before the loop ends.
    pub async fn send_and_confirm<H, const MAX_SUBSCRIPTIONS: usize>(
        &mut self,
        frame: &[u8],
        token: SendToken,
        inbound: &mut Inbound<'_, H, MAX_SUBSCRIPTIONS>,
    ) -> Result<DeliveryReport, BridgeError<S::Error>>
    where
        D: DelayNs,
        H: ReceiveHandler,
    {
        let mut attempt = DeliveryAttempt::new(token, self.options.max_confirmations);
        let sleep_ms = self.options.pump_interval_ms();

        loop {
            self.step(&mut attempt, frame, inbound)?;

            match self.cancel {
                Some(cancel) => {
                    let sleep = pin!(self.delay.delay_ms(sleep_ms));
                    let cancelled = pin!(cancel.cancelled());
                    if let Either::Right(_) = select(sleep, cancelled).await {
                        info!("delivery of send {} cancelled", token.0);
                        return Err(BridgeError::Cancelled);
                    }
                }
                None => self.delay.delay_ms(sleep_ms).await,
            }

            if attempt.is_finished() {
                return Ok(attempt.report());
            }
        }
    }

    /// Blocking variant of [`DeliveryLoop::send_and_confirm`].
    ///
    /// The cancel token is checked before every step; a cancel arriving mid-sleep takes
    /// effect when the sleep ends.
    pub fn send_and_confirm_blocking<H, const MAX_SUBSCRIPTIONS: usize>(
        &mut self,
        frame: &[u8],
        token: SendToken,
        inbound: &mut Inbound<'_, H, MAX_SUBSCRIPTIONS>,
    ) -> Result<DeliveryReport, BridgeError<S::Error>>
    where
        D: BlockingDelayNs,
        H: ReceiveHandler,
    {
        let mut attempt = DeliveryAttempt::new(token, self.options.max_confirmations);
        let sleep_ms = self.options.pump_interval_ms();

        loop {
            self.step(&mut attempt, frame, inbound)?;
            BlockingDelayNs::delay_ms(&mut *self.delay, sleep_ms);

            if attempt.is_finished() {
                return Ok(attempt.report());
            }
        }
    }
}
