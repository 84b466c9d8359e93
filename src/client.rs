//! # Bridge Client
//!
//! The application-facing side of the bridge. A [`BridgeClient`] owns the transport
//! platform, the session it creates, the subscription registry, and the outbound frame
//! buffer.
//!
//! ```ignore
//! let options = BridgeOptions::new(CONNECTION_STRING)
//!     .with_pump_interval(Duration::from_millis(500));
//! let mut client = BridgeClient::<_, _, _, 8, 512>::new(platform, Delay, options, handler);
//!
//! client.connect().await?;
//! client.subscribe("commands/+")?;
//! client.publish("telemetry/temp", b"21.5").await?;
//! client.disconnect();
//! ```

use embassy_time::Duration;
use embedded_hal::delay::DelayNs as BlockingDelayNs;
use embedded_hal_async::delay::DelayNs;

use crate::cancel::CancelToken;
use crate::delivery::{
    self, DEFAULT_MAX_CONFIRMATIONS, DEFAULT_PUMP_INTERVAL, DeliveryLoop, DeliveryOptions,
    DeliveryReport, Inbound, ReceiveHandler,
};
use crate::error::BridgeError;
use crate::frame::{self, DEFAULT_MAX_FRAME_SIZE, FrameCodec};
use crate::outbox::{PublishRequest, PublishRequestReceiver};
use crate::registry::SubscriptionRegistry;
use crate::topic::Topic;
use crate::transport::{
    ConnectionDescriptor, IotPlatform, IotSession, SendToken, SessionOption,
};

/// Configuration for a [`BridgeClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions<'a> {
    pub connection_string: &'a str,
    pub max_confirmations: usize,
    pub pump_interval: Duration,
    pub max_frame_size: usize,
    pub trace: bool,
    pub connect_message: Option<&'a [u8]>,
}

impl<'a> BridgeOptions<'a> {
    /// Options with defaults: one submission per publish, 5 s pump interval,
    /// 4096-byte inbound frames, tracing off, no connect message.
    pub fn new(connection_string: &'a str) -> Self {
        Self {
            connection_string,
            max_confirmations: DEFAULT_MAX_CONFIRMATIONS,
            pump_interval: DEFAULT_PUMP_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            trace: false,
            connect_message: None,
        }
    }

    /// Number of times each frame is submitted to the transport. At least one; `0` is
    /// raised to `1` so every publish reaches the transport.
    pub fn with_max_confirmations(mut self, max_confirmations: usize) -> Self {
        self.max_confirmations = max_confirmations.max(1);
        self
    }

    /// Sleep between pump steps while delivering.
    pub fn with_pump_interval(mut self, pump_interval: Duration) -> Self {
        self.pump_interval = pump_interval;
        self
    }

    /// Largest inbound frame accepted; anything bigger is rejected undecoded.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Enable the transport's own protocol tracing.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Raw bytes sent once right after the session is created.
    ///
    /// The transport connects lazily; a first send makes it connect immediately instead
    /// of on the first real publish. The message is sent as-is, not framed.
    pub fn with_connect_message(mut self, message: &'a [u8]) -> Self {
        self.connect_message = Some(message);
        self
    }

    fn delivery(&self) -> DeliveryOptions {
        DeliveryOptions {
            max_confirmations: self.max_confirmations,
            pump_interval: self.pump_interval,
        }
    }
}

enum Outgoing<'a> {
    /// The first `n` bytes of the client's frame buffer.
    Framed(usize),
    Raw(&'a [u8]),
}

/// The device-side bridge.
///
/// # Type Parameters
///
/// - `P`: the transport platform
/// - `D`: a delay provider; async delivery needs `embedded_hal_async::delay::DelayNs`,
///   blocking delivery needs `embedded_hal::delay::DelayNs` (`embassy_time::Delay` is both)
/// - `H`: the receive handler
/// - `MAX_SUBSCRIPTIONS`: capacity of the subscription registry
/// - `FRAME_SIZE`: size of the outbound frame buffer
pub struct BridgeClient<'a, P, D, H, const MAX_SUBSCRIPTIONS: usize, const FRAME_SIZE: usize>
where
    P: IotPlatform,
{
    platform: P,
    session: Option<P::Session>,
    delay: D,
    handler: H,
    options: BridgeOptions<'a>,
    registry: SubscriptionRegistry<MAX_SUBSCRIPTIONS>,
    tx_buffer: [u8; FRAME_SIZE],
    next_token: u32,
    cancel: Option<&'a CancelToken>,
}

impl<'a, P, D, H, const MAX_SUBSCRIPTIONS: usize, const FRAME_SIZE: usize>
    BridgeClient<'a, P, D, H, MAX_SUBSCRIPTIONS, FRAME_SIZE>
where
    P: IotPlatform,
{
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Destroy the session and shut the platform down. Does nothing when disconnected.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.destroy();
            self.platform.shutdown();
            info!("device session closed");
        }
    }
}

impl<'a, P, D, H, const MAX_SUBSCRIPTIONS: usize, const FRAME_SIZE: usize>
    BridgeClient<'a, P, D, H, MAX_SUBSCRIPTIONS, FRAME_SIZE>
where
    P: IotPlatform,
    H: ReceiveHandler,
{
    pub fn new(platform: P, delay: D, options: BridgeOptions<'a>, handler: H) -> Self {
        Self {
            platform,
            session: None,
            delay,
            handler,
            options,
            registry: SubscriptionRegistry::new(),
            tx_buffer: [0; FRAME_SIZE],
            next_token: 0,
            cancel: None,
        }
    }

    /// Let `token` abort any delivery this client runs.
    pub fn with_cancel_token(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Replace the receive handler.
    pub fn set_receive_handler(&mut self, handler: H) {
        self.handler = handler;
    }

    pub fn options(&self) -> &BridgeOptions<'a> {
        &self.options
    }

    pub fn registry(&self) -> &SubscriptionRegistry<MAX_SUBSCRIPTIONS> {
        &self.registry
    }

    /// Start receiving messages whose topic matches `pattern`.
    ///
    /// Subscriptions are local: the transport delivers everything and the registry
    /// filters. Subscribing before `connect` is fine.
    pub fn subscribe(&mut self, pattern: &str) -> Result<(), BridgeError<P::Error>> {
        if self.registry.subscribe(pattern)? {
            info!("subscribed to {}", pattern);
        }
        Ok(())
    }

    /// Stop receiving messages for `pattern`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&mut self, pattern: &str) -> bool {
        let removed = self.registry.unsubscribe(pattern);
        if removed {
            info!("unsubscribed from {}", pattern);
        }
        removed
    }

    /// Initialize the platform and create the session.
    ///
    /// On failure the platform is shut down again, so a later retry starts clean.
    fn open_session(&mut self) -> Result<(), BridgeError<P::Error>> {
        if self.session.is_some() {
            return Err(BridgeError::AlreadyConnected);
        }

        self.platform.initialize().map_err(|e| {
            error!("failed to initialize the transport");
            BridgeError::PlatformInit(e)
        })?;

        info!("creating device session");
        let descriptor = ConnectionDescriptor {
            connection_string: self.options.connection_string,
        };
        let mut session = match self.platform.create_session(&descriptor) {
            Ok(session) => session,
            Err(e) => {
                error!("failed to create device session, check the connection string");
                self.platform.shutdown();
                return Err(BridgeError::SessionCreationFailed(e));
            }
        };

        if self.options.trace
            && let Err(e) = session.set_option(SessionOption::LogTrace(true))
        {
            error!("failed to enable transport tracing");
            session.destroy();
            self.platform.shutdown();
            return Err(BridgeError::SessionCreationFailed(e));
        }

        self.session = Some(session);
        Ok(())
    }

    /// Pump the session once without sending, dispatching any inbound messages.
    pub fn poll(&mut self) -> Result<(), BridgeError<P::Error>> {
        let session = self.session.as_mut().ok_or(BridgeError::NotConnected)?;
        let mut inbound = Inbound::new(
            FrameCodec::new(self.options.max_frame_size),
            &self.registry,
            &mut self.handler,
        );
        delivery::pump_idle(session, &mut inbound);
        Ok(())
    }

    /// Validate `topic` and encode the frame into the client's buffer.
    fn encode(&mut self, topic: &str, payload: &[u8]) -> Result<usize, BridgeError<P::Error>> {
        let topic = Topic::new(topic)?;
        Ok(frame::encode(&topic, payload, &mut self.tx_buffer)?)
    }

    fn next_token(&mut self) -> SendToken {
        let token = SendToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        token
    }

    /// Split `self` into the pieces one delivery needs.
    fn delivery_parts(
        &mut self,
        outgoing: Outgoing<'a>,
    ) -> Result<
        (
            DeliveryLoop<'_, P::Session, D>,
            &[u8],
            Inbound<'_, H, MAX_SUBSCRIPTIONS>,
        ),
        BridgeError<P::Error>,
    > {
        let Self {
            session,
            delay,
            handler,
            options,
            registry,
            tx_buffer,
            cancel,
            ..
        } = self;

        let session = session.as_mut().ok_or(BridgeError::NotConnected)?;
        let frame = match outgoing {
            Outgoing::Framed(len) => &tx_buffer[..len],
            Outgoing::Raw(bytes) => bytes,
        };
        let delivery = DeliveryLoop::new(session, delay, options.delivery()).with_cancel(*cancel);
        let inbound = Inbound::new(FrameCodec::new(options.max_frame_size), registry, handler);
        Ok((delivery, frame, inbound))
    }
}

impl<'a, P, D, H, const MAX_SUBSCRIPTIONS: usize, const FRAME_SIZE: usize>
    BridgeClient<'a, P, D, H, MAX_SUBSCRIPTIONS, FRAME_SIZE>
where
    P: IotPlatform,
    D: DelayNs,
    H: ReceiveHandler,
{
    /// Open the session and, if configured, send the connect message.
    ///
    /// # Errors
    ///
    /// `PlatformInit` or `SessionCreationFailed` if the transport cannot be brought up,
    /// `AlreadyConnected` if a session exists. A failing connect message is reported as
    /// `SendRejected`; the session stays open in that case.
    pub async fn connect(&mut self) -> Result<(), BridgeError<P::Error>> {
        self.open_session()?;
        if let Some(message) = self.options.connect_message {
            self.deliver(Outgoing::Raw(message)).await?;
        }
        Ok(())
    }

    /// Frame `payload` for `topic`, send it, and pump until the submission budget is
    /// spent.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<DeliveryReport, BridgeError<P::Error>> {
        let len = self.encode(topic, payload)?;
        self.deliver(Outgoing::Framed(len)).await
    }

    async fn deliver(
        &mut self,
        outgoing: Outgoing<'a>,
    ) -> Result<DeliveryReport, BridgeError<P::Error>> {
        let token = self.next_token();
        let (mut delivery, frame, mut inbound) = self.delivery_parts(outgoing)?;
        let report = delivery.send_and_confirm(frame, token, &mut inbound).await?;
        debug!(
            "send {} done: {} submitted, {} confirmed",
            report.token.0,
            report.submitted,
            report.confirmed
        );
        Ok(report)
    }

    /// Publish every request currently queued in the outbox, then return.
    ///
    /// Failed publishes are logged and skipped. Returns how many succeeded.
    pub async fn drain_outbox<const OUTBOX_DEPTH: usize>(
        &mut self,
        requests: &PublishRequestReceiver<'_, OUTBOX_DEPTH>,
    ) -> usize {
        let mut published = 0;
        while let Ok(request) = requests.try_receive() {
            if self.publish_request(&request).await {
                published += 1;
            }
        }
        published
    }

    /// Publish outbox requests forever. Run this on a dedicated task.
    pub async fn run_outbox<const OUTBOX_DEPTH: usize>(
        &mut self,
        requests: PublishRequestReceiver<'_, OUTBOX_DEPTH>,
    ) -> ! {
        loop {
            let request = requests.receive().await;
            self.publish_request(&request).await;
        }
    }

    async fn publish_request(&mut self, request: &PublishRequest<'_>) -> bool {
        match self.publish(request.topic, request.payload).await {
            Ok(_) => true,
            Err(_) => {
                warn!("outbox publish to {} failed", request.topic);
                false
            }
        }
    }
}

impl<'a, P, D, H, const MAX_SUBSCRIPTIONS: usize, const FRAME_SIZE: usize>
    BridgeClient<'a, P, D, H, MAX_SUBSCRIPTIONS, FRAME_SIZE>
where
    P: IotPlatform,
    D: BlockingDelayNs,
    H: ReceiveHandler,
{
    /// Blocking variant of [`BridgeClient::connect`].
    pub fn connect_blocking(&mut self) -> Result<(), BridgeError<P::Error>> {
        self.open_session()?;
        if let Some(message) = self.options.connect_message {
            self.deliver_blocking(Outgoing::Raw(message))?;
        }
        Ok(())
    }

    /// Blocking variant of [`BridgeClient::publish`]. Holds the calling thread for
    /// every pump interval of the delivery.
    pub fn publish_blocking(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<DeliveryReport, BridgeError<P::Error>> {
        let len = self.encode(topic, payload)?;
        self.deliver_blocking(Outgoing::Framed(len))
    }

    fn deliver_blocking(
        &mut self,
        outgoing: Outgoing<'a>,
    ) -> Result<DeliveryReport, BridgeError<P::Error>> {
        let token = self.next_token();
        let (mut delivery, frame, mut inbound) = self.delivery_parts(outgoing)?;
        delivery.send_and_confirm_blocking(frame, token, &mut inbound)
    }
}

impl<'a, P, D, H, const MAX_SUBSCRIPTIONS: usize, const FRAME_SIZE: usize> Drop
    for BridgeClient<'a, P, D, H, MAX_SUBSCRIPTIONS, FRAME_SIZE>
where
    P: IotPlatform,
{
    fn drop(&mut self) {
        self.disconnect();
    }
}
