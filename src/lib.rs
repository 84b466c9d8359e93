//! # Topic-Multiplexing Device-to-Cloud Bridge for Embedded Systems
//!
//! `myrtio-iot-bridge` is a `no_std` compatible bridge that carries many logical topics over
//! a single device-to-cloud messaging session. The transport only moves opaque byte
//! blobs, so the bridge frames each message with its topic and demultiplexes inbound
//! frames against local subscriptions.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Subscriptions and frame buffers are sized at compile time
//!   and managed using `heapless`.
//! - **Self-delimiting frames:** `@<topic>@<decimal length>@<payload>`, binary-safe payloads.
//! - **Wildcard subscriptions:** `+` matches exactly one topic level, `#` matches the rest.
//! - **Transport Agnostic:** The [`transport::IotPlatform`] and [`transport::IotSession`]
//!   traits wrap any vendor SDK that exposes create/send/pump/destroy.
//! - **Async or blocking:** Delivery sleeps through `embedded-hal-async` or `embedded-hal`
//!   delay providers, so the same client runs on an executor or on a plain thread.
//!
//! ## Architecture
//!
//! ### 1. Direct Client Usage
//!
//! ```ignore
//! let options = BridgeOptions::new(CONNECTION_STRING);
//! let mut client = BridgeClient::<_, _, _, 8, 512>::new(platform, Delay, options, handler);
//! client.connect().await?;
//! client.subscribe("commands/+")?;
//! client.publish("telemetry/temp", b"21.5").await?;
//! ```
//!
//! ### 2. Outbox
//!
//! Deliveries hold the client for several pump intervals. Other tasks can queue messages
//! through a [`outbox::PublisherHandle`] while one task owns the client and runs
//! [`BridgeClient::run_outbox`]:
//!
//! ```ignore
//! static OUTBOX: PublishRequestChannel<'static, 4> = PublishRequestChannel::new();
//!
//! let publisher = PublisherHandle::new(OUTBOX.sender());
//! publisher.publish("telemetry/temp", b"21.5").await;
//!
//! // On the task that owns the client:
//! client.run_outbox(OUTBOX.receiver()).await;
//! ```

#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod cancel;
pub mod client;
pub mod delivery;
pub mod error;
pub mod frame;
pub mod outbox;
pub mod registry;
pub mod topic;
pub mod transport;

// Re-export key types for easier access at the crate root.
pub use cancel::CancelToken;
pub use client::{BridgeClient, BridgeOptions};
pub use delivery::{DeliveryReport, ReceiveHandler};
pub use error::{BridgeError, DecodeError, EncodeError, RegistryError, TopicError};
pub use frame::{Frame, FrameCodec};
pub use registry::SubscriptionRegistry;
pub use topic::{Topic, TopicPattern};
