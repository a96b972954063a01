//! Server side of the probe bridge: the in-memory subscription hub,
//! device-code enrollment, and the result callback intake.

pub mod device_flow;
pub mod hub;
pub mod result;
pub mod wire;

pub use device_flow::{AuthorizeOutcome, DeviceAuthStart, PollOutcome};
pub use hub::{ProbeHub, Subscription};
pub use result::{receive_result, ReceiveError};
pub use wire::{ProbeMessage, ScrapeRequestEvent, ScrapeResultPayload, EVENT_PING, EVENT_SCRAPE_REQUEST};
