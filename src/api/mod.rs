//! HTTP access to the analytics backend.

mod client;
pub mod sse;

pub use client::{NightwatchClient, SingleShotScan};
pub use sse::{SseDecoder, SseFrame};
