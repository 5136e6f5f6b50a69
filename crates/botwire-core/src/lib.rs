//! # botwire-core
//!
//! Portable building blocks for the botwire client: wire types, text
//! shaping, and caches. Everything here is synchronous and runtime-free.
//!
//! - **Events**: `RawEvent` with predicates for heartbeat/lifecycle/message frames
//! - **Segments**: typed message parts plus inline `[CQ:...]` cleanup
//! - **Actions**: `ActionRequest`/`ActionResponse` envelopes with echo correlation
//! - **Targets**: `private:<id>` / `group:<id>` / `guild:<g>:<c>` destination grammar
//! - **Text**: markdown stripping, link de-risking, fixed-size chunking
//! - **Caches**: message-id dedup and member display names
//! - **Errors**: `WireError` hierarchy via `thiserror`

#![deny(unsafe_code)]

pub mod action;
pub mod backoff;
pub mod cache;
pub mod cq;
pub mod errors;
pub mod event;
pub mod segment;
pub mod target;
pub mod text;

pub use action::{ActionRequest, ActionResponse};
pub use backoff::reconnect_delay;
pub use cache::{DedupCache, DedupConfig, MemberNameCache};
pub use errors::{Result, WireError};
pub use event::{MessagePayload, RawEvent, Sender};
pub use segment::Segment;
pub use target::Target;
