//! Treewait: async wait helpers for testing mounted component trees
//!
//! Treewait drives behavioral tests of a rendered component tree whose
//! network layer is mocked. A [`Session`] binds one [`ComponentTree`] to
//! one [`NetworkMock`] and offers three kinds of operations:
//!
//! - lookups by CSS-like selector or by spec id attribute, returning host
//!   nodes only;
//! - synthetic interactions (`change_value`, `click`, `submit`);
//! - waits that resolve once a condition holds.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   interactions    ┌─────────────────┐
//! │  Test body   │──────────────────►│  ComponentTree  │
//! │  (tokio)     │                   │  (VirtualTree)  │
//! └──────┬───────┘                   └────────┬────────┘
//!        │ await                              │ app handlers
//!        ▼                                    ▼
//! ┌──────────────┐  settle-then-check ┌─────────────────┐
//! │  wait engine │◄───────────────────│  NetworkMock    │
//! │  poll_for    │   holding promises │  (MockNetwork)  │
//! │  until_settled                    └─────────────────┘
//! └──────────────┘
//! ```
//!
//! Self-timing waits ([`Session::wait_for`], [`Session::wait_for_spec`],
//! [`Session::poll_for`]) poll every [`POLL_INTERVAL`] and fail once the
//! accumulated wait exceeds their timeout. [`Session::wait_for_api_call`]
//! instead re-checks after in-flight calls settle and never times out.

#![warn(missing_docs)]

mod config;
mod holding;
mod network;
mod resolver;
mod result;
mod selector;
mod session;
mod tree;
/// Polling and settle-then-check wait primitives
pub mod wait;

pub use config::{SessionConfig, DEFAULT_SPEC_ATTRIBUTE, DEFAULT_WAIT_TIMEOUT_MS};
pub use holding::{settle_all, HoldingPromise, HoldingRegistry, Subscription};
pub use network::{
    filter_calls, ApiCall, CallRecord, HttpMethod, MockNetwork, MockNetworkBuilder, MockResponse,
    NetworkMock, ResponseFuture, Route, UrlMatcher, UrlPattern,
};
pub use resolver::SelectorResolver;
pub use result::{HarnessError, HarnessResult};
pub use selector::{AttrCondition, Combinator, Compound, Selector};
pub use session::{ChangeOptions, Session};
pub use tree::{ComponentTree, ElementInfo, EventHandler, NodeId, NodeKind, UiEvent, VirtualTree};
pub use wait::{
    poll_for, until_settled, FnCondition, SettledCondition, WaitCondition, WaitResult,
    POLL_INTERVAL, POLL_INTERVAL_MS,
};

/// Everything a test module usually needs
pub mod prelude {
    pub use super::config::*;
    pub use super::network::*;
    pub use super::result::*;
    pub use super::session::*;
    pub use super::tree::*;
    pub use super::wait::{FnCondition, SettledCondition, WaitCondition, WaitResult, POLL_INTERVAL};
}
