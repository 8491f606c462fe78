//! Selection-tracking grid controller for storefront bulk product actions.
//!
//! A page lists remote-store products, the operator picks rows, and a bulk
//! action (sync, rename, reconcile) is queued on the host as one background
//! job whose progress lines are streamed back into a log panel.

pub mod channel;
pub mod config;
pub mod console;
pub mod controller;
pub mod daterange;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod mapper;
pub mod model;
pub mod pagination;
pub mod progress;
pub mod selection;
pub mod services;
pub mod view;

pub use controller::{GridController, GridOptions, RunOutcome};
pub use error::GridError;
