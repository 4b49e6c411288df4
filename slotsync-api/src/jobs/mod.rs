//! Background Jobs for SlotSync
//!
//! - `refresher`: periodic repopulation of the availability cache
//!
//! # Usage
//!
//! ```ignore
//! use slotsync_api::jobs::BackgroundRefresher;
//!
//! let refresher = BackgroundRefresher::new(store, upstream, config.refresher);
//! refresher.start().await?; // initial population, then the periodic loop
//!
//! // On shutdown
//! refresher.shutdown().await?;
//! ```

pub mod refresher;

pub use refresher::{BackgroundRefresher, CycleReport, RefresherState};
