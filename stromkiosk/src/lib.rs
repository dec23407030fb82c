//! Data acquisition for an electricity metering kiosk display.
//!
//! This library supports the stromkiosk binary found elsewhere in this
//! project. It polls an InfluxDB 2.x instance for metering data, flattens
//! the query results into a field-keyed snapshot, derives consumption and
//! cost figures from it and keeps a small persisted baseline for the
//! cumulative counter feature. Presentation is someone else's problem: a
//! consumer subscribes to the feeds published by [`kiosk::Kiosk`].

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod baseline;
mod common;
pub mod config;
pub mod derive;
pub mod influx;
pub mod kiosk;
pub mod query;
pub mod series;
pub mod snapshot;
