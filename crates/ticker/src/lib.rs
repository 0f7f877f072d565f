//! # Ticker
//!
//! Periodic clock source built on a [`Dispatcher`].
//!
//! A `PeriodicTicker` owns a dispatcher and a timer thread that posts the
//! current Unix time (fractional seconds) every `interval` until stopped.
//! Subscribers are registered on the ticker exactly as on a dispatcher.
//!
//! # Example
//!
//! ```no_run
//! use std::{thread, time::Duration};
//! use ticker::PeriodicTicker;
//!
//! let ticker = PeriodicTicker::new(0.5).unwrap();
//! ticker.subscribe(
//!     "time_printer",
//!     dispatcher::callback(|packet| println!("Current time: {}", packet.payload)),
//!     None,
//! );
//! thread::sleep(Duration::from_secs(3));
//! ticker.stop();
//! ```

mod done;
mod error;
mod ticker;

pub use dispatcher::Dispatcher;
pub use done::DoneSignal;
pub use error::TickerError;
pub use ticker::{unix_timestamp, PeriodicTicker, PeriodicTickerBuilder};
