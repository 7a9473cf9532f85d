//! Kepler downlink packet reconstruction.
//!
//! Walks a file of VCDUs, or of bare CCSDS packets, locating each embedded packet
//! header, including headers split across two frames. Headers are validated, grouped
//! into data sets and accounted for in a storage correlation table (SCT).
//!
//! ```no_run
//! use kplr::pipeline::{Pipeline, ReaderConfig};
//!
//! let sct = std::fs::File::create("sct.txt").unwrap();
//! let report = Pipeline::new(ReaderConfig::default())
//!     .with_sct(sct)
//!     .run_file("downlink.dat")
//!     .unwrap();
//! println!("{} packets in {} data sets", report.packets, report.data_sets);
//! ```
mod bytes;
mod error;

pub mod dataset;
pub mod dmc;
pub mod framing;
pub mod pipeline;
pub mod source;
pub mod spacepacket;

pub use error::{Error, Result};
