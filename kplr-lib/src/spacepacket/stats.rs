use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use super::{
    CcsdsHeader, Product, BASELINE, ENCODED, LONG_CADENCE, RESIDUAL_BASELINE, SHORT_CADENCE,
};

/// Running packet and data set counts for one session.
///
/// Only packets that classify as a [Product] are counted; raw and requantized
/// long/short cadence packets are not.
///
/// # Example
/// ```
/// use kplr::spacepacket::{CcsdsHeader, HeaderFields, Product, Statistics, LONG_CADENCE, BASELINE};
///
/// let header = CcsdsHeader::decode(
///     &HeaderFields::builder().apid(LONG_CADENCE).packet_id(BASELINE).data_length(7).build().encode(),
/// );
/// let mut stats = Statistics::default();
/// stats.count_packet(&header);
/// assert_eq!(stats.packets[&Product::LongCadenceBaseline], 1);
/// ```
#[derive(Debug, Default, Clone, Serialize)]
pub struct Statistics {
    pub packets: BTreeMap<Product, u64>,
    pub data_sets: BTreeMap<Product, u64>,
    /// Short cadence encoded data sets seen since the last flush.
    pub encoded_run: u64,
    /// Lengths of flushed short cadence encoded runs, in stream order.
    pub encoded_runs: Vec<u64>,
}

impl Statistics {
    pub fn count_packet(&mut self, header: &CcsdsHeader) {
        if let Some(product) = header.product() {
            *self.packets.entry(product).or_default() += 1;
        }
    }

    /// Count a completed data set, `header` being any member of it.
    ///
    /// Short cadence encoded data sets accumulate into a run that is flushed by the next
    /// non-encoded short cadence data set, or by a long cadence baseline or residual
    /// baseline data set. Short cadence encoded data is interleaved within the long
    /// cadence it belongs to, so long cadence baselines end the run as well.
    pub fn count_data_set(&mut self, header: &CcsdsHeader) {
        if let Some(product) = header.product() {
            *self.data_sets.entry(product).or_default() += 1;
        }

        match (header.apid, header.packet_id) {
            (SHORT_CADENCE, ENCODED) => self.encoded_run += 1,
            (SHORT_CADENCE, _) | (LONG_CADENCE, BASELINE | RESIDUAL_BASELINE) => {
                self.flush_encoded_run();
            }
            _ => {}
        }
    }

    fn flush_encoded_run(&mut self) {
        if self.encoded_run == 0 {
            return;
        }
        info!(count = self.encoded_run, "short cadence encoded data sets");
        self.encoded_runs.push(self.encoded_run);
        self.encoded_run = 0;
    }

    /// Total packets counted across all products.
    #[must_use]
    pub fn total_packets(&self) -> u64 {
        self.packets.values().sum()
    }

    /// Total data sets counted across all products.
    #[must_use]
    pub fn total_data_sets(&self) -> u64 {
        self.data_sets.values().sum()
    }
}
