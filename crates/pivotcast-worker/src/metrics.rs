//! Metric events, emitted as `trace!` records.
//!
//! Subscribers that care (the CLI with `PIVOTCAST_LOG=trace`, or an exporter in
//! an embedding application) pick them up by target.

pub fn emit_event(event: &str, key_values: &[(&str, String)]) {
    for (k, v) in key_values {
        tracing::trace!(target: "pivotcast::metrics", %event, %k, %v, "metric");
    }
}
