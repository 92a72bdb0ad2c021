// tests/property_test.rs

//! Property-based / invariant tests for the properties spec.md §8 names
//! directly (P1-P3, P7, P10). P4-P6, P9 are exercised end-to-end in
//! `tests/integration/{transaction,pubsub}_test.rs` instead, since they
//! need a full `Server`/connection pair rather than a single component.

mod property {
    pub mod consistency_test;
}
