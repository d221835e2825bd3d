// tests/integration_test.rs

//! Integration tests for RDS.
//!
//! These exercise the control API and the reconciliation pipeline against a
//! real, in-process master or lifecycle backend (tempdir-backed), as
//! opposed to the flat `tests/unit_*_test.rs` files which test pure-logic
//! modules through the public crate API in isolation.

mod integration {
    pub mod control_api_test;
    pub mod reconciliation_test;
    pub mod test_helpers;
}
