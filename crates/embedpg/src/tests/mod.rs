//! Test suites for the embedded engine lifecycle.

pub(crate) mod support;
