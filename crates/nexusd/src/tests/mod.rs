//! Test suites for the Nexus daemon.

mod support;
