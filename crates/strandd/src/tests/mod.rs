//! Test suites for the strand daemon.

mod daemon_behaviour;
mod support;
