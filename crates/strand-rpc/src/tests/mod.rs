//! Behavioural suites exercising clients and servers end to end.

pub(crate) mod support;
