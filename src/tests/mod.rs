//! End-to-end tests.
//!
//! These drive the full router against a wiremock upstream, once per wire variant.
