//! Integration tests for riksync-api
//!
//! Uses wiremock to simulate the Riksdag open-data API and verifies
//! end-to-end behavior of the OpenDataClient: query construction, body
//! classification, retries, circuit breaking and health checking.

mod common;

mod test_fetch;
mod test_resilience;
