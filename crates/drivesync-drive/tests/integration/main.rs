//! Integration tests for drivesync-drive
//!
//! Uses wiremock to simulate the Drive v2 API and verifies end-to-end
//! behavior of the DriveClient retry policy, change feed paging, listings,
//! uploads, and downloads.

mod common;

mod test_client;
mod test_feed;
mod test_provider;
