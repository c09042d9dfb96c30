//! Port traits for covdelta's hexagonal architecture.
//!
//! Running tests, talking to version control and reading the clock are
//! external concerns. The application layer only sees these traits.

use std::path::Path;

/// Port for the external test runner.
pub trait TestRunner {
    /// Run the suite so that it writes a JSON results document to `output_path`.
    ///
    /// An error here is not fatal to the caller: a missing results file is
    /// handled like any other absent report.
    fn run(&self, output_path: &Path) -> Result<(), String>;
}

/// Port for the version-control collaborator.
pub trait VersionControl {
    /// Return the changed file paths between two refs, one path per line.
    fn changed_paths(&self, base: &str, head: &str) -> Result<String, String>;

    /// Check out `reference` in the working tree.
    fn checkout(&self, reference: &str) -> Result<(), String>;
}

/// Port for obtaining the current UTC time.
pub trait Clock {
    /// Returns the current time in UTC.
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

/// System clock implementation that returns the actual current time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}
