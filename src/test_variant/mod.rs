//! Test variants.
//!
//! The set of variants is closed: every place whose behavior differs per
//! variant matches on [`TestVariant`] explicitly.

use log::warn;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::invocation::{CommandBuilder, RemoteInvocation};

pub mod gtest;
pub mod sanity;
pub mod tast;

pub use gtest::GTestTest;
pub use sanity::BrowserSanityTest;
pub use tast::TastTest;

#[derive(Debug, Clone)]
pub enum TestVariant {
    GTest(GTestTest),
    Tast(TastTest),
    BrowserSanity(BrowserSanityTest),
}

impl TestVariant {
    /// Name under which the run is reported.
    pub fn suite_name(&self) -> &str {
        match self {
            TestVariant::GTest(t) => &t.test_exe,
            TestVariant::Tast(t) => &t.suite_name,
            TestVariant::BrowserSanity(_) => sanity::SANITY_TEST_TARGET,
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            TestVariant::GTest(t) => t.retries,
            TestVariant::Tast(t) => t.retries,
            TestVariant::BrowserSanity(_) => sanity::SANITY_RETRIES,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            TestVariant::GTest(t) => t.timeout,
            TestVariant::Tast(t) => t.timeout,
            TestVariant::BrowserSanity(_) => Some(sanity::SANITY_TIMEOUT),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries() + 1
    }

    /// Rejects contradictory inputs before anything is written or started.
    pub fn validate(&self, builder: &CommandBuilder) -> Result<()> {
        match self {
            TestVariant::GTest(t) => t.validate(builder),
            TestVariant::Tast(_) => Ok(()),
            TestVariant::BrowserSanity(t) => t.validate(),
        }
    }

    /// Validates, then builds the deployment-tool invocation. May write the
    /// on-device script, which the returned invocation owns.
    pub fn build_remote_invocation(&self, builder: &CommandBuilder) -> Result<RemoteInvocation> {
        self.validate(builder)?;
        match self {
            TestVariant::GTest(t) => t.build(builder),
            TestVariant::Tast(t) => t.build(builder),
            TestVariant::BrowserSanity(t) => t.build(builder),
        }
    }

    /// Destination of the synthetic single-test result document.
    ///
    /// GTest binaries write their own summary on the device, which the
    /// deployment tool copies to the same path, so none is synthesized.
    pub fn summary_output(&self) -> Option<&Path> {
        match self {
            TestVariant::GTest(_) => None,
            TestVariant::Tast(t) => t.test_launcher_summary_output.as_deref(),
            TestVariant::BrowserSanity(t) => t.test_launcher_summary_output.as_deref(),
        }
    }
}

/// Removes the GTest-only arguments remote drivers don't understand:
/// `--gtest_filter=<suite>` and any `--gtest_repeat*`. Returns what is left.
pub(crate) fn strip_gtest_args(args: &[String], suite_name: &str, what: &str) -> Vec<String> {
    let filter = format!("--gtest_filter={suite_name}");
    let mut remaining = Vec::with_capacity(args.len());
    for arg in args {
        if *arg == filter {
            warn!("GTest filtering not supported for {what}. The {arg} arg will be ignored.");
        } else if arg.starts_with("--gtest_repeat") {
            warn!("--gtest_repeat not supported for {what}. The {arg} arg will be ignored.");
        } else {
            remaining.push(arg.clone());
        }
    }
    remaining
}
