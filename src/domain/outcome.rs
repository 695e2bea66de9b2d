//! Search outcomes and the labels written for them

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classified result of a single search attempt.
///
/// Exactly one value is produced per attempt. When several page signals are
/// present at once the classifier resolves them in declaration order of
/// [`SearchOutcome::PRECEDENCE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchOutcome {
    /// A product page was reached
    Opened,
    NoProductsFound,
    /// CAPTCHA / access-denied page
    Blocked,
    /// The authentication form re-appeared (session expired)
    LoginRequired,
    Maintenance,
}

impl SearchOutcome {
    /// Evaluation order used on every poll tick.
    pub const PRECEDENCE: [Self; 5] = [
        Self::LoginRequired,
        Self::Maintenance,
        Self::Blocked,
        Self::NoProductsFound,
        Self::Opened,
    ];

    /// Signals that describe the site rather than the search result.
    pub const fn is_site_signal(self) -> bool {
        matches!(self, Self::LoginRequired | Self::Maintenance | Self::Blocked)
    }
}

/// Add-to-cart button state on a product page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddToCartState {
    Enabled,
    Disabled,
    Missing,
}

/// Cart-availability verdict column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartVerdict {
    Yes,
    No,
    NotApplicable,
}

impl CartVerdict {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::NotApplicable => "NA",
        }
    }
}

impl fmt::Display for CartVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status label written for each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordStatus {
    AddToCartPresent,
    AddToCartNotPresent,
    NoProductFound,
    Blocked,
    Maintenance,
    Failed,
    InvalidFormat,
}

impl RecordStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AddToCartPresent => "ADD TO CART PRESENT",
            Self::AddToCartNotPresent => "ADD TO CART NOT PRESENT",
            Self::NoProductFound => "NO PRODUCT FOUND",
            Self::Blocked => "BLOCKED",
            Self::Maintenance => "MAINTENANCE",
            Self::Failed => "FAILED",
            Self::InvalidFormat => "INVALID_FORMAT",
        }
    }

    /// Statuses that get a diagnostic snapshot.
    ///
    /// `InvalidFormat` is excluded: it is resolved without touching the session.
    pub const fn wants_snapshot(self) -> bool {
        matches!(
            self,
            Self::AddToCartNotPresent
                | Self::NoProductFound
                | Self::Blocked
                | Self::Maintenance
                | Self::Failed
        )
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::AddToCartPresent | Self::AddToCartNotPresent)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
