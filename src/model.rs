//! Domain types shared by the synchronization core, the network client and storage.
//!
//! Bills are immutable once received: the core only ever replaces the whole feed,
//! it never edits a bill in place. The only user-mutable state is [`User`]'s
//! liked set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable bill identity (the bill number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(pub i64);

impl fmt::Display for BillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepresentativeId(pub i64);

// ============================================================================
// Bill
// ============================================================================

/// Bill number, general assembly number and chamber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillMetadata {
    pub number: BillId,
    #[serde(default)]
    pub assembly: i64,
    #[serde(default)]
    pub chamber: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Policy area of a bill. Serialized with the short labels the feed API uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillCategory {
    Agriculture,
    #[serde(rename = "Justice")]
    CriminalCivilJustice,
    #[serde(rename = "Economy")]
    EconomyFinance,
    #[serde(rename = "K-12")]
    ElementarySecondaryEducation,
    #[serde(rename = "College")]
    HigherEducation,
    #[serde(rename = "Energy")]
    EnergyEnvironment,
    Healthcare,
    Infrastructure,
    Internal,
    #[serde(rename = "Labor")]
    LaborCommerce,
    Pensions,
    #[serde(rename = "Utility")]
    PublicUtilities,
    #[serde(rename = "Government")]
    StateLocalGovernment,
    #[serde(rename = "Taxes")]
    Taxation,
    #[serde(rename = "Tech")]
    Technology,
    #[serde(rename = "VA")]
    VeteransAffairs,
    #[serde(rename = "DNE")]
    DoesNotExist,
    /// Also the fallback for labels this build does not know.
    #[default]
    #[serde(other)]
    Other,
}

/// A single action in the bill's legislative history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillAction {
    /// Unix timestamp (seconds).
    pub date: i64,
    #[serde(default)]
    pub chamber: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub metadata: BillMetadata,
    pub title: String,
    #[serde(default)]
    pub category: BillCategory,
    #[serde(default)]
    pub short_summary: Option<String>,
    #[serde(default)]
    pub full_summary: Option<String>,
    #[serde(default)]
    pub sponsor_ids: Vec<RepresentativeId>,
    #[serde(default)]
    pub actions: Vec<BillAction>,
    #[serde(default)]
    pub created: Option<i64>,
}

impl Bill {
    pub fn id(&self) -> BillId {
        self.metadata.number
    }
}

// ============================================================================
// Representatives
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    pub id: RepresentativeId,
    pub name: String,
    #[serde(default)]
    pub party: Option<String>,
    #[serde(default)]
    pub chamber: Option<String>,
    #[serde(default)]
    pub district: Option<i64>,
}

/// Representatives keyed by identity. Ordered so that snapshots serialize stably.
pub type Representatives = BTreeMap<RepresentativeId, Representative>;

// ============================================================================
// User
// ============================================================================

/// The current user's like membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    liked: HashSet<BillId>,
}

impl User {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_liked(&self, bill: BillId) -> bool {
        self.liked.contains(&bill)
    }

    /// Set membership for `bill`, returning the previous value.
    pub(crate) fn set_liked(&mut self, bill: BillId, liked: bool) -> bool {
        if liked {
            !self.liked.insert(bill)
        } else {
            self.liked.remove(&bill)
        }
    }

    /// Liked bills in ascending order.
    pub fn liked(&self) -> Vec<BillId> {
        let mut ids: Vec<BillId> = self.liked.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl FromIterator<BillId> for User {
    fn from_iter<I: IntoIterator<Item = BillId>>(iter: I) -> Self {
        Self {
            liked: iter.into_iter().collect(),
        }
    }
}
