//! Network collaborator for the bills API.
//!
//! The synchronization core never calls the network itself. [`BillsApi`] is the
//! seam a [`Session`](crate::session::Session) drives; [`HttpBillsApi`] is the
//! production implementation and owns the retry policy.

mod http;

pub use http::{FetchError, HttpBillsApi};

use crate::model::{Bill, BillId, Representatives};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of a successful feed fetch.
///
/// `reps` is optional on the wire. Absent or `null` means the server did not
/// send representatives this time, not that there are none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPayload {
    pub bills: Vec<Bill>,
    #[serde(default)]
    pub reps: Option<Representatives>,
}

#[async_trait]
pub trait BillsApi: Send + Sync {
    async fn fetch_feed(&self) -> Result<FeedPayload, FetchError>;

    async fn set_like(&self, bill: BillId, liked: bool) -> Result<(), FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepresentativeId;

    #[test]
    fn test_payload_without_reps() {
        let json = r#"{"bills": [{"metadata": {"number": 1}, "title": "A"}]}"#;
        let payload: FeedPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.bills.len(), 1);
        assert!(payload.reps.is_none());
    }

    #[test]
    fn test_payload_with_null_reps() {
        let payload: FeedPayload = serde_json::from_str(r#"{"bills": [], "reps": null}"#).unwrap();
        assert!(payload.reps.is_none());
    }

    #[test]
    fn test_payload_with_reps_keyed_by_id() {
        let json = r#"{
            "bills": [],
            "reps": {"42": {"id": 42, "name": "Pat Doe", "party": "I", "district": 7}}
        }"#;
        let payload: FeedPayload = serde_json::from_str(json).unwrap();
        let reps = payload.reps.unwrap();
        assert_eq!(reps[&RepresentativeId(42)].name, "Pat Doe");
        assert_eq!(reps[&RepresentativeId(42)].district, Some(7));
    }
}
