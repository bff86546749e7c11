//! Group-chat listing detection and draft property creation.

use crate::model::DraftProperty;
use crate::phone;
use crate::store::{DraftOutcome, Store, StoreError};
use chrono::Utc;

/// Listing vocabulary (Hebrew and English). No entry is a substring of another, so one word counts once.
pub const LISTING_KEYWORDS: &[&str] = &[
    "למכירה",
    "להשכרה",
    "חדרים",
    "מחיר",
    "דירה",
    "נכס",
    "מ\"ר",
    "for sale",
    "for rent",
    "rooms",
    "price",
    "property",
    "sqm",
];

/// Distinct keywords needed before a group message counts as a listing.
pub const LISTING_THRESHOLD: usize = 2;

/// Distinct vocabulary entries present in `text` (case-insensitive substring match).
pub fn matched_keywords(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    LISTING_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect()
}

pub fn detect_listing(text: &str) -> bool {
    matched_keywords(text).len() >= LISTING_THRESHOLD
}

/// Stores a draft property for listing-like group messages.
pub struct ListingDrafter<'a> {
    store: &'a dyn Store,
    country_code: &'a str,
}

impl<'a> ListingDrafter<'a> {
    pub fn new(store: &'a dyn Store, country_code: &'a str) -> Self {
        Self {
            store,
            country_code,
        }
    }

    /// `None` when the text is not a listing. A redelivered message (same external id) yields
    /// `AlreadyDrafted` with the earlier draft's id.
    pub async fn draft_if_listing(
        &self,
        agency_id: &str,
        group_id: &str,
        sender: &str,
        text: &str,
        external_message_id: Option<String>,
    ) -> Result<Option<DraftOutcome>, StoreError> {
        if !detect_listing(text) {
            return Ok(None);
        }
        let draft = DraftProperty {
            id: uuid::Uuid::new_v4().to_string(),
            agency_id: agency_id.to_string(),
            source: "group-derived".to_string(),
            group_id: group_id.to_string(),
            external_agent_phone: phone::normalize_with(sender, self.country_code),
            raw_description: text.to_string(),
            status: "draft".to_string(),
            external_message_id,
            created_at: Utc::now(),
        };
        Ok(Some(self.store.insert_draft_property(draft).await?))
    }
}
