//! Matching inbound senders to existing leads, and duplicate suppression for redelivered events.

use crate::model::Lead;
use crate::phone;
use crate::store::{Store, StoreError};

/// Lead of `agency_id` whose phone equals the normalized `raw_phone` (first match).
pub async fn find_lead_by_phone(
    store: &dyn Store,
    agency_id: &str,
    raw_phone: &str,
    country_code: &str,
) -> Result<Option<Lead>, StoreError> {
    let normalized = phone::normalize_with(raw_phone, country_code);
    if normalized.is_empty() {
        return Ok(None);
    }
    store
        .find_lead_by_phone(agency_id, &normalized, country_code)
        .await
}

/// True when the lead already holds a message with this provider id. Absent id => never a duplicate.
pub async fn is_duplicate(
    store: &dyn Store,
    lead_id: &str,
    external_message_id: Option<&str>,
) -> Result<bool, StoreError> {
    match external_message_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => store.message_exists(lead_id, id).await,
        None => Ok(false),
    }
}
