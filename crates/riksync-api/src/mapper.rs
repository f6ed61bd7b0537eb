//! Resource mapper: listing payloads to normalized records
//!
//! Every listing answers with the same nested shape,
//! `{ "<wrapper>": { "<item>": Item | [Item, ...] | null } }`, where a
//! single result is sent as a bare object rather than a one-element array.
//! [`extract_items`] flattens that shape; [`map_item`] turns one raw item
//! into a [`NormalizedRecord`].
//!
//! ## Usage
//!
//! ```rust
//! use riksync_api::mapper::{extract_items, map_item};
//! use riksync_core::domain::ResourceType;
//!
//! let payload = serde_json::json!({
//!     "personlista": { "person": { "intressent_id": "0123", "parti": "S" } }
//! });
//! let items = extract_items(ResourceType::Members, &payload);
//! assert_eq!(items.len(), 1);
//! let record = map_item(ResourceType::Members, items[0].clone()).unwrap();
//! assert!(record.is_some());
//! ```

use riksync_core::domain::{
    Document, Member, NormalizedRecord, ResourceType, Speech, VoteRecord,
};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Error raised for an item that cannot be normalized
#[derive(Debug, Error)]
pub enum MapError {
    #[error("malformed {resource_type} item: {source}")]
    Malformed {
        resource_type: ResourceType,
        #[source]
        source: serde_json::Error,
    },
}

/// Wrapper and item keys of a resource listing
pub fn listing_keys(resource_type: ResourceType) -> (&'static str, &'static str) {
    match resource_type {
        ResourceType::Members => ("personlista", "person"),
        ResourceType::Speeches => ("anforandelista", "anforande"),
        ResourceType::Documents => ("dokumentlista", "dokument"),
        ResourceType::Votes => ("voteringlista", "votering"),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Value>),
    One(Value),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<Value> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Extracts the raw items of a listing payload.
///
/// A missing or null wrapper, a missing or null item key, and an empty
/// array all yield an empty list. Null array entries are dropped.
pub fn extract_items(resource_type: ResourceType, payload: &Value) -> Vec<Value> {
    let (wrapper, item) = listing_keys(resource_type);
    let leaf = match payload.get(wrapper).and_then(|w| w.get(item)) {
        Some(Value::Null) | None => return Vec::new(),
        Some(leaf) => leaf.clone(),
    };

    match serde_json::from_value::<OneOrMany>(leaf) {
        Ok(items) => items.into_vec().into_iter().filter(|v| !v.is_null()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Normalizes one raw item.
///
/// Returns `Ok(None)` when the item lacks its natural key; such items are
/// dropped by the caller.
pub fn map_item(
    resource_type: ResourceType,
    item: Value,
) -> Result<Option<NormalizedRecord>, MapError> {
    let record = match resource_type {
        ResourceType::Members => {
            decode::<RawPerson>(resource_type, item)?.into_member().map(NormalizedRecord::Member)
        }
        ResourceType::Speeches => decode::<RawSpeech>(resource_type, item)?
            .into_speech()
            .map(NormalizedRecord::Speech),
        ResourceType::Documents => decode::<RawDocument>(resource_type, item)?
            .into_document()
            .map(NormalizedRecord::Document),
        ResourceType::Votes => {
            decode::<RawVote>(resource_type, item)?.into_vote().map(NormalizedRecord::Vote)
        }
    };

    if record.is_none() {
        tracing::debug!(resource = %resource_type, "Dropping item without natural key");
    }
    Ok(record)
}

fn decode<T: DeserializeOwned>(resource_type: ResourceType, item: Value) -> Result<T, MapError> {
    serde_json::from_value(item).map_err(|source| MapError::Malformed {
        resource_type,
        source,
    })
}

// ============================================================================
// Lenient field decoding
// ============================================================================

/// Accepts strings, numbers and booleans; blank strings become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string, found {}",
            other
        ))),
    }
}

/// Accepts integers and numeric strings; blank strings become `None`.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, found {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, found {:?}", s))),
        Some(other) => Err(D::Error::custom(format!(
            "expected an integer, found {}",
            other
        ))),
    }
}

// ============================================================================
// Raw listing items
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPerson {
    #[serde(default, deserialize_with = "lenient_string")]
    intressent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    tilltalsnamn: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    efternamn: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    sorteringsnamn: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    parti: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    valkrets: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    fodd_ar: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    kon: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    bild_url_192: Option<String>,
}

impl RawPerson {
    fn into_member(self) -> Option<Member> {
        Some(Member {
            member_id: self.intressent_id?,
            first_name: self.tilltalsnamn,
            last_name: self.efternamn,
            sort_name: self.sorteringsnamn,
            party: self.parti,
            constituency: self.valkrets,
            status: self.status,
            birth_year: self.fodd_ar,
            gender: self.kon,
            image_url: self.bild_url_192,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSpeech {
    #[serde(default, deserialize_with = "lenient_string")]
    dok_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    anforande_nummer: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    anforande_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    talare: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    parti: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    intressent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    dok_datum: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    avsnittsrubrik: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    dok_rm: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    anforande_url_html: Option<String>,
}

impl RawSpeech {
    fn into_speech(self) -> Option<Speech> {
        Some(Speech {
            document_id: self.dok_id?,
            speech_number: self.anforande_nummer?,
            speech_id: self.anforande_id,
            speaker: self.talare,
            party: self.parti,
            member_id: self.intressent_id,
            speech_date: self.dok_datum,
            section_heading: self.avsnittsrubrik,
            session_year: self.dok_rm,
            url: self.anforande_url_html,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    dok_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    rm: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beteckning: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    doktyp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    subtyp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    titel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    undertitel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    datum: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    organ: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    publicerad: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    dokument_url_html: Option<String>,
}

impl RawDocument {
    fn into_document(self) -> Option<Document> {
        Some(Document {
            document_id: self.dok_id?,
            session_year: self.rm,
            designation: self.beteckning,
            document_type: self.doktyp,
            subtype: self.subtyp,
            title: self.titel,
            subtitle: self.undertitel,
            date: self.datum,
            organ: self.organ,
            published_at: self.publicerad,
            url: self.dokument_url_html,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawVote {
    #[serde(default, deserialize_with = "lenient_string")]
    votering_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    intressent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    namn: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    parti: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    valkrets: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    rost: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    avser: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    beteckning: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    punkt: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    rm: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    datum: Option<String>,
}

impl RawVote {
    fn into_vote(self) -> Option<VoteRecord> {
        Some(VoteRecord {
            vote_id: self.votering_id?,
            member_id: self.intressent_id?,
            name: self.namn,
            party: self.parti,
            constituency: self.valkrets,
            vote: self.rost,
            subject: self.avser,
            designation: self.beteckning,
            item_number: self.punkt,
            session_year: self.rm,
            vote_date: self.datum,
        })
    }
}
