//! Normalized domain records
//!
//! Each record is keyed by the natural identifier used by the open-data
//! API. Storage adapters upsert on that key so re-fetching the same
//! external record never produces a duplicate row.

use serde::{Deserialize, Serialize};

use super::resource::ResourceType;

/// A member of parliament (`personlista.person`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sort_name: Option<String>,
    pub party: Option<String>,
    pub constituency: Option<String>,
    pub status: Option<String>,
    pub birth_year: Option<i64>,
    pub gender: Option<String>,
    pub image_url: Option<String>,
}

/// A speech held in the chamber (`anforandelista.anforande`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speech {
    pub document_id: String,
    pub speech_number: i64,
    pub speech_id: Option<String>,
    pub speaker: Option<String>,
    pub party: Option<String>,
    pub member_id: Option<String>,
    pub speech_date: Option<String>,
    pub section_heading: Option<String>,
    pub session_year: Option<String>,
    pub url: Option<String>,
}

/// A parliamentary document (`dokumentlista.dokument`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub session_year: Option<String>,
    pub designation: Option<String>,
    pub document_type: Option<String>,
    pub subtype: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub date: Option<String>,
    pub organ: Option<String>,
    pub published_at: Option<String>,
    pub url: Option<String>,
}

/// One member's vote in one voting round (`voteringlista.votering`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote_id: String,
    pub member_id: String,
    pub name: Option<String>,
    pub party: Option<String>,
    pub constituency: Option<String>,
    pub vote: Option<String>,
    pub subject: Option<String>,
    pub designation: Option<String>,
    pub item_number: Option<i64>,
    pub session_year: Option<String>,
    pub vote_date: Option<String>,
}

/// Any record produced by the resource mapper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedRecord {
    Member(Member),
    Speech(Speech),
    Document(Document),
    Vote(VoteRecord),
}

impl NormalizedRecord {
    /// Resource type the record belongs to
    pub fn resource_type(&self) -> ResourceType {
        match self {
            NormalizedRecord::Member(_) => ResourceType::Members,
            NormalizedRecord::Speech(_) => ResourceType::Speeches,
            NormalizedRecord::Document(_) => ResourceType::Documents,
            NormalizedRecord::Vote(_) => ResourceType::Votes,
        }
    }

    /// Natural key rendered for logs, composite keys joined with `/`
    pub fn natural_key(&self) -> String {
        match self {
            NormalizedRecord::Member(m) => m.member_id.clone(),
            NormalizedRecord::Speech(s) => format!("{}/{}", s.document_id, s.speech_number),
            NormalizedRecord::Document(d) => d.document_id.clone(),
            NormalizedRecord::Vote(v) => format!("{}/{}", v.vote_id, v.member_id),
        }
    }
}
