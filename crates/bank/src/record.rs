use crate::DocumentType;
use serde::Serialize;
use time::OffsetDateTime;

/// The last known content of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub document_type: DocumentType,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}
impl DocumentRecord {
    pub fn new(document_type: DocumentType, content: impl Into<String>) -> Self {
        Self { document_type, content: content.into(), last_updated: OffsetDateTime::now_utc() }
    }
}
