//! Documents, change events and the request record they carry.

use serde_json::{Map, Value};

/// A Firestore document with its fields decoded to plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Last segment of `name`.
    pub id: String,
    /// Full resource name, `projects/{p}/databases/{d}/documents/{collection}/{id}`.
    pub name: String,
    pub fields: Map<String, Value>,
    pub update_time: Option<String>
}

impl Document {
    pub fn new(name: impl Into<String>, fields: Map<String, Value>, update_time: Option<String>) -> Self {
        let name = name.into();
        let id = name.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            id,
            name,
            fields,
            update_time
        }
    }
}

/// How a document changed between two snapshots of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed"
        };
        f.write_str(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document
}

/// The request fields stored by the upstream webhook receiver.
///
/// Extraction is lenient: fields of the wrong shape are treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardableRequest {
    pub method: Option<String>,
    pub headers: Option<Map<String, Value>>,
    pub query: Option<Map<String, Value>>,
    pub body: Option<Value>,
    pub webhook_name: Option<String>,
    pub date_added: Option<String>
}

impl ForwardableRequest {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let string = |name: &str| fields.get(name).and_then(Value::as_str).map(str::to_string);
        let object = |name: &str| fields.get(name).and_then(Value::as_object).cloned();

        Self {
            method: string("method"),
            headers: object("headers"),
            query: object("query"),
            body: fields.get("body").cloned(),
            webhook_name: string("webhookName"),
            date_added: string("dateAdded")
        }
    }
}

impl From<&Document> for ForwardableRequest {
    fn from(document: &Document) -> Self {
        Self::from_fields(&document.fields)
    }
}
