use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// --- Search submission ---

/// Body layout expected by the search endpoint. Older API versions take the
/// query at the top level; newer ones nest it under a typed `arguments` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
    Flat,
    Typed { source_type: String, method: String },
}

impl Default for RequestShape {
    fn default() -> Self {
        RequestShape::Typed {
            source_type: "twitter-scraper".to_string(),
            method: "searchbyquery".to_string(),
        }
    }
}

/// A live search to submit.
#[derive(Debug, Clone)]
pub struct SearchInput {
    pub query: String,
    pub max_results: u32,
    pub shape: RequestShape,
}

impl SearchInput {
    pub fn new(query: impl Into<String>, max_results: u32) -> Self {
        Self {
            query: query.into(),
            max_results,
            shape: RequestShape::default(),
        }
    }

    pub fn with_shape(mut self, shape: RequestShape) -> Self {
        self.shape = shape;
        self
    }

    pub(crate) fn body(&self) -> SearchBody<'_> {
        match &self.shape {
            RequestShape::Flat => SearchBody::Flat(FlatSearchInput {
                query: &self.query,
                max_results: self.max_results,
            }),
            RequestShape::Typed {
                source_type,
                method,
            } => SearchBody::Typed(TypedSearchInput {
                source_type,
                arguments: SearchArguments {
                    method,
                    query: &self.query,
                    max_results: self.max_results,
                },
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum SearchBody<'a> {
    Flat(FlatSearchInput<'a>),
    Typed(TypedSearchInput<'a>),
}

#[derive(Debug, Serialize)]
pub(crate) struct FlatSearchInput<'a> {
    pub query: &'a str,
    pub max_results: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct TypedSearchInput<'a> {
    #[serde(rename = "type")]
    pub source_type: &'a str,
    pub arguments: SearchArguments<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchArguments<'a> {
    #[serde(rename = "type")]
    pub method: &'a str,
    pub query: &'a str,
    pub max_results: u32,
}

/// Response to a search submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
}

/// Response to a job status check.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

// --- Results ---

/// The results endpoint returns either a bare array or an object wrapping it
/// in `data`, depending on API version. Elements stay untyped here so one
/// malformed post cannot fail the whole batch; see [`decode_posts`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResultsEnvelope {
    Bare(Vec<Value>),
    Wrapped {
        #[serde(default)]
        data: Option<Vec<Value>>,
        #[serde(default, deserialize_with = "lenient_string")]
        error: Option<String>,
    },
}

/// Nested metadata block carried by the scraper's post objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMetadata {
    pub tweet_id: Option<String>,
    pub username: Option<String>,
}

/// A post exactly as one of the API versions returned it. Field names drift
/// between versions, and some payloads carry more than one spelling of the
/// same field, so each field is read from a priority list of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPost {
    pub external_id: Option<String>,
    pub id: Option<String>,
    pub content: Option<String>,
    pub username: Option<String>,
    pub permalink: Option<String>,
    pub metadata: Option<PostMetadata>,
}

const EXTERNAL_ID_KEYS: &[&str] = &["ExternalID", "external_id"];
const ID_KEYS: &[&str] = &["ID", "id"];
const CONTENT_KEYS: &[&str] = &["Content", "content", "text"];
const USERNAME_KEYS: &[&str] = &["Username", "username", "author"];
const PERMALINK_KEYS: &[&str] = &["Permalink", "permalink", "url"];
const METADATA_KEYS: &[&str] = &["Metadata", "metadata"];

/// A post normalized across API versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: String,
    pub author: String,
    pub body: String,
    pub permalink: Option<String>,
}

impl RawPost {
    /// Read a post object. Returns `None` for anything that is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let metadata = METADATA_KEYS
            .iter()
            .find_map(|key| fields.get(*key)?.as_object())
            .map(|meta| PostMetadata {
                tweet_id: first_string(meta, &["tweet_id"]),
                username: first_string(meta, &["username"]),
            });

        Some(Self {
            external_id: first_string(fields, EXTERNAL_ID_KEYS),
            id: first_string(fields, ID_KEYS),
            content: first_string(fields, CONTENT_KEYS),
            username: first_string(fields, USERNAME_KEYS),
            permalink: first_string(fields, PERMALINK_KEYS),
            metadata,
        })
    }

    /// The post's canonical id. Prefers the platform id over the scraper's
    /// internal row id.
    pub fn canonical_id(&self) -> Option<&str> {
        let metadata_id = self.metadata.as_ref().and_then(|m| m.tweet_id.as_deref());
        [self.external_id.as_deref(), metadata_id, self.id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
    }

    /// Convert to a `PostRecord`. Returns `None` when no id can be found.
    pub fn into_record(self) -> Option<PostRecord> {
        let id = self.canonical_id()?.to_string();
        let metadata = self.metadata.unwrap_or_default();
        let author = self.username.or(metadata.username).unwrap_or_default();
        Some(PostRecord {
            id,
            author: author.trim_start_matches('@').to_string(),
            body: self.content.unwrap_or_default(),
            permalink: self.permalink,
        })
    }
}

impl<'de> Deserialize<'de> for RawPost {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        RawPost::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("post is not a JSON object"))
    }
}

/// Read the posts of a result batch, skipping elements that are not objects.
pub fn decode_posts(values: Vec<Value>) -> Vec<RawPost> {
    let total = values.len();
    let posts: Vec<RawPost> = values.iter().filter_map(RawPost::from_value).collect();
    if posts.len() < total {
        tracing::warn!(
            skipped = total - posts.len(),
            total,
            "Skipped result entries that are not post objects"
        );
    }
    posts
}

/// Normalize a fetched batch, dropping entries without an id. Order is preserved.
pub fn normalize_posts(raw: Vec<RawPost>) -> Vec<PostRecord> {
    raw.into_iter().filter_map(RawPost::into_record).collect()
}

/// First key in `keys` holding a non-blank string or a number.
fn first_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Accept strings and numbers; anything else (objects, null) becomes `None`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
