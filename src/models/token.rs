use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PayloadError;

/// Field delimiter of the embedded-scope payload scheme.
pub const PAYLOAD_DELIMITER: char = '+';

/// Attributes narrowing a token's validity, e.g. a service date and a
/// direction of travel. Ordered: field order is significant for equality and
/// for the canonical payload form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope(Vec<String>);

impl Scope {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Lifecycle state of an admission token.
///
/// Transitions only `Unused → Used`, exactly once, irreversibly. A token is
/// never created already used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    Unused,
    Used,
}

impl TokenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenState::Unused => "unused",
            TokenState::Used => "used",
        }
    }
}

/// A single-use admission credential as held by the token store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: String,
    /// Identifier of the rights-holder (contact/enrollment reference).
    pub subject: String,
    pub scope: Scope,
    pub state: TokenState,
    /// Set if and only if `state == Used`.
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// A freshly issued, unused token.
    pub fn issue(id: impl Into<String>, subject: impl Into<String>, scope: Scope) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            scope,
            state: TokenState::Unused,
            used_at: None,
            created_at: Utc::now(),
        }
    }
}

/// The canonical store id of an embedded-scheme token: the full payload
/// string, `subject+scopeField1+scopeField2`.
pub fn embedded_id(subject: &str, scope: &Scope) -> String {
    let mut id = subject.to_string();
    for field in scope.fields() {
        id.push(PAYLOAD_DELIMITER);
        id.push_str(field);
    }
    id
}

/// A raw decoded string resolved into one of the two supported schemes.
///
/// * `Opaque` — a random token id; subject and scope live only on the
///   stored record.
/// * `Embedded` — `subject+scopeField1+scopeField2`; the stored record's id
///   is the full canonical payload. Embedded fields are informational and
///   verified against the issued record — scope is issuer-fixed, never
///   client-asserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedPayload {
    Opaque(String),
    Embedded { subject: String, scope: Scope },
}

impl ScannedPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PayloadError::Empty);
        }
        if !raw.contains(PAYLOAD_DELIMITER) {
            return Ok(Self::Opaque(raw.to_string()));
        }
        let parts: Vec<&str> = raw.split(PAYLOAD_DELIMITER).collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(PayloadError::EmptySegment);
        }
        Ok(Self::Embedded {
            subject: parts[0].to_string(),
            scope: Scope::new(parts[1..].iter().copied()),
        })
    }

    /// The store lookup key for this payload.
    pub fn token_id(&self) -> String {
        match self {
            Self::Opaque(id) => id.clone(),
            Self::Embedded { subject, scope } => embedded_id(subject, scope),
        }
    }
}
