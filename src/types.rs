//! Typed records exchanged with the remote store and carried through the pipeline.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display};

/// The kinds of entity the remote store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Organization,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contact => f.write_str("contact"),
            Self::Organization => f.write_str("organization"),
        }
    }
}

/// A record as the remote store returns it: an id and a bag of selected properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter, mostly for fixtures.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Compile-time description of one entity kind's field set.
pub trait EntityRecord: DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    const KIND: EntityKind;
    /// Properties requested from the store for this kind.
    const PROPERTIES: &'static [&'static str];
    /// Fields matched against search tokens (one filter group per field per token).
    const SEARCH_FIELDS: &'static [&'static str];
    /// Field holding the role/category used by scoped searches.
    const CATEGORY_FIELD: &'static str;
}

/// Organization-like record (an agency, a firm).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    pub name: Option<String>,
    pub address: Option<String>,
    pub suburb: Option<String>,
    pub phone: Option<String>,
    pub category: Option<String>,
}

impl Organization {
    /// Address and suburb joined into one free-text location field.
    pub fn location_text(&self) -> String {
        join_present(&[self.address.as_deref(), self.suburb.as_deref()], ", ")
    }
}

impl EntityRecord for Organization {
    const KIND: EntityKind = EntityKind::Organization;
    const PROPERTIES: &'static [&'static str] = &["name", "address", "suburb", "phone", "category"];
    const SEARCH_FIELDS: &'static [&'static str] = &["name"];
    const CATEGORY_FIELD: &'static str = "category";
}

/// Contact-like record (a person).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    #[serde(rename = "firstname")]
    pub first_name: Option<String>,
    #[serde(rename = "lastname")]
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "mobilephone")]
    pub mobile_phone: Option<String>,
    pub suburb: Option<String>,
    pub category: Option<String>,
}

impl Contact {
    pub fn full_name(&self) -> String {
        join_present(&[self.first_name.as_deref(), self.last_name.as_deref()], " ")
    }

    /// Every phone number on file, landline first.
    pub fn phones(&self) -> impl Iterator<Item = &str> {
        [self.phone.as_deref(), self.mobile_phone.as_deref()]
            .into_iter()
            .flatten()
    }
}

impl EntityRecord for Contact {
    const KIND: EntityKind = EntityKind::Contact;
    const PROPERTIES: &'static [&'static str] = &[
        "firstname",
        "lastname",
        "email",
        "phone",
        "mobilephone",
        "suburb",
        "category",
    ];
    const SEARCH_FIELDS: &'static [&'static str] = &["firstname", "lastname"];
    const CATEGORY_FIELD: &'static str = "category";
}

/// A typed record fetched from the store as part of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate<R> {
    pub id: String,
    pub record: R,
}

impl<R: EntityRecord> Candidate<R> {
    /// Convert the store's property bag into the typed record.
    ///
    /// Blank values are treated as absent; unknown properties are ignored.
    pub fn from_raw(raw: RawRecord) -> Result<Self, serde_json::Error> {
        let properties: serde_json::Map<String, serde_json::Value> = raw
            .properties
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (key, serde_json::Value::String(value)))
            .collect();
        let record = serde_json::from_value(serde_json::Value::Object(properties))?;
        Ok(Self { id: raw.id, record })
    }
}

/// A contact plus its affiliated organization(s), fetched by fan-out.
///
/// `affiliates` is empty when the fan-out failed or found nothing; the composite
/// still takes part in ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeCandidate {
    pub contact: Candidate<Contact>,
    pub affiliates: Vec<Candidate<Organization>>,
}

impl CompositeCandidate {
    pub const fn unaffiliated(contact: Candidate<Contact>) -> Self {
        Self {
            contact,
            affiliates: Vec::new(),
        }
    }

    /// The primary affiliation, if any was resolved.
    pub fn affiliate(&self) -> Option<&Candidate<Organization>> {
        self.affiliates.first()
    }
}

/// Identity used for deterministic tie-breaking.
pub trait CandidateId {
    fn candidate_id(&self) -> &str;
}

impl<R> CandidateId for Candidate<R> {
    fn candidate_id(&self) -> &str {
        &self.id
    }
}

impl CandidateId for CompositeCandidate {
    fn candidate_id(&self) -> &str {
        &self.contact.id
    }
}

fn join_present(parts: &[Option<&str>], separator: &str) -> String {
    parts
        .iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}
