pub mod admin;
pub mod health;
pub mod media;
pub mod messages;

use domains::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Success body shared by every mutating route.
#[derive(Debug, Serialize)]
pub struct Ack<T: Serialize = ()> {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> Ack<T> {
    pub fn with(message: impl Into<String>, data: T) -> Self {
        Self {
            status: 200,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Body of the admin routes that act on one document. The frontend sends
/// the id as `_id`.
#[derive(Debug, Deserialize)]
pub struct IdRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl PageQuery {
    pub fn page_request(&self) -> Result<domains::PageRequest, DomainError> {
        Ok(domains::PageRequest::new(
            parse_number(self.page.as_deref(), "page")?,
            parse_number(self.limit.as_deref(), "limit")?,
        ))
    }
}

fn parse_number(raw: Option<&str>, field: &str) -> Result<Option<u32>, DomainError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| DomainError::InvalidInput(format!("{field} must be a positive number"))),
    }
}

pub fn parse_id(raw: Option<&str>) -> Result<Uuid, DomainError> {
    let raw = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DomainError::InvalidInput("_id is required".to_string()))?;
    raw.parse()
        .map_err(|_| DomainError::InvalidInput(format!("'{raw}' is not a valid id")))
}
