//! Document model: the `post` / `user` entities replicated between sites,
//! plus the GeoJSON point type and ISO-8601 timestamp parsing they share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DbError, Result};

/// GeoJSON `Point`, `[lon, lat]` with `-180<=lon<=180`, `-90<=lat<=90`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [lon, lat],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.kind != "Point" {
            return Err(DbError::Validation(
                "Location type must be 'Point'".to_string(),
            ));
        }
        let [lon, lat] = self.coordinates;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(DbError::Validation("Invalid coordinate values".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Shelter,
    Food,
    Medical,
    Water,
    Safety,
    Help,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Shelter => "shelter",
            PostType::Food => "food",
            PostType::Medical => "medical",
            PostType::Water => "water",
            PostType::Safety => "safety",
            PostType::Help => "help",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "shelter" => Ok(PostType::Shelter),
            "food" => Ok(PostType::Food),
            "medical" => Ok(PostType::Medical),
            "water" => Ok(PostType::Water),
            "safety" => Ok(PostType::Safety),
            "help" => Ok(PostType::Help),
            other => Err(DbError::Validation(format!(
                "Post type must be one of: {}, got '{other}'",
                crate::config::VALID_POST_TYPES.join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostData {
    pub post_id: String,
    pub user_id: String,
    pub post_type: PostType,
    pub message: String,
    pub location: GeoPoint,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl PostData {
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(DbError::Validation("Message is required".to_string()));
        }
        if self.region.is_empty() {
            return Err(DbError::Validation("Region is required".to_string()));
        }
        self.location.validate()?;
        if self.post_type != PostType::Shelter && self.capacity.is_some() {
            // capacity is only meaningful for shelters; silently allowed on
            // the wire elsewhere, but a fresh local write should not carry it.
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub region: String,
    pub location: GeoPoint,
    pub verified: bool,
    pub reputation: i64,
    pub created_at: DateTime<Utc>,
}

impl UserData {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::Validation("Name is required".to_string()));
        }
        if !self.email.contains('@') {
            return Err(DbError::Validation("Valid email is required".to_string()));
        }
        if self.region.is_empty() {
            return Err(DbError::Validation("Region is required".to_string()));
        }
        self.location.validate()?;
        Ok(())
    }
}

/// Parses an ISO-8601 timestamp field (accepting both `Z` and `+00:00`
/// suffixes) out of a raw JSON document.
pub fn extract_timestamp(value: &Value, field: &str) -> Option<DateTime<Utc>> {
    value.get(field).and_then(|v| v.as_str()).and_then(parse_timestamp)
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let normalized = s.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_rejects_out_of_range_coordinates() {
        let bad = GeoPoint::new(200.0, 10.0);
        assert!(bad.validate().is_err());
        let good = GeoPoint::new(-122.4, 37.7);
        assert!(good.validate().is_ok());
    }

    #[test]
    fn post_type_round_trips_through_strings() {
        for s in crate::config::VALID_POST_TYPES {
            let parsed = PostType::parse(s).unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!(PostType::parse("garbage").is_err());
    }

    #[test]
    fn timestamp_parses_both_z_and_offset_suffixes() {
        let a = parse_timestamp("2026-01-01T00:00:00Z").unwrap();
        let b = parse_timestamp("2026-01-01T00:00:00+00:00").unwrap();
        assert_eq!(a, b);
    }
}
