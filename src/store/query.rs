//! Query-by-example and update operators for the in-memory store, scaled
//! scoped to the handful of predicates this system actually issues: field
//! equality,
//! "synced_to doesn't yet cover every peer", "older than a cutoff", and a
//! geospatial near-query for help-requests.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{DbError, Result};
use crate::store::document::parse_timestamp;

#[derive(Debug, Clone)]
enum Condition {
    Eq(String, Value),
    /// True when `field` (a JSON array) does not contain every element of
    /// `superset` — the push-eligibility predicate.
    NotSupersetOf(String, Vec<String>),
    /// True when `field` (a JSON array) contains every element of `superset`
    /// — the GC eligibility predicate.
    SupersetOf(String, Vec<String>),
    /// True when `field`, parsed as a timestamp, is strictly before `cutoff`.
    OlderThan(String, DateTime<Utc>),
    /// True when `field` (a GeoPoint) lies within `radius_m` meters of
    /// `(lon, lat)`, using the haversine formula.
    Near {
        field: String,
        lon: f64,
        lat: f64,
        radius_m: f64,
    },
}

/// A conjunction of conditions (`all()` with no conditions matches
/// everything), mirroring the empty-query-means-match-all convention of the
/// original service's `db_service.find_many(coll, {})`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            conditions: vec![Condition::Eq(field.into(), value.into())],
        }
    }

    pub fn and_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    pub fn and_not_superset_of(mut self, field: impl Into<String>, superset: Vec<String>) -> Self {
        self.conditions
            .push(Condition::NotSupersetOf(field.into(), superset));
        self
    }

    pub fn and_superset_of(mut self, field: impl Into<String>, superset: Vec<String>) -> Self {
        self.conditions
            .push(Condition::SupersetOf(field.into(), superset));
        self
    }

    pub fn and_older_than(mut self, field: impl Into<String>, cutoff: DateTime<Utc>) -> Self {
        self.conditions.push(Condition::OlderThan(field.into(), cutoff));
        self
    }

    pub fn near(field: impl Into<String>, lon: f64, lat: f64, radius_m: f64) -> Self {
        Self {
            conditions: vec![Condition::Near {
                field: field.into(),
                lon,
                lat,
                radius_m,
            }],
        }
    }

    pub fn and_near(mut self, field: impl Into<String>, lon: f64, lat: f64, radius_m: f64) -> Self {
        self.conditions.push(Condition::Near {
            field: field.into(),
            lon,
            lat,
            radius_m,
        });
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
    }
}

impl Condition {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Eq(field, expected) => doc.get(field) == Some(expected),
            Condition::NotSupersetOf(field, superset) => {
                let current = array_as_strings(doc.get(field));
                !superset.iter().all(|s| current.contains(s))
            }
            Condition::SupersetOf(field, superset) => {
                let current = array_as_strings(doc.get(field));
                superset.iter().all(|s| current.contains(s))
            }
            Condition::OlderThan(field, cutoff) => doc
                .get(field)
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .map(|ts| ts < *cutoff)
                .unwrap_or(false),
            Condition::Near {
                field,
                lon,
                lat,
                radius_m,
            } => doc
                .get(field)
                .and_then(|v| v.get("coordinates"))
                .and_then(Value::as_array)
                .and_then(|coords| {
                    let a = coords.first()?.as_f64()?;
                    let b = coords.get(1)?.as_f64()?;
                    Some(haversine_meters(*lon, *lat, a, b) <= *radius_m)
                })
                .unwrap_or(false),
        }
    }
}

fn array_as_strings(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|x| x.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Haversine distance in meters between two lon/lat points.
fn haversine_meters(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let (lat1_r, lat2_r) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }

    pub fn apply(&self, docs: &mut [Value]) {
        docs.sort_by(|a, b| {
            let av = a.get(&self.field);
            let bv = b.get(&self.field);
            let ordering = compare_values(av, bv);
            match self.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    let a_str = a.and_then(Value::as_str);
    let b_str = b.and_then(Value::as_str);
    if let (Some(a), Some(b)) = (a_str, b_str) {
        return a.cmp(b);
    }
    let a_num = a.and_then(Value::as_f64);
    let b_num = b.and_then(Value::as_f64);
    match (a_num, b_num) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => std::cmp::Ordering::Equal,
    }
}

/// Mirrors the store adapter's `use_operators` distinction: a whole-document
/// field merge (`Set`), or an at-most-once array append (`AddToSet`), the
/// only operator the replication daemon needs for `synced_to`.
#[derive(Debug, Clone)]
pub enum Update {
    Set(Value),
    AddToSet { field: String, value: String },
}

impl Update {
    pub fn apply(&self, doc: &mut Value) -> Result<()> {
        match self {
            Update::Set(fields) => {
                let Value::Object(updates) = fields else {
                    return Err(DbError::InvalidRequest(
                        "update payload must be a JSON object".to_string(),
                    ));
                };
                let Value::Object(target) = doc else {
                    return Err(DbError::Internal("document is not an object".to_string()));
                };
                for (k, v) in updates {
                    target.insert(k.clone(), v.clone());
                }
                Ok(())
            }
            Update::AddToSet { field, value } => {
                let Value::Object(target) = doc else {
                    return Err(DbError::Internal("document is not an object".to_string()));
                };
                let arr = target
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let Value::Array(items) = arr else {
                    return Err(DbError::Internal(format!("field {field} is not an array")));
                };
                let already_present = items.iter().any(|v| v.as_str() == Some(value.as_str()));
                if !already_present {
                    items.push(Value::String(value.clone()));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_to_set_is_idempotent() {
        let mut doc = json!({"synced_to": []});
        let update = Update::AddToSet {
            field: "synced_to".to_string(),
            value: "http://eu".to_string(),
        };
        update.apply(&mut doc).unwrap();
        update.apply(&mut doc).unwrap();
        assert_eq!(doc["synced_to"], json!(["http://eu"]));
    }

    #[test]
    fn not_superset_of_is_true_until_every_peer_acked() {
        let doc = json!({"synced_to": ["http://eu"]});
        let q = Query::all().and_not_superset_of(
            "synced_to",
            vec!["http://eu".to_string(), "http://ap".to_string()],
        );
        assert!(q.matches(&doc));

        let doc2 = json!({"synced_to": ["http://eu", "http://ap"]});
        assert!(!q.matches(&doc2));
    }

    #[test]
    fn near_matches_within_radius() {
        let doc = json!({"location": {"type": "Point", "coordinates": [-122.4, 37.7]}});
        let q = Query::near("location", -122.4, 37.71, 5000.0);
        assert!(q.matches(&doc));
        let q_far = Query::near("location", 10.0, 10.0, 5000.0);
        assert!(!q_far.matches(&doc));
    }
}
