/*!
Catalog records and the notification payload built from them
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One company record exactly as the catalog returned it.
///
/// Only a handful of fields matter for detection; everything else is carried
/// through untouched so pending deliveries can be rebuilt later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Stable identifier from `objectID`, falling back to `id`.
    /// Records without a usable one are skipped by every set operation.
    pub fn id(&self) -> Option<String> {
        ["objectID", "id"]
            .iter()
            .filter_map(|key| self.0.get(*key))
            .find_map(scalar_to_id)
    }

    pub fn name(&self) -> &str {
        self.str_field("name")
    }

    pub fn batch(&self) -> &str {
        self.str_field("batch")
    }

    pub fn one_liner(&self) -> &str {
        self.str_field("one_liner")
    }

    /// Raw `launched_at` value in seconds since the epoch
    pub fn launched_at_secs(&self) -> Option<i64> {
        self.0.get("launched_at").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f as i64))
        })
    }

    pub fn launched_at(&self) -> Option<DateTime<Utc>> {
        self.launched_at_secs()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn str_field(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    fn raw_field(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }

    fn bool_field(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn list_field(&self, key: &str) -> Vec<Value> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

fn scalar_to_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

/// Body of one webhook post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyPayload {
    pub id: Option<String>,
    pub name: String,
    pub slug: String,
    pub url: String,
    pub website: String,
    pub one_liner: String,
    pub long_description: String,
    pub batch: String,
    pub status: String,
    pub stage: String,
    pub industry: String,
    pub subindustry: String,
    pub industries: Vec<Value>,
    pub tags: Vec<Value>,
    /// Passed through as the catalog sent it; 0 when absent
    pub team_size: Value,
    pub all_locations: String,
    pub regions: Vec<Value>,
    pub is_hiring: bool,
    pub nonprofit: bool,
    pub top_company: bool,
    pub small_logo_thumb_url: String,
    /// Raw catalog value, null when absent
    pub launched_at: Value,
    pub launched_at_human: String,
    pub event: String,
    pub detected_at: DateTime<Utc>,
}

impl CompanyPayload {
    pub fn from_entity(
        entity: &Entity,
        profile_base_url: &str,
        event: &str,
        detected_at: DateTime<Utc>,
    ) -> Self {
        let slug = entity.str_field("slug").to_string();
        let url = if slug.is_empty() {
            String::new()
        } else {
            format!("{}/{}", profile_base_url.trim_end_matches('/'), slug)
        };

        Self {
            id: entity.id(),
            name: entity.name().to_string(),
            url,
            slug,
            website: entity.str_field("website").to_string(),
            one_liner: entity.one_liner().to_string(),
            long_description: entity.str_field("long_description").to_string(),
            batch: entity.batch().to_string(),
            status: entity.str_field("status").to_string(),
            stage: entity.str_field("stage").to_string(),
            industry: entity.str_field("industry").to_string(),
            subindustry: entity.str_field("subindustry").to_string(),
            industries: entity.list_field("industries"),
            tags: entity.list_field("tags"),
            team_size: entity.raw_field("team_size").unwrap_or_else(|| Value::from(0)),
            all_locations: entity.str_field("all_locations").to_string(),
            regions: entity.list_field("regions"),
            is_hiring: entity.bool_field("isHiring"),
            nonprofit: entity.bool_field("nonprofit"),
            top_company: entity.bool_field("top_company"),
            small_logo_thumb_url: entity.str_field("small_logo_thumb_url").to_string(),
            launched_at: entity.raw_field("launched_at").unwrap_or(Value::Null),
            launched_at_human: entity
                .launched_at()
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            event: event.to_string(),
            detected_at,
        }
    }
}

/// Settings shared by every payload of a run
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFormat {
    /// Prefix for company profile links
    pub profile_base_url: String,
    /// Value of the `event` field
    pub event: String,
}

impl Default for PayloadFormat {
    fn default() -> Self {
        Self {
            profile_base_url: "https://www.ycombinator.com/companies".to_string(),
            event: "new_yc_company".to_string(),
        }
    }
}

impl PayloadFormat {
    pub fn build(&self, entity: &Entity, detected_at: DateTime<Utc>) -> CompanyPayload {
        CompanyPayload::from_entity(entity, &self.profile_base_url, &self.event, detected_at)
    }
}

#[cfg(test)]
pub(crate) fn entity(value: Value) -> Entity {
    match value {
        Value::Object(map) => Entity::from_map(map),
        other => panic!("entity fixture must be an object, got {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn id_prefers_object_id() {
        let e = entity(json!({"objectID": "123", "id": 999}));
        assert_eq!(e.id().as_deref(), Some("123"));
    }

    #[test]
    fn id_falls_back_to_numeric_id() {
        let e = entity(json!({"objectID": "", "id": 42}));
        assert_eq!(e.id().as_deref(), Some("42"));
    }

    #[test]
    fn missing_or_empty_id_is_none() {
        assert_eq!(entity(json!({"name": "Nameless"})).id(), None);
        assert_eq!(entity(json!({"objectID": "", "id": null})).id(), None);
    }

    #[test]
    fn raw_record_survives_serde() {
        let raw = json!({"objectID": "7", "name": "Acme", "extra": {"nested": [1, 2]}});
        let e = entity(raw.clone());
        assert_eq!(serde_json::to_value(&e).unwrap(), raw);
    }

    #[test]
    fn payload_carries_company_fields() {
        let detected_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let e = entity(json!({
            "objectID": "31337",
            "name": "Acme",
            "slug": "acme",
            "batch": "Winter 2025",
            "one_liner": "Rockets for roadrunners",
            "isHiring": true,
            "team_size": 4,
            "tags": ["B2B"],
            "launched_at": 1_735_689_600
        }));

        let payload = CompanyPayload::from_entity(
            &e,
            "https://www.ycombinator.com/companies/",
            "new_yc_company",
            detected_at,
        );

        assert_eq!(payload.id.as_deref(), Some("31337"));
        assert_eq!(payload.url, "https://www.ycombinator.com/companies/acme");
        assert_eq!(payload.batch, "Winter 2025");
        assert!(payload.is_hiring);
        assert_eq!(payload.team_size, json!(4));
        assert_eq!(payload.tags, vec![json!("B2B")]);
        assert_eq!(payload.launched_at, json!(1_735_689_600));
        assert_eq!(payload.launched_at_human, "2025-01-01");
        assert_eq!(payload.event, "new_yc_company");
        assert_eq!(payload.detected_at, detected_at);
    }

    #[test]
    fn payload_without_slug_has_empty_url() {
        let now = Utc::now();
        let payload = CompanyPayload::from_entity(&entity(json!({"objectID": "1"})), "https://x", "e", now);
        assert_eq!(payload.url, "");
        assert_eq!(payload.launched_at_human, "");
        assert_eq!(payload.launched_at, Value::Null);
        assert_eq!(payload.team_size, json!(0));
    }

    #[test]
    fn padded_ids_are_kept_verbatim() {
        let e = entity(json!({"objectID": " 77 "}));
        assert_eq!(e.id().as_deref(), Some(" 77 "));
        assert_eq!(entity(json!({"objectID": "", "id": ""})).id(), None);
    }

    #[test]
    fn odd_numeric_fields_pass_through_untouched() {
        let e = entity(json!({
            "objectID": "9",
            "team_size": "10-50",
            "launched_at": 1_735_689_600.5
        }));
        let payload = PayloadFormat::default().build(&e, Utc::now());
        assert_eq!(payload.team_size, json!("10-50"));
        assert_eq!(payload.launched_at, json!(1_735_689_600.5));
        assert_eq!(payload.launched_at_human, "2025-01-01");
        assert_eq!(payload.event, "new_yc_company");
    }
}
