use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Optimistic, Record};

/// Client service request. The four sections are filled in independently over the
/// life of the request and are joined into the listing by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: i64,
    /// Request type; the leading part of the front-facing code.
    pub code: String,
    pub name: String,
    pub requested_on: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub detail: Option<RequestDetail>,
    #[serde(default)]
    pub offer: Option<CommercialOffer>,
    #[serde(default)]
    pub review: Option<InternalReview>,
    #[serde(default)]
    pub survey: Option<ServiceSurvey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetail {
    #[serde(default)]
    pub sample_count: Option<u32>,
    #[serde(default)]
    pub analyses: Vec<String>,
    #[serde(default)]
    pub observations: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommercialOffer {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub accepted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalReview {
    #[serde(default)]
    pub viable: Option<bool>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSurvey {
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewRequestRecord {
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub requested_on: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RequestPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<RequestDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<CommercialOffer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<InternalReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub survey: Option<ServiceSurvey>,
}

/// One independently upsertable section of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestSection {
    Detail(RequestDetail),
    Offer(CommercialOffer),
    Review(InternalReview),
    Survey(ServiceSurvey),
}

impl RequestSection {
    pub fn path(&self) -> &'static str {
        match self {
            RequestSection::Detail(_) => "detail",
            RequestSection::Offer(_) => "offer",
            RequestSection::Review(_) => "review",
            RequestSection::Survey(_) => "survey",
        }
    }

    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            RequestSection::Detail(s) => serde_json::to_value(s),
            RequestSection::Offer(s) => serde_json::to_value(s),
            RequestSection::Review(s) => serde_json::to_value(s),
            RequestSection::Survey(s) => serde_json::to_value(s),
        }
    }

    pub fn into_patch(self) -> RequestPatch {
        let mut patch = RequestPatch::default();
        match self {
            RequestSection::Detail(s) => patch.detail = Some(s),
            RequestSection::Offer(s) => patch.offer = Some(s),
            RequestSection::Review(s) => patch.review = Some(s),
            RequestSection::Survey(s) => patch.survey = Some(s),
        }
        patch
    }
}

impl Record for RequestRecord {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Optimistic for RequestRecord {
    type Draft = NewRequestRecord;
    type Patch = RequestPatch;

    fn provisional_id(_draft: &NewRequestRecord, fallback: i64) -> i64 {
        fallback
    }

    fn synthesize(draft: &NewRequestRecord, id: i64) -> Self {
        Self {
            id,
            code: draft.code.clone(),
            name: draft.name.clone(),
            requested_on: draft.requested_on,
            notes: draft.notes.clone(),
            detail: None,
            offer: None,
            review: None,
            survey: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_patch_only_sets_its_own_field() {
        let patch = RequestSection::Review(InternalReview {
            viable: Some(true),
            ..Default::default()
        })
        .into_patch();
        assert!(patch.review.is_some());
        assert!(patch.detail.is_none() && patch.offer.is_none() && patch.survey.is_none());

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
    }

    #[test]
    fn listing_without_sections_decodes() {
        let record: RequestRecord = serde_json::from_value(serde_json::json!({
            "id": 3,
            "code": "AQ",
            "name": "Laboratorio Norte",
            "requested_on": "2024-05-02"
        }))
        .unwrap();
        assert_eq!(record.detail, None);
        assert_eq!(record.survey, None);
    }
}
