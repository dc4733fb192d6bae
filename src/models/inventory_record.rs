use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use super::{Optimistic, Record};

/// Stock-holding instance referencing a catalog entry by code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: i64,
    pub code: String,
    #[serde(default)]
    pub lot: Option<String>,
    pub acquired_quantity: Decimal,
    pub existing_quantity: Decimal,
    #[serde(default)]
    pub acquired_on: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,

    // Joined from the catalog by the backend
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub low_stock: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_draft_quantities", skip_on_field_errors = false))]
pub struct NewInventoryRecord {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub lot: Option<String>,
    pub acquired_quantity: Decimal,
    pub existing_quantity: Decimal,
    pub acquired_on: Option<NaiveDate>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// Quantities carried by the patch are checked on their own, whether or not the
/// record is held locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_patch_quantities", skip_on_field_errors = false))]
pub struct InventoryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// existing <= acquired, both non-negative.
pub fn check_quantities(acquired: Decimal, existing: Decimal) -> Result<(), ValidationError> {
    if acquired < Decimal::ZERO || existing < Decimal::ZERO {
        let mut err = ValidationError::new("negative_quantity");
        err.message = Some("Quantities cannot be negative".into());
        return Err(err);
    }
    if existing > acquired {
        let mut err = ValidationError::new("existing_exceeds_acquired");
        err.message = Some("Existing quantity cannot exceed acquired quantity".into());
        return Err(err);
    }
    Ok(())
}

fn validate_draft_quantities(draft: &NewInventoryRecord) -> Result<(), ValidationError> {
    check_quantities(draft.acquired_quantity, draft.existing_quantity)
}

fn validate_patch_quantities(patch: &InventoryPatch) -> Result<(), ValidationError> {
    match (patch.acquired_quantity, patch.existing_quantity) {
        (Some(acquired), Some(existing)) => check_quantities(acquired, existing),
        (Some(acquired), None) => check_quantities(acquired, Decimal::ZERO),
        (None, Some(existing)) => check_quantities(existing, existing),
        (None, None) => Ok(()),
    }
}

impl Record for InventoryRecord {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    fn check_invariants(&self) -> Result<(), ValidationErrors> {
        check_quantities(self.acquired_quantity, self.existing_quantity).map_err(|err| {
            let mut errors = ValidationErrors::new();
            errors.add("existing_quantity", err);
            errors
        })
    }
}

impl Optimistic for InventoryRecord {
    type Draft = NewInventoryRecord;
    type Patch = InventoryPatch;

    fn provisional_id(_draft: &NewInventoryRecord, fallback: i64) -> i64 {
        fallback
    }

    fn synthesize(draft: &NewInventoryRecord, id: i64) -> Self {
        Self {
            id,
            code: draft.code.clone(),
            lot: draft.lot.clone(),
            acquired_quantity: draft.acquired_quantity,
            existing_quantity: draft.existing_quantity,
            acquired_on: draft.acquired_on,
            location: draft.location.clone(),
            notes: draft.notes.clone(),
            name: None,
            description: None,
            image: None,
            low_stock: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(acquired: Decimal, existing: Decimal) -> NewInventoryRecord {
        NewInventoryRecord {
            code: "S-001".into(),
            lot: Some("L-22".into()),
            acquired_quantity: acquired,
            existing_quantity: existing,
            acquired_on: NaiveDate::from_ymd_opt(2024, 3, 1),
            location: Some("Shelf B".into()),
            notes: None,
        }
    }

    #[test]
    fn existing_above_acquired_fails_validation() {
        assert!(draft(dec!(10), dec!(10)).validate().is_ok());
        assert!(draft(dec!(10), dec!(10.5)).validate().is_err());
        assert!(draft(dec!(-1), dec!(0)).validate().is_err());
    }

    #[test]
    fn patch_quantities_are_checked_without_the_record() {
        let patch = |acquired, existing| InventoryPatch {
            acquired_quantity: acquired,
            existing_quantity: existing,
            ..Default::default()
        };
        assert!(patch(Some(dec!(1)), Some(dec!(5))).validate().is_err());
        assert!(patch(Some(dec!(5)), Some(dec!(1))).validate().is_ok());
        assert!(patch(None, Some(dec!(-2))).validate().is_err());
        assert!(patch(Some(dec!(-2)), None).validate().is_err());
        // a lone existing quantity is checked against the held record later
        assert!(patch(None, Some(dec!(500))).validate().is_ok());
        assert!(InventoryPatch::default().validate().is_ok());
    }

    #[test]
    fn synthesized_record_nulls_joined_fields() {
        let record = InventoryRecord::synthesize(&draft(dec!(5), dec!(2)), -1);
        assert_eq!(record.id, -1);
        assert_eq!(record.name, None);
        assert_eq!(record.description, None);
        assert_eq!(record.image, None);
        assert_eq!(record.low_stock, None);
        assert_eq!(record.display_name(), "");
    }

    #[test]
    fn decodes_numeric_and_string_quantities() {
        let record: InventoryRecord = serde_json::from_value(serde_json::json!({
            "id": 42,
            "code": "S-002",
            "acquired_quantity": 12,
            "existing_quantity": "7.5",
            "name": "Gloves"
        }))
        .unwrap();
        assert_eq!(record.existing_quantity, dec!(7.5));
        assert_eq!(record.acquired_quantity, dec!(12));
        assert!(record.check_invariants().is_ok());
    }
}
