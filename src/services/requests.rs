use std::collections::HashMap;

use chrono::Datelike;
use tracing::{info, instrument};

use super::collection::{CollectionService, MutationOutcome};
use crate::errors::ServiceResult;
use crate::events::NoticeLevel;
use crate::models::{RequestRecord, RequestSection};

/// Client service requests: the shared collection operations plus independently
/// upsertable sections and derived front-facing codes.
#[derive(Clone)]
pub struct RequestService {
    collection: CollectionService<RequestRecord>,
    code_width: usize,
}

impl RequestService {
    pub fn new(collection: CollectionService<RequestRecord>, code_width: usize) -> Self {
        Self {
            collection,
            code_width,
        }
    }

    pub fn collection(&self) -> &CollectionService<RequestRecord> {
        &self.collection
    }

    /// Creates or replaces one section of request `id`.
    #[instrument(skip(self, section), fields(section = section.path()))]
    pub async fn upsert_section(
        &self,
        id: i64,
        section: RequestSection,
    ) -> ServiceResult<MutationOutcome<RequestRecord>> {
        let store = self.collection.store();
        let _guard = store.try_begin(&id)?;
        let body = section.body()?;

        match self
            .collection
            .remote()
            .put_section(&id, section.path(), &body)
            .await
        {
            Ok(()) => {
                let path = section.path();
                let handle = self
                    .collection
                    .merger()
                    .after_update(&id, &section.into_patch())?;
                info!(id, section = path, "request section saved");
                self.collection.notice(NoticeLevel::Info, "Section saved");
                Ok(MutationOutcome {
                    id,
                    reconciliation: Some(handle),
                })
            }
            Err(e) if e.is_not_found() => {
                // the refresh runs on its own; its failure is reported through events
                drop(self.collection.already_gone(id));
                Err(e)
            }
            Err(e) => Err(self.collection.rejected(e)),
        }
    }

    /// Front-facing codes of the requests currently held, keyed by request id.
    pub fn front_codes(&self) -> HashMap<i64, String> {
        front_codes(&self.collection.store().snapshot(), self.code_width)
    }

    pub fn front_code(&self, id: i64) -> Option<String> {
        self.front_codes().remove(&id)
    }
}

/// `TYPE-YEAR-SEQ` for every request. Requests are ordered by date then id and
/// numbered from 1 within each type and year. Never stored; recomputed from the
/// collection on every reload.
pub fn front_codes(records: &[RequestRecord], width: usize) -> HashMap<i64, String> {
    let mut ordered: Vec<&RequestRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.requested_on, r.id));

    let mut counters: HashMap<(&str, i32), u64> = HashMap::new();
    ordered
        .into_iter()
        .map(|r| {
            let year = r.requested_on.year();
            let seq = counters.entry((r.code.as_str(), year)).or_insert(0);
            *seq += 1;
            (
                r.id,
                format!("{}-{}-{:0width$}", r.code, year, seq, width = width),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request(id: i64, code: &str, on: (i32, u32, u32)) -> RequestRecord {
        RequestRecord {
            id,
            code: code.into(),
            name: "Lab client".into(),
            requested_on: NaiveDate::from_ymd_opt(on.0, on.1, on.2).unwrap(),
            notes: None,
            detail: None,
            offer: None,
            review: None,
            survey: None,
        }
    }

    #[test]
    fn numbered_per_type_and_year_in_date_order() {
        let records = vec![
            request(7, "AN", (2024, 3, 1)),
            request(3, "AN", (2024, 1, 15)),
            request(5, "CAL", (2024, 2, 1)),
            request(9, "AN", (2025, 1, 2)),
        ];
        let codes = front_codes(&records, 3);
        assert_eq!(codes[&3], "AN-2024-001");
        assert_eq!(codes[&7], "AN-2024-002");
        assert_eq!(codes[&5], "CAL-2024-001");
        assert_eq!(codes[&9], "AN-2025-001");
    }

    #[test]
    fn same_day_ties_break_by_id() {
        let records = vec![request(12, "AN", (2024, 5, 5)), request(11, "AN", (2024, 5, 5))];
        let codes = front_codes(&records, 2);
        assert_eq!(codes[&11], "AN-2024-01");
        assert_eq!(codes[&12], "AN-2024-02");
    }
}
