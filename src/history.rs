//! In-memory filtering and pagination of the operation log.

use crate::choices::{Crop, Greenhouse, OperationKind, TreatmentKind};
use crate::error::Result;
use crate::record::OperationRecord;
use serde::{Deserialize, Serialize};

/// Filter value meaning "do not filter on this field".
pub const ALL: &str = "all";

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Equality filters over the loaded records. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub greenhouse: Option<Greenhouse>,
    pub crop: Option<Crop>,
    pub operation: Option<OperationKind>,
    pub treatment: Option<TreatmentKind>,
}

/// Filter fields as they arrive from a form or query string.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub greenhouse: Option<String>,
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
}

fn parse_field<T: std::str::FromStr<Err = crate::error::LogbookError>>(
    value: &Option<String>,
) -> Result<Option<T>> {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some(ALL) => Ok(None),
        Some(v) => v.parse().map(Some),
    }
}

impl FilterQuery {
    pub fn parse(&self) -> Result<Filter> {
        Ok(Filter {
            greenhouse: parse_field(&self.greenhouse)?,
            crop: parse_field(&self.crop)?,
            operation: parse_field(&self.operation)?,
            treatment: parse_field(&self.treatment)?,
        })
    }
}

impl Filter {
    pub fn matches(&self, record: &OperationRecord) -> bool {
        if let Some(g) = self.greenhouse {
            if record.greenhouse != g.label() {
                return false;
            }
        }
        if let Some(c) = self.crop {
            if record.crop != c.label() {
                return false;
            }
        }
        if let Some(op) = self.operation {
            if record.operation != op.label() {
                return false;
            }
        }
        if let Some(t) = self.treatment {
            // treatment details start with "<kind> - "
            let prefix = format!("{} - ", t.label());
            if record.operation != OperationKind::Treatment.label() || !record.details.starts_with(&prefix) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, records: &[OperationRecord]) -> Vec<OperationRecord> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// One page of a filtered list.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl<T> Page<T> {
    /// Page to link back to. Past the end this is the last page, so the
    /// link always lands on rows.
    pub fn previous(&self) -> Option<usize> {
        if self.page <= 1 || self.total_pages == 0 {
            return None;
        }
        Some((self.page - 1).min(self.total_pages))
    }

    pub fn next(&self) -> Option<usize> {
        (self.page < self.total_pages).then_some(self.page + 1)
    }
}

/// Slices `items` into pages of `page_size`. Page 0 is read as page 1 and a
/// page past the end is empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let page = page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);
    let items = items.iter().skip(start).take(page_size).cloned().collect();
    Page {
        items,
        page,
        total_pages,
        total_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(greenhouse: &str, crop: &str, operation: &str, details: &str) -> OperationRecord {
        OperationRecord {
            timestamp: "2024-05-01 08:00".into(),
            greenhouse: greenhouse.into(),
            plot: "1".into(),
            crop: crop.into(),
            operation: operation.into(),
            details: details.into(),
        }
    }

    fn sample() -> Vec<OperationRecord> {
        vec![
            record("B", "tomate", "irrigation", "AB EC 2"),
            record("C", "tomate", "traitement", "fongicide - Switch"),
            record("B", "laitue", "traitement", "insecticide - Confidor | 30 cc/hl | Insectes"),
            record("B", "tomate", "traitement", "insecticide/acaricide - Vertimec | 50 cc/hl | Acariens"),
        ]
    }

    #[test]
    fn all_sentinel_keeps_everything() {
        let query = FilterQuery {
            greenhouse: Some("all".into()),
            crop: Some(String::new()),
            ..Default::default()
        };
        let filter = query.parse().unwrap();
        assert_eq!(filter, Filter::default());
        assert_eq!(filter.apply(&sample()).len(), 4);
    }

    #[test]
    fn greenhouse_filter_is_exact() {
        let filter = Filter {
            greenhouse: Some(Greenhouse::B),
            ..Default::default()
        };
        let kept = filter.apply(&sample());
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|r| r.greenhouse == "B"));
    }

    #[test]
    fn treatment_kind_does_not_match_longer_kind() {
        let filter = Filter {
            treatment: Some(TreatmentKind::Insecticide),
            ..Default::default()
        };
        let kept = filter.apply(&sample());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].crop, "laitue");
    }

    #[test]
    fn unknown_filter_value_is_rejected() {
        let query = FilterQuery {
            crop: Some("banane".into()),
            ..Default::default()
        };
        assert!(query.parse().is_err());
    }

    #[test]
    fn pagination_bounds() {
        let items: Vec<u32> = (0..23).collect();
        let page = paginate(&items, 3, 10);
        assert_eq!(page.items, vec![20, 21, 22]);
        assert_eq!(page.total_pages, 3);

        assert_eq!(paginate(&items, 0, 10).items.len(), 10);
        assert!(paginate(&items, 4, 10).items.is_empty());
        assert_eq!(paginate::<u32>(&[], 1, 10).total_pages, 0);
    }

    #[test]
    fn navigation_stays_inside_the_pages() {
        let items: Vec<usize> = (0..25).collect();

        let first = paginate(&items, 1, 10);
        assert_eq!(first.previous(), None);
        assert_eq!(first.next(), Some(2));

        let last = paginate(&items, 3, 10);
        assert_eq!(last.previous(), Some(2));
        assert_eq!(last.next(), None);

        let beyond = paginate(&items, 7, 10);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.previous(), Some(3));
        assert_eq!(beyond.next(), None);

        let empty = paginate(&Vec::<usize>::new(), 2, 10);
        assert_eq!(empty.previous(), None);
        assert_eq!(empty.next(), None);
    }
}
