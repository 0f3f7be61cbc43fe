//! Pagination for list endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::validator::Validator;

const MAX_PAGE: i64 = 10_000_000;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl Filters {
    #[must_use]
    pub fn limit(&self) -> usize {
        usize::try_from(self.page_size).unwrap_or(0)
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        usize::try_from((self.page - 1).saturating_mul(self.page_size)).unwrap_or(0)
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page <= MAX_PAGE,
        "page",
        "must be a maximum of 10 million",
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be a maximum of 100",
    );
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Metadata {
    #[must_use]
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_limit_follow_page() {
        let filters = Filters {
            page: 3,
            page_size: 10,
        };
        assert_eq!(filters.limit(), 10);
        assert_eq!(filters.offset(), 20);
    }

    #[test]
    fn validate_filters_rejects_out_of_range() {
        let mut v = Validator::new();
        validate_filters(
            &mut v,
            &Filters {
                page: 0,
                page_size: 101,
            },
        );
        assert!(!v.valid());
        assert!(v.errors().contains_key("page"));
        assert!(v.errors().contains_key("page_size"));
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let metadata = Metadata::calculate(21, 1, 10);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.first_page, 1);
        assert_eq!(Metadata::calculate(0, 1, 10), Metadata::default());
    }
}
