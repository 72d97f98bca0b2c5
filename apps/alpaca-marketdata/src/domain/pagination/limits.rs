//! Limit Policy
//!
//! Two independent limit dimensions govern a paginated call:
//!
//! - **Total limit**: how many records the caller wants across every page
//!   and every key combined (`0` = unbounded).
//! - **Page limit**: a hint for how many records each request asks for
//!   (`0` = let the policy decide).
//!
//! Both are capped by the endpoint's protocol maximum.

/// Maximum `limit` accepted by the v2 stock and crypto endpoints.
pub const V2_MAX_LIMIT: usize = 10_000;

/// Maximum `limit` accepted by the news endpoint.
pub const NEWS_MAX_LIMIT: usize = 50;

/// Caller-supplied limits, as received from configuration or an API user.
///
/// Fields are signed so that negative input survives long enough to be
/// rejected by [`LimitConfig::validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitConfig {
    /// Total records wanted across all pages and keys (`0` = default).
    pub total_limit: i64,
    /// Per-request page size hint (`0` = let the policy decide).
    pub page_limit: i64,
    /// Explicitly request unbounded pagination on endpoints that cap the
    /// total by default.
    pub no_total_limit: bool,
}

impl LimitConfig {
    /// Limits with only a total budget.
    #[must_use]
    pub const fn total(total_limit: i64) -> Self {
        Self {
            total_limit,
            page_limit: 0,
            no_total_limit: false,
        }
    }

    /// Set the page size hint.
    #[must_use]
    pub const fn with_page_limit(mut self, page_limit: i64) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// Request unbounded pagination.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            total_limit: 0,
            page_limit: 0,
            no_total_limit: true,
        }
    }

    /// Validate the configuration and resolve the effective total budget.
    ///
    /// `default_total_cap` applies only when neither an explicit total nor
    /// the unbounded flag is given.
    ///
    /// # Errors
    ///
    /// Returns a [`LimitError`] for negative limits or for a non-zero total
    /// combined with `no_total_limit`.
    pub fn validate(self, default_total_cap: Option<usize>) -> Result<Limits, LimitError> {
        if self.total_limit < 0 {
            return Err(LimitError::NegativeTotalLimit(self.total_limit));
        }
        if self.page_limit < 0 {
            return Err(LimitError::NegativePageLimit(self.page_limit));
        }
        if self.no_total_limit && self.total_limit != 0 {
            return Err(LimitError::ConflictingTotalLimit(self.total_limit));
        }

        let explicit_total = usize::try_from(self.total_limit)
            .map_err(|_| LimitError::NegativeTotalLimit(self.total_limit))?;
        let page = usize::try_from(self.page_limit)
            .map_err(|_| LimitError::NegativePageLimit(self.page_limit))?;

        let total = match default_total_cap {
            Some(cap) if explicit_total == 0 && !self.no_total_limit => cap,
            _ => explicit_total,
        };

        Ok(Limits { total, page })
    }
}

/// Validated limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    /// Total record budget (`0` = unbounded).
    pub total: usize,
    /// Page size hint (`0` = policy decides).
    pub page: usize,
}

impl Limits {
    /// Whether another request may be issued after `received` records.
    #[must_use]
    pub const fn has_budget(&self, received: usize) -> bool {
        self.total == 0 || received < self.total
    }
}

/// Limit configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// Total limit below zero.
    #[error("negative total limit: {0}")]
    NegativeTotalLimit(i64),

    /// Page limit below zero.
    #[error("negative page limit: {0}")]
    NegativePageLimit(i64),

    /// Unbounded flag set together with a non-zero total limit.
    #[error("both no_total_limit and non-zero total limit ({0}) specified")]
    ConflictingTotalLimit(i64),
}

/// Page size for the next request.
///
/// 1. An explicit page hint wins, capped by `hard_max` and, when a total
///    budget exists, by what remains of it.
/// 2. Otherwise a total budget asks for whatever remains, up to `hard_max`.
/// 3. Otherwise ask for `hard_max`.
#[must_use]
pub fn effective_page_size(
    total_limit: usize,
    page_limit: usize,
    received: usize,
    hard_max: usize,
) -> usize {
    let remaining = total_limit.saturating_sub(received);

    if page_limit > 0 {
        let size = page_limit.min(hard_max);
        if total_limit > 0 {
            return size.min(remaining);
        }
        return size;
    }

    if total_limit > 0 {
        return remaining.min(hard_max);
    }

    hard_max
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(0, 0, 0, 10_000 => 10_000; "unbounded uses hard max")]
    #[test_case(500, 0, 0, 10_000 => 500; "total below hard max")]
    #[test_case(25_000, 0, 0, 10_000 => 10_000; "total above hard max")]
    #[test_case(25_000, 0, 20_000, 10_000 => 5_000; "remaining budget")]
    #[test_case(0, 100, 0, 10_000 => 100; "page hint without total")]
    #[test_case(0, 20_000, 0, 10_000 => 10_000; "page hint capped by hard max")]
    #[test_case(250, 100, 200, 10_000 => 50; "page hint capped by remaining")]
    #[test_case(0, 0, 0, 50 => 50; "news hard max")]
    fn page_size(total: usize, page: usize, received: usize, hard_max: usize) -> usize {
        effective_page_size(total, page, received, hard_max)
    }

    #[test]
    fn rejects_negative_total_limit() {
        let err = LimitConfig::total(-1).validate(None).unwrap_err();
        assert_eq!(err, LimitError::NegativeTotalLimit(-1));
    }

    #[test]
    fn rejects_negative_page_limit() {
        let err = LimitConfig::default()
            .with_page_limit(-1)
            .validate(None)
            .unwrap_err();
        assert_eq!(err, LimitError::NegativePageLimit(-1));
    }

    #[test]
    fn rejects_total_with_unbounded_flag() {
        let config = LimitConfig {
            total_limit: 5,
            page_limit: 0,
            no_total_limit: true,
        };
        let err = config.validate(Some(NEWS_MAX_LIMIT)).unwrap_err();
        assert_eq!(err, LimitError::ConflictingTotalLimit(5));
    }

    #[test]
    fn default_cap_applies_without_explicit_total() {
        let limits = LimitConfig::default().validate(Some(NEWS_MAX_LIMIT)).unwrap();
        assert_eq!(limits.total, NEWS_MAX_LIMIT);
    }

    #[test]
    fn unbounded_flag_skips_default_cap() {
        let limits = LimitConfig::unbounded()
            .validate(Some(NEWS_MAX_LIMIT))
            .unwrap();
        assert_eq!(limits.total, 0);
    }

    #[test]
    fn explicit_total_overrides_default_cap() {
        let limits = LimitConfig::total(120)
            .validate(Some(NEWS_MAX_LIMIT))
            .unwrap();
        assert_eq!(limits.total, 120);
    }

    #[test]
    fn zero_total_without_cap_is_unbounded() {
        let limits = LimitConfig::default().validate(None).unwrap();
        assert_eq!(limits, Limits { total: 0, page: 0 });
        assert!(limits.has_budget(1_000_000));
    }

    proptest! {
        #[test]
        fn never_exceeds_hard_max(
            total in 0usize..100_000,
            page in 0usize..100_000,
            received in 0usize..100_000,
            hard_max in 1usize..20_000,
        ) {
            prop_assert!(effective_page_size(total, page, received, hard_max) <= hard_max);
        }

        #[test]
        fn never_exceeds_remaining_budget(
            total in 1usize..100_000,
            page in 0usize..100_000,
            received in 0usize..100_000,
            hard_max in 1usize..20_000,
        ) {
            prop_assume!(received < total);
            let size = effective_page_size(total, page, received, hard_max);
            prop_assert!(size <= total - received);
            prop_assert!(size > 0);
        }
    }
}
