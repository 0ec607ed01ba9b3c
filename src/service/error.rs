use thiserror::Error;

use crate::models::BatchSummary;
use crate::query::FilterError;
use crate::store::StoreNotFound;

/// Errors returned by service operations.
///
/// The value of an operation is only reachable through the `Ok`
/// variant; callers decide per variant how to react.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("{failed} of {total} entries failed; first failure at index {index}: {first}")]
    Batch {
        failed: u64,
        total: u64,
        index: usize,
        first: String,
    },

    /// The primary write committed but the post-action hook failed.
    /// `committed` describes what was written.
    #[error("post-action failed after committing {committed}: {source}")]
    PostAction {
        committed: String,
        #[source]
        source: Box<ServiceError>,
    },

    #[error(transparent)]
    StoreNotFound(#[from] StoreNotFound),

    #[error(transparent)]
    Backend(anyhow::Error),
}

impl From<anyhow::Error> for ServiceError {
    /// Backend errors stay opaque unless they carry a missing store.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StoreNotFound>() {
            Ok(missing) => ServiceError::StoreNotFound(missing),
            Err(err) => ServiceError::Backend(err),
        }
    }
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    /// True when the error was caused by bad input rather than storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_) | ServiceError::Filter(_) | ServiceError::Batch { .. }
        )
    }

    /// True when a referenced record or the store itself is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound { .. } | ServiceError::StoreNotFound(_)
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl<T> BatchSummary<T> {
    /// Fail when any entry failed; otherwise return the summary.
    ///
    /// Used where a bulk operation is one step of a larger operation and
    /// partial success must not be mistaken for success.
    pub fn into_result(self) -> ServiceResult<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(ServiceError::Batch {
                failed: self.failed,
                total: self.total,
                index: first.index,
                first: first.error.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_batch_converts_to_ok() {
        let mut summary = BatchSummary::default();
        summary.record_success(1);
        summary.record_success(2);

        let summary = summary.into_result().expect("complete batch");
        assert_eq!(summary.values, vec![1, 2]);
    }

    #[test]
    fn partial_batch_converts_to_batch_error() {
        let mut summary = BatchSummary::default();
        summary.record_success(1);
        summary.record_failure(1, "price must be >= 0");
        summary.record_failure(2, "name must not be empty");

        match summary.into_result() {
            Err(ServiceError::Batch {
                failed,
                total,
                index,
                first,
            }) => {
                assert_eq!((failed, total, index), (2, 3, 1));
                assert_eq!(first, "price must be >= 0");
            }
            other => panic!("expected batch error, got {other:?}"),
        }
    }

    #[test]
    fn post_action_error_keeps_source_chain() {
        let err = ServiceError::PostAction {
            committed: "sale 7".to_string(),
            source: Box::new(ServiceError::validation("quantity must be > 0")),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("after committing sale 7"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_store_is_typed_even_under_context() {
        use anyhow::Context;

        let err: anyhow::Result<()> = Err(StoreNotFound {
            path: "shop.sqlite".into(),
        }
        .into());
        let err = ServiceError::from(err.context("lookup failed").expect_err("error"));
        assert!(matches!(err, ServiceError::StoreNotFound(_)));
        assert!(err.is_not_found());
        assert!(!err.is_client_error());

        let err = ServiceError::from(anyhow::anyhow!("disk full"));
        assert!(matches!(err, ServiceError::Backend(_)));
        assert!(!err.is_not_found());
    }
}
