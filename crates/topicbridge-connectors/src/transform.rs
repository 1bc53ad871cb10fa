//! Pluggable record transformation.
//!
//! The writer calls a [`Transform`] once per event to turn the source
//! value into a destination-ready message. Any `Fn(V) -> TransformResult<M>`
//! closure is a transform.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Outcome of transforming one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult<M> {
    /// The event was transformed; the message may be written.
    Success(M),
    /// The event cannot be delivered; the pipeline must not commit it.
    Failure(String),
}

impl<M> TransformResult<M> {
    /// Returns `true` for [`TransformResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, TransformResult::Success(_))
    }

    /// Converts into a `Result`, discarding nothing.
    ///
    /// # Errors
    ///
    /// Returns the failure reason for [`TransformResult::Failure`].
    pub fn into_result(self) -> Result<M, String> {
        match self {
            TransformResult::Success(m) => Ok(m),
            TransformResult::Failure(reason) => Err(reason),
        }
    }
}

/// Maps a source value into a destination message.
///
/// Implementations should be stateless and must not hold long-lived
/// resources; they are called repeatedly from the writer task.
pub trait Transform<V>: Send + Sync {
    /// Destination-ready message type.
    type Output: Send;

    /// Transforms one event.
    fn apply(&self, event: V) -> TransformResult<Self::Output>;
}

impl<V, M, F> Transform<V> for F
where
    F: Fn(V) -> TransformResult<M> + Send + Sync,
    M: Send,
{
    type Output = M;

    fn apply(&self, event: V) -> TransformResult<M> {
        self(event)
    }
}

/// Applies `transform`, turning a panic into [`TransformResult::Failure`].
pub(crate) fn apply_guarded<V, T>(transform: &T, event: V) -> TransformResult<T::Output>
where
    T: Transform<V> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| transform.apply(event))) {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            TransformResult::Failure(format!("transform panicked: {reason}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(event: String) -> TransformResult<String> {
        if event.is_empty() {
            TransformResult::Failure("empty event".into())
        } else {
            TransformResult::Success(event.to_uppercase())
        }
    }

    #[test]
    fn test_fn_is_transform() {
        assert_eq!(upper.apply("abc".into()), TransformResult::Success("ABC".into()));
        assert!(!upper.apply(String::new()).is_success());
    }

    #[test]
    fn test_closure_is_transform() {
        let prefix = String::from("msg:");
        let t = move |n: u32| TransformResult::Success(format!("{prefix}{n}"));
        assert_eq!(t.apply(4).into_result(), Ok("msg:4".to_string()));
    }

    #[test]
    fn test_panic_becomes_failure() {
        let t = |_: u32| -> TransformResult<String> { panic!("bad mapping") };
        match apply_guarded(&t, 1) {
            TransformResult::Failure(reason) => assert!(reason.contains("bad mapping")),
            TransformResult::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn test_guarded_passes_through() {
        assert_eq!(
            apply_guarded(&upper, "x".to_string()),
            TransformResult::Success("X".to_string())
        );
    }
}
