//! A cancellation token threaded through pipeline operations so every
//! suspension point (queue wait, provider call, cache lookup) can observe
//! a caller's request to abandon the work in flight.

use relaycore_core::{RelayError, RelayResult};

/// New-type over [`tokio_util::sync::CancellationToken`]. Cheap to clone;
/// every clone observes the same cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(tokio_util::sync::CancellationToken);

impl CancellationToken {
    /// Construct a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self(tokio_util::sync::CancellationToken::new())
    }

    /// A child token: cancelling the parent cancels the child, but
    /// cancelling the child does not affect the parent.
    #[must_use]
    pub fn child_token(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Signal cancellation to every clone and every child token.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// `true` once [`Self::cancel`] has been called on this token or an
    /// ancestor.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Return [`RelayError::Cancelled`] if the token has already fired,
    /// otherwise `Ok(())`. Called at each pipeline stage boundary.
    pub fn check(&self, stage: &str) -> RelayResult<()> {
        if self.is_cancelled() {
            Err(RelayError::cancelled(format!("request cancelled before {stage}")))
        } else {
            Ok(())
        }
    }

    /// Race `fut` against cancellation, returning [`RelayError::Cancelled`]
    /// if the token fires first.
    pub async fn race<T>(&self, fut: impl std::future::Future<Output = RelayResult<T>>) -> RelayResult<T> {
        tokio::select! {
            result = fut => result,
            () = self.0.cancelled() => Err(RelayError::cancelled("request cancelled while in flight")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check("steering").is_ok());
    }

    #[test]
    fn cancel_propagates_to_child() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn race_returns_cancelled_when_token_fires_first() {
        let token = CancellationToken::new();
        token.cancel();
        let result = token.race(std::future::pending::<RelayResult<i32>>()).await;
        assert!(matches!(result, Err(RelayError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn race_returns_ok_when_future_completes_first() {
        let token = CancellationToken::new();
        let result = token.race(async { Ok::<_, RelayError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
