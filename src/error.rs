/// A [`Limit`](crate::Limit) that no bucket could enforce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("refill rate must be at least one token per interval")]
    ZeroRate,
    #[error("burst capacity must be at least one token")]
    ZeroBurst,
    #[error("refill interval must be longer than zero")]
    ZeroRefill,
}
