/// Classification for retry policy.
///
/// Used by the data source manager to decide whether a failed provider call
/// is worth repeating against the same provider before moving on.
///
/// # Behavior Summary
///
/// | Class | Retry same provider? | Try next provider? |
/// |-------|----------------------|--------------------|
/// | `WithBackoff` | Yes, up to `max_retries` | Yes, once retries are spent |
/// | `NextProvider` | No | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient failure (timeout, rate limiting, temporary outage).
    /// Worth another attempt after a backoff sleep.
    WithBackoff,

    /// The provider answered but the answer is unusable.
    /// Retrying the same provider won't help; move to the next candidate.
    NextProvider,
}
