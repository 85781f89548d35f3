//! Explicit "timed call" helper (§9 design note: re-express `@timer`-style decorators as a
//! wrapping function rather than a language-level decorator).

use std::future::Future;
use std::time::Instant;

use tracing::debug;

/// Runs `fut`, logging its wall-clock duration under `label` at debug level on completion.
pub async fn timed<F, T>(label: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = fut.await;
    debug!(node = label, elapsed_ms = start.elapsed().as_millis() as u64, "node completed");
    result
}
