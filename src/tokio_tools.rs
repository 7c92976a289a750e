use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn a Tokio task wrapped in a trace span carrying a stable name.
///
/// Long-lived background tasks (connection pumps, AI turns, the nightly
/// room sweep) all go through here so their log lines can be attributed.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    use tracing::Instrument;

    let name_owned = name.into();
    let span = tracing::info_span!("task", task_name = %name_owned);
    tokio::spawn(future.instrument(span))
}
