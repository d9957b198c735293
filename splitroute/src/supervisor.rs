use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Keep a critical service running: restart it on error or panic with a
/// linear backoff, resetting the retry counter once it has stayed up for a
/// minute. Returns only if the service exits cleanly.
pub fn spawn_supervised<F, Fut>(name: &'static str, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut retries: u32 = 0;
        let mut last_restart = Instant::now();

        loop {
            info!("starting service {name}");

            // Run in its own task so a panic is caught as a JoinError.
            match tokio::spawn(factory()).await {
                Ok(Ok(())) => {
                    info!("{name} exited cleanly");
                    break;
                }
                Ok(Err(error)) => error!("{name} failed: {error:#}"),
                Err(join_error) => error!("{name} panicked: {join_error}"),
            }

            if last_restart.elapsed() > Duration::from_secs(60) {
                retries = 0;
            }
            retries = retries.saturating_add(1);

            let backoff = Duration::from_millis(100 * u64::from(retries.min(50)));
            warn!("{name} restarting in {backoff:?} (attempt {retries})");
            tokio::time::sleep(backoff).await;
            last_restart = Instant::now();
        }
    })
}
