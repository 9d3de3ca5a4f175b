use std::time::Duration;

use anyhow::Result;
use kantine::job::{JobKind, Jobs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let poll_rate = Duration::from_secs(1);
    let mut jobs = Jobs::init()?
        .add(JobKind::Menu, Duration::from_secs(6 * 60 * 60))
        .add(JobKind::Weather, Duration::from_secs(5 * 60));

    loop {
        jobs.poll().await;
        tokio::time::sleep(poll_rate).await;
    }
}
