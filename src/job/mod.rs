use std::{
    env,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tracing::error;

pub mod enrich;
pub mod menu;
pub mod reconcile;
pub mod store;
pub mod util;
pub mod weather;

use dotenvy::dotenv;
use enrich::EnrichmentConfig;
use menu::MenuFetcher;
use weather::WeatherFetcher;

#[allow(async_fn_in_trait)]
pub trait Runnable {
    async fn run(&self) -> Result<()>;
}

/// Environment-driven configuration, shared by all jobs.
#[derive(Debug, Clone)]
pub struct Config {
    pub site_data_dir: PathBuf,
    pub secret_dir: PathBuf,
    pub restaurant_id: String,
    pub language_code: String,
    pub menu_base_url: String,
    pub netatmo_base_url: String,
    pub netatmo_client_id: String,
    pub netatmo_client_secret: String,
    pub netatmo_device_id: String,
    pub netatmo_module_id: String,
    /// `None` when no OPENAI_API_KEY is set; the enrichment pass is skipped.
    pub enrichment: Option<EnrichmentConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing environment variable {key}"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let enrichment = env::var("OPENAI_API_KEY").ok().map(|api_key| EnrichmentConfig {
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com"),
            api_key,
        });
        Ok(Config {
            site_data_dir: env_or("SITE_DATA_DIR", "site/data").into(),
            secret_dir: env_or("SECRET_DIR", "secret").into(),
            restaurant_id: env_or("RESTAURANT_ID", "1089"),
            language_code: env_or("LANGUAGE_CODE", "da-DK"),
            menu_base_url: env_or("MENU_BASE_URL", "https://www.shop.foodandco.dk"),
            netatmo_base_url: env_or("NETATMO_BASE_URL", "https://api.netatmo.com"),
            netatmo_client_id: env_required("NETATMO_CLIENT_ID")?,
            netatmo_client_secret: env_required("NETATMO_CLIENT_SECRET")?,
            netatmo_device_id: env_required("NETATMO_DEVICE_ID")?,
            netatmo_module_id: env_required("NETATMO_MODULE_ID")?,
            enrichment,
        })
    }
}

/// Define a job (by name) and it's accompanying 'runner'.
///
/// This 'runner' should be some struct which implements the `Runnable` trait
macro_rules! define_jobs {
    ($(($jobname:ident, $runnable:ident)),+) => {
        pub enum JobKind {
            $($jobname),*
        }

        enum JobRunner {
            $($jobname($runnable)),*
        }

        impl JobRunner {
            fn new(jobkind: JobKind, config: Config) -> JobRunner {
                match jobkind {
                    $(JobKind::$jobname => JobRunner::$jobname($runnable{config})),*
                }
            }

            async fn run(&self) -> Result<()> {
                match self {
                    $(JobRunner::$jobname(fetcher) => fetcher.run().await),*
                }
            }
        }
    };
}

define_jobs!(
    (Menu, MenuFetcher),
    (Weather, WeatherFetcher)
);

struct Job {
    last_ran: Option<Instant>,
    run_interval: Duration,
    job_runner: JobRunner,
}
impl Job {
    fn should_run(&self) -> bool {
        if let Some(time) = self.last_ran {
            return (Instant::now() - time) >= self.run_interval;
        }
        true
    }

    fn new(jobkind: JobKind, interval: Duration, config: Config) -> Self {
        Job {
            last_ran: None,
            run_interval: interval,
            job_runner: JobRunner::new(jobkind, config),
        }
    }

    async fn run(&mut self) -> Result<()> {
        // Mark the attempt up front: a failed run waits for the next
        // interval instead of being hammered every poll tick.
        self.last_ran = Some(Instant::now());
        self.job_runner.run().await
    }
}

pub struct Jobs {
    joblist: Vec<Job>,
    config: Config,
}

impl Jobs {
    /// Initializes the job queue and loads configuration from the environment
    pub fn init() -> Result<Self> {
        let _ = dotenv();
        let config = Config::from_env()?;
        std::fs::create_dir_all(&config.site_data_dir)?;
        std::fs::create_dir_all(&config.secret_dir)?;
        Ok(Jobs {
            joblist: vec![],
            config,
        })
    }

    pub fn add(mut self, jobkind: JobKind, interval: Duration) -> Self {
        self.joblist
            .push(Job::new(jobkind, interval, self.config.clone()));
        self
    }

    /// Polls jobs in the defined order, executing them in said order.
    ///
    /// Jobs run sequentially on one task, so two cycles of the same job can
    /// never overlap. A failed cycle is logged and retried at the job's next
    /// interval; it never takes the process down.
    pub async fn poll(&mut self) {
        for job in &mut self.joblist {
            if job.should_run() {
                if let Err(err) = job.run().await {
                    error!(error = ?err, "job failed, retrying on next tick");
                }
            }
        }
    }
}
