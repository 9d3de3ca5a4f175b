use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Config, Runnable, util::Client};
use crate::job::store;

/// How far back the measure window reaches, in seconds.
static MEASURE_WINDOW_SECS: i64 = 2700;

/// Persisted token record. `expires_at` (ms since epoch) is ours; the rest
/// comes straight from the token endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct NetatmoCredentials {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl NetatmoCredentials {
    /// A record that has never been stamped with an expiry counts as expired.
    pub fn needs_refresh(&self, now_ms: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now_ms > expires_at,
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct MeasureResponse {
    pub body: Vec<MeasureChunk>,
}

/// With `optimize=true` the API groups samples into chunks of rows; a row
/// holds one value per requested measure type, possibly null.
#[derive(Debug, Deserialize)]
pub struct MeasureChunk {
    pub value: Vec<Vec<Option<f64>>>,
}

/// First sample of the window, or 0 when the gauge reported nothing.
pub fn rain_value(measure: &MeasureResponse) -> f64 {
    measure
        .body
        .first()
        .and_then(|chunk| chunk.value.first())
        .and_then(|row| row.first())
        .and_then(|sample| *sample)
        .unwrap_or(0.0)
}

#[derive(Debug)]
pub struct WeatherFetcher {
    pub config: Config,
}

impl WeatherFetcher {
    async fn refresh_credentials(
        &self,
        client: &Client,
        refresh_token: &str,
    ) -> Result<NetatmoCredentials> {
        let token: TokenResponse = client
            .post_form_json(
                format!("{}/oauth2/token", self.config.netatmo_base_url),
                vec![
                    ("grant_type".to_string(), "refresh_token".to_string()),
                    ("refresh_token".to_string(), refresh_token.to_string()),
                    ("client_id".to_string(), self.config.netatmo_client_id.clone()),
                    (
                        "client_secret".to_string(),
                        self.config.netatmo_client_secret.clone(),
                    ),
                ],
            )
            .await?;
        Ok(NetatmoCredentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Some(Utc::now().timestamp_millis() + token.expires_in * 1000),
            expires_in: Some(token.expires_in),
        })
    }
}

impl Runnable for WeatherFetcher {
    async fn run(&self) -> Result<()> {
        let client = Client::new();
        let creds_path = self.config.secret_dir.join("netatmo_credentials.json");

        // Without a stored refresh token there is nothing to exchange; the
        // file has to be seeded once by hand.
        let raw = tokio::fs::read(&creds_path)
            .await
            .with_context(|| format!("reading {}", creds_path.display()))?;
        let mut creds: NetatmoCredentials =
            serde_json::from_slice(&raw).context("parsing netatmo credentials")?;

        if creds.needs_refresh(Utc::now().timestamp_millis()) {
            info!("refreshing netatmo access token");
            creds = self.refresh_credentials(&client, &creds.refresh_token).await?;
            store::write_atomic(&creds_path, &serde_json::to_vec_pretty(&creds)?).await?;
        }

        let date_begin = Utc::now().timestamp() - MEASURE_WINDOW_SECS;
        let measure: MeasureResponse = Client::new()
            .with_bearer(&creds.access_token)
            .get_json(format!(
                "{}/api/getmeasure?device_id={}&scale=30min&type=sum_rain&module_id={}&optimize=true&date_begin={}",
                self.config.netatmo_base_url,
                self.config.netatmo_device_id,
                self.config.netatmo_module_id,
                date_begin
            ))
            .await?;

        let rain = rain_value(&measure);
        store::write_rain(&self.config.site_data_dir, rain).await?;

        info!(rain, "weather cycle complete");
        Ok(())
    }
}
