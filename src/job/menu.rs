use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use tracing::{info, warn};

use super::{Config, Runnable, util::Client};
use crate::job::enrich::{EnrichClient, enrich_entries};
use crate::job::reconcile::reconcile;
use crate::job::store;

static MENU_DATE_FORMAT: &str = "%Y-%m-%d";

/// One ISO week of menu data from the vendor API.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMenu {
    pub first_date_of_week: String,
    pub days: Vec<RawDay>,
}

#[derive(Deserialize, Debug)]
pub struct RawDay {
    pub date: String,
    /// Zero or one dishes per day; an empty list means nothing is served.
    pub menus: Vec<RawMenu>,
}

#[derive(Deserialize, Debug)]
pub struct RawMenu {
    pub menu: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// The vendor sends dates both bare and with a time suffix.
pub fn parse_api_date(raw: &str) -> Result<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, MENU_DATE_FORMAT)
        .with_context(|| format!("unparseable menu date {raw:?}"))
}

#[derive(Debug)]
pub struct MenuFetcher {
    pub config: Config,
}

impl MenuFetcher {
    fn week_url(&self, date: Option<NaiveDate>) -> String {
        let mut url = format!(
            "{}/api/WeeklyMenu?restaurantId={}&languageCode={}",
            self.config.menu_base_url, self.config.restaurant_id, self.config.language_code
        );
        if let Some(date) = date {
            url.push_str(&format!("&date={}", date.format(MENU_DATE_FORMAT)));
        }
        url
    }
}

impl Runnable for MenuFetcher {
    async fn run(&self) -> Result<()> {
        let client = Client::new();
        let menu_path = self.config.site_data_dir.join("menu.json");
        let existing = store::load_menu(&menu_path).await;

        // Current week, then the week starting 7 days after its first date.
        // Nothing is written unless both fetches succeed.
        let current: WeeklyMenu = client.get_json(self.week_url(None)).await?;
        let week_start = parse_api_date(&current.first_date_of_week)?;
        let entries = reconcile(existing, &current.days, week_start);

        let next_week_start = week_start + Days::new(7);
        let next: WeeklyMenu = client.get_json(self.week_url(Some(next_week_start))).await?;
        if let Ok(reported) = parse_api_date(&next.first_date_of_week)
            && reported != next_week_start
        {
            warn!(requested = %next_week_start, %reported, "vendor returned a different week than requested");
        }
        let mut entries = reconcile(entries, &next.days, next_week_start);

        store::write_menu(&self.config.site_data_dir, &entries).await?;

        if let Some(enrichment) = &self.config.enrichment {
            let enricher = EnrichClient::new(enrichment);
            if enrich_entries(&mut entries, &enricher).await {
                store::write_menu(&self.config.site_data_dir, &entries).await?;
            }
        }

        info!(entries = entries.len(), "menu cycle complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_timestamped_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(parse_api_date("2024-01-08").unwrap(), expected);
        assert_eq!(parse_api_date("2024-01-08T00:00:00").unwrap(), expected);
        assert!(parse_api_date("next monday").is_err());
    }
}
