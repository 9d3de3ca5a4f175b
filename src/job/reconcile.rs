use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::job::menu::{RawDay, parse_api_date};

/// Weekday labels shown on the site, Monday-first to match ISO weekday order.
pub static DAYS: [&str; 7] = [
    "Mandag", "Tirsdag", "Onsdag", "Torsdag", "Fredag", "Lørdag", "Søndag",
];

/// Dish text used when the source has no menu for a day.
pub static FALLBACK_DISH: &str = "Ingenting";
pub static FALLBACK_IMAGE: &str =
    "https://images.foodandco.dk/Cache/7000/26db3d14e906a285ea7351e22a11617c.jpg";

/// One cafeteria offering for one calendar date, as persisted for the site.
///
/// `food_contents` and `image` are filled in lazily by the enrichment pass:
/// `None` means "not yet processed" and is distinct from an empty tag list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub day: String,
    pub date: NaiveDate,
    pub food_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_contents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Weekday label for a date. Index is the date's ISO weekday minus one, so
/// the label and the stored date can never disagree, whatever order the
/// source lists its days in.
pub fn day_label(date: NaiveDate) -> &'static str {
    DAYS[date.weekday().num_days_from_monday() as usize]
}

/// Merges one fetched week into the persisted collection, keyed by date.
///
/// Day offsets in `fetched` are 0-based Monday-first within the week that
/// starts at `week_start`. An entry already present for a computed date gets
/// its `day`, `date` and `food_name` refreshed while `food_contents` and
/// `image` are preserved; days without a match are appended with both
/// enrichment fields unset. Entries for dates outside the fetched week are
/// left untouched. The result is sorted by ascending date.
pub fn reconcile(
    mut existing: Vec<MenuEntry>,
    fetched: &[RawDay],
    week_start: NaiveDate,
) -> Vec<MenuEntry> {
    for (offset, raw) in fetched.iter().enumerate() {
        let date = week_start + Days::new(offset as u64);

        // The source's own date field is informational only; placement is
        // driven by the week offset. A disagreement is logged, not fatal.
        if let Ok(api_date) = parse_api_date(&raw.date)
            && api_date != date
        {
            warn!(%date, %api_date, "menu source date disagrees with week offset");
        }

        let (food_name, fallback_image) = match raw.menus.first() {
            Some(dish) => (dish.menu.clone(), None),
            None => (
                FALLBACK_DISH.to_string(),
                Some(FALLBACK_IMAGE.to_string()),
            ),
        };

        match existing.iter_mut().find(|entry| entry.date == date) {
            Some(entry) => {
                entry.day = day_label(date).to_string();
                entry.food_name = food_name;
                if entry.image.is_none() {
                    entry.image = fallback_image;
                }
            }
            None => existing.push(MenuEntry {
                day: day_label(date).to_string(),
                date,
                food_name,
                food_contents: None,
                image: fallback_image,
            }),
        }
    }

    existing.sort_by_key(|entry| entry.date);
    existing
}
