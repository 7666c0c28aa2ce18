use serde::Deserialize;

use poi_pipeline_common::config::PlaceProviderConfig;
use poi_pipeline_common::types::{
    Category, DayHours, OpeningHours, Poi, PoiSource, TimeSlot,
};

use crate::geocode_cache::{GeocodeCache, LatLon};
use crate::summarizer::PoiSummary;

/// Fixed provider-type -> core category priority table (spec §4.6 step 5).
/// First matching type wins; an unmatched list becomes [`Category::Other`].
const TYPE_CATEGORY_TABLE: &[(&str, Category)] = &[
    ("restaurant", Category::Restaurant),
    ("food", Category::Restaurant),
    ("meal_takeaway", Category::Restaurant),
    ("meal_delivery", Category::Restaurant),
    ("cafe", Category::Cafe),
    ("coffee_shop", Category::Cafe),
    ("bakery", Category::Cafe),
    ("tourist_attraction", Category::Attraction),
    ("museum", Category::Attraction),
    ("park", Category::Attraction),
    ("amusement_park", Category::Attraction),
    ("zoo", Category::Attraction),
    ("aquarium", Category::Attraction),
    ("lodging", Category::Accommodation),
    ("hotel", Category::Accommodation),
    ("motel", Category::Accommodation),
    ("shopping_mall", Category::Shopping),
    ("store", Category::Shopping),
    ("supermarket", Category::Shopping),
    ("night_club", Category::Entertainment),
    ("movie_theater", Category::Entertainment),
    ("bar", Category::Entertainment),
];

fn map_category(primary_type: &str, types: &[String]) -> Category {
    if let Some((_, cat)) = TYPE_CATEGORY_TABLE.iter().find(|(t, _)| *t == primary_type) {
        return *cat;
    }
    for t in types {
        if let Some((_, cat)) = TYPE_CATEGORY_TABLE.iter().find(|(candidate, _)| candidate == t) {
            return *cat;
        }
    }
    Category::Other
}

/// External place provider client (C6). Verifies candidate POIs and
/// enriches them with coordinates, address, rating, and opening hours.
pub struct PlaceResolver {
    http: reqwest::Client,
    config: PlaceProviderConfig,
    api_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("place not found")]
    NotFound,
    #[error("place provider request failed: {0}")]
    Failed(String),
}

impl From<ResolverError> for poi_pipeline_common::PipelineError {
    fn from(e: ResolverError) -> Self {
        match e {
            ResolverError::NotFound => poi_pipeline_common::PipelineError::NotFound("place".into()),
            ResolverError::Failed(msg) => poi_pipeline_common::PipelineError::Resolver(msg),
        }
    }
}

impl PlaceResolver {
    pub fn new(config: PlaceProviderConfig) -> Option<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!(env_var = %config.api_key_env, "Place provider API key not set");
                return None;
            }
        };

        Some(Self {
            http: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    /// Runs the full resolution algorithm (spec §4.6).
    pub async fn resolve(
        &self,
        summary: &PoiSummary,
        city: &str,
        source_url: Option<&str>,
        geocode_cache: &GeocodeCache,
    ) -> Result<Poi, ResolverError> {
        let location_bias = self.resolve_city_location(city, geocode_cache).await;

        let name = &summary.name;
        let query = format!("{name} {city}");
        let place = match self.search_place(&query, location_bias).await? {
            Some(p) => p,
            None => match self.search_place(name, location_bias).await? {
                Some(p) => p,
                None => return Err(ResolverError::NotFound),
            },
        };

        Ok(convert_place_to_poi(place, city, source_url, summary))
    }

    async fn resolve_city_location(
        &self,
        city: &str,
        geocode_cache: &GeocodeCache,
    ) -> Option<LatLon> {
        if let Some(cached) = geocode_cache.get(city) {
            return cached;
        }

        let location = self.search_city(city).await;
        geocode_cache.put(city, location);
        if let Err(e) = geocode_cache.save() {
            tracing::warn!(error = %e, city, "failed to persist geocode cache");
        }
        location
    }

    async fn search_city(&self, city: &str) -> Option<LatLon> {
        let payload = serde_json::json!({
            "textQuery": city,
            "includedType": "locality",
        });

        let response = self
            .http
            .post(format!("{}/v1/places:searchText", self.config.base_url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header(
                "X-Goog-FieldMask",
                "places.location,places.displayName,places.formattedAddress",
            )
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let body: PlacesSearchResponse = response.json().await.ok()?;
        let place = body.places.into_iter().next()?;
        place.location
    }

    async fn search_place(
        &self,
        query: &str,
        location_bias: Option<LatLon>,
    ) -> Result<Option<PlaceResult>, ResolverError> {
        let mut payload = serde_json::json!({ "textQuery": query });

        if let Some(center) = location_bias {
            let radius_m = self.config.location_bias_radius_m;
            let lat_offset = radius_m / 111_000.0;
            let lng_offset =
                radius_m / (111_000.0 * (center.latitude.to_radians().cos().abs()).max(0.01));

            payload["locationRestriction"] = serde_json::json!({
                "rectangle": {
                    "low": {
                        "latitude": center.latitude - lat_offset,
                        "longitude": center.longitude - lng_offset,
                    },
                    "high": {
                        "latitude": center.latitude + lat_offset,
                        "longitude": center.longitude + lng_offset,
                    },
                }
            });
        }

        let response = self
            .http
            .post(format!("{}/v1/places:searchText", self.config.base_url))
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ResolverError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResolverError::Failed(format!("{status}: {body}")));
        }

        let body: PlacesSearchResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::Failed(e.to_string()))?;

        Ok(body.places.into_iter().next())
    }
}

const FIELD_MASK: &str = "places.id,places.displayName,places.formattedAddress,places.location,places.types,places.primaryType,places.googleMapsUri,places.rating,places.userRatingCount,places.priceLevel,places.priceRange,places.websiteUri,places.internationalPhoneNumber,places.regularOpeningHours,places.editorialSummary,places.generativeSummary,places.reviews";

#[derive(Deserialize)]
struct PlacesSearchResponse {
    #[serde(default)]
    places: Vec<PlaceResult>,
}

#[derive(Deserialize)]
struct PlaceResult {
    id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<DisplayName>,
    #[serde(rename = "formattedAddress")]
    formatted_address: Option<String>,
    location: Option<LatLon>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(rename = "primaryType", default)]
    primary_type: String,
    #[serde(rename = "googleMapsUri")]
    maps_uri: Option<String>,
    rating: Option<f64>,
    #[serde(rename = "userRatingCount")]
    rating_count: Option<u32>,
    #[serde(rename = "priceLevel")]
    price_level: Option<String>,
    #[serde(rename = "priceRange")]
    price_range: Option<PriceRange>,
    #[serde(rename = "websiteUri")]
    website_uri: Option<String>,
    #[serde(rename = "internationalPhoneNumber")]
    phone: Option<String>,
    #[serde(rename = "regularOpeningHours")]
    opening_hours: Option<RawOpeningHours>,
    #[serde(rename = "editorialSummary")]
    editorial_summary: Option<TextBlock>,
    #[serde(rename = "generativeSummary")]
    generative_summary: Option<GenerativeSummary>,
    reviews: Option<Vec<Review>>,
}

#[derive(Deserialize)]
struct DisplayName {
    text: String,
}

#[derive(Deserialize)]
struct TextBlock {
    text: String,
}

#[derive(Deserialize)]
struct GenerativeSummary {
    overview: Option<TextBlock>,
}

#[derive(Deserialize)]
struct Review {
    text: Option<TextBlock>,
}

#[derive(Deserialize)]
struct PriceRange {
    #[serde(rename = "startPrice")]
    start_price: Option<MoneyAmount>,
    #[serde(rename = "endPrice")]
    end_price: Option<MoneyAmount>,
}

#[derive(Deserialize)]
struct MoneyAmount {
    units: Option<String>,
    #[serde(rename = "currencyCode")]
    currency_code: Option<String>,
}

#[derive(Deserialize)]
struct RawOpeningHours {
    #[serde(default)]
    periods: Vec<RawPeriod>,
    /// Human-readable per-day text; not mapped onto `OpeningHours` (spec §3
    /// models hours structurally), kept only because the provider's
    /// response includes it.
    #[serde(rename = "weekdayDescriptions", default)]
    #[allow(dead_code)]
    weekday_descriptions: Vec<String>,
}

#[derive(Deserialize)]
struct RawPeriod {
    open: RawPeriodPoint,
    close: Option<RawPeriodPoint>,
}

#[derive(Deserialize)]
struct RawPeriodPoint {
    day: u32,
    hour: u32,
    minute: u32,
}

fn format_price_range(range: &PriceRange) -> Option<String> {
    let fmt = |m: &MoneyAmount| -> Option<String> {
        let units = m.units.as_ref()?;
        Some(format!("{} {}", units, m.currency_code.clone().unwrap_or_default()))
    };

    let start = range.start_price.as_ref().and_then(fmt);
    let end = range.end_price.as_ref().and_then(fmt);

    match (start, end) {
        (Some(s), Some(e)) => Some(format!("{s} ~ {e}")),
        (Some(s), None) => Some(format!("{s} ~")),
        (None, Some(e)) => Some(format!("~ {e}")),
        (None, None) => None,
    }
}

fn parse_opening_hours(raw: &RawOpeningHours) -> OpeningHours {
    let mut by_day: std::collections::HashMap<u32, Vec<TimeSlot>> = std::collections::HashMap::new();

    for period in &raw.periods {
        // Google's day: 0=Sunday .. 6=Saturday. ISO 8601 index used here: 1=Monday .. 7=Sunday.
        let iso_day = if period.open.day == 0 { 7 } else { period.open.day };
        let open_time = chrono::NaiveTime::from_hms_opt(period.open.hour % 24, period.open.minute % 60, 0)
            .unwrap_or_default();
        let close_time = period
            .close
            .as_ref()
            .and_then(|c| chrono::NaiveTime::from_hms_opt(c.hour % 24, c.minute % 60, 0))
            .unwrap_or_else(|| chrono::NaiveTime::from_hms_opt(23, 59, 0).unwrap());

        by_day
            .entry(iso_day)
            .or_default()
            .push(TimeSlot { open_time, close_time });
    }

    let mut days: [DayHours; 7] = Default::default();
    for (idx, day) in days.iter_mut().enumerate() {
        let iso_day = (idx as u32) + 1;
        match by_day.get(&iso_day) {
            Some(slots) => {
                day.closed = false;
                day.slots = slots.clone();
            }
            None => {
                day.closed = true;
                day.slots = Vec::new();
            }
        }
    }

    OpeningHours { days }
}

fn parse_price_level(raw: &str) -> Option<poi_pipeline_common::types::PriceLevel> {
    use poi_pipeline_common::types::PriceLevel;
    match raw {
        "PRICE_LEVEL_FREE" => Some(PriceLevel::Free),
        "PRICE_LEVEL_INEXPENSIVE" => Some(PriceLevel::Inexpensive),
        "PRICE_LEVEL_MODERATE" => Some(PriceLevel::Moderate),
        "PRICE_LEVEL_EXPENSIVE" => Some(PriceLevel::Expensive),
        "PRICE_LEVEL_VERY_EXPENSIVE" => Some(PriceLevel::VeryExpensive),
        _ => None,
    }
}

fn convert_place_to_poi(
    place: PlaceResult,
    city: &str,
    source_url: Option<&str>,
    summary: &PoiSummary,
) -> Poi {
    // primary_type/types drive category, not the summarizer's own guess (spec §4.6 step 5).
    let category = map_category(&place.primary_type, &place.types);
    let name = place
        .display_name
        .map(|d| d.text)
        .unwrap_or_else(|| "Unknown".to_string());

    let editorial_summary = place.editorial_summary.map(|t| t.text).unwrap_or_default();
    let generative_summary = place
        .generative_summary
        .and_then(|g| g.overview)
        .map(|t| t.text)
        .unwrap_or_default();
    let review_summary = place
        .reviews
        .map(|reviews| {
            reviews
                .into_iter()
                .take(3)
                .filter_map(|r| r.text.map(|t| t.text.chars().take(200).collect::<String>()))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .unwrap_or_default();

    let poi_id = place.id.clone().unwrap_or_default();
    let maps_uri = place.maps_uri.clone();

    let mut poi = Poi {
        poi_id,
        name,
        category,
        description: summary.description.clone(),
        city: city.to_string(),
        address: place.formatted_address.unwrap_or_default(),
        latitude: place.location.map(|l| l.latitude),
        longitude: place.location.map(|l| l.longitude),
        external_place_id: place.id,
        external_types: place.types,
        primary_type: if place.primary_type.is_empty() {
            None
        } else {
            Some(place.primary_type)
        },
        maps_uri: maps_uri.clone(),
        website_uri: place.website_uri,
        phone: place.phone,
        rating: place.rating,
        rating_count: place.rating_count,
        price_level: place.price_level.as_deref().and_then(parse_price_level),
        price_range: place.price_range.as_ref().and_then(format_price_range),
        editorial_summary,
        generative_summary,
        review_summary,
        raw_text: String::new(),
        source: PoiSource::WebSearch,
        source_url: source_url.map(String::from).or(maps_uri),
        created_at: chrono::Utc::now(),
        opening_hours: place.opening_hours.as_ref().map(parse_opening_hours),
    };

    poi.raw_text = poi.build_raw_text(&summary.highlights);
    poi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_category_prefers_primary_type() {
        let types = vec!["point_of_interest".to_string(), "cafe".to_string()];
        assert_eq!(map_category("restaurant", &types), Category::Restaurant);
    }

    #[test]
    fn map_category_falls_back_to_types_list() {
        let types = vec!["point_of_interest".to_string(), "museum".to_string()];
        assert_eq!(map_category("", &types), Category::Attraction);
    }

    #[test]
    fn map_category_unknown_becomes_other() {
        let types = vec!["point_of_interest".to_string()];
        assert_eq!(map_category("", &types), Category::Other);
    }

    #[test]
    fn format_price_range_handles_partial_bounds() {
        let range = PriceRange {
            start_price: Some(MoneyAmount {
                units: Some("10".into()),
                currency_code: Some("USD".into()),
            }),
            end_price: None,
        };
        assert_eq!(format_price_range(&range), Some("10 USD ~".to_string()));
    }
}
