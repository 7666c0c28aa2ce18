use serde::{Deserialize, Serialize};

/// The canonical record for a place (spec §3 "POI").
///
/// `poi_id` equals the external place-id when the place has been resolved
/// against the external place provider; otherwise it is a content hash of
/// `source_url`. A POI is never mutated in place — corrections are written
/// as a new version with the same id, overwriting stored metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub poi_id: String,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    pub city: String,
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub external_place_id: Option<String>,
    #[serde(default)]
    pub external_types: Vec<String>,
    #[serde(default)]
    pub primary_type: Option<String>,
    #[serde(default)]
    pub maps_uri: Option<String>,
    #[serde(default)]
    pub website_uri: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<u32>,
    #[serde(default)]
    pub price_level: Option<PriceLevel>,
    #[serde(default)]
    pub price_range: Option<String>,

    #[serde(default)]
    pub editorial_summary: String,
    #[serde(default)]
    pub generative_summary: String,
    #[serde(default)]
    pub review_summary: String,
    /// The concatenated text actually handed to the Embedding Encoder (§4.1).
    #[serde(default)]
    pub raw_text: String,

    pub source: PoiSource,
    #[serde(default)]
    pub source_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,

    #[serde(default)]
    pub opening_hours: Option<OpeningHours>,
}

impl Poi {
    /// Renders the structured textual input for the Embedding Encoder (§4.1):
    /// description, primary_type/category, rating with count, price, the
    /// three summary fields, and any summarizer-produced highlights, each
    /// labeled and joined by " | ", empty fields omitted.
    pub fn build_raw_text(&self, highlights: &[String]) -> String {
        let mut parts = Vec::new();

        if !self.description.is_empty() {
            parts.push(format!("description: {}", self.description));
        }

        let type_label = self
            .primary_type
            .clone()
            .unwrap_or_else(|| self.category.as_str().to_string());
        if !type_label.is_empty() {
            parts.push(format!("type: {type_label}"));
        }

        if let Some(rating) = self.rating {
            let count = self.rating_count.unwrap_or(0);
            parts.push(format!("rating: {rating:.1} ({count} reviews)"));
        }

        if let Some(price) = &self.price_range {
            if !price.is_empty() {
                parts.push(format!("price: {price}"));
            }
        } else if let Some(level) = self.price_level {
            parts.push(format!("price: {}", level.as_str()));
        }

        if !self.editorial_summary.is_empty() {
            parts.push(format!("editorial: {}", self.editorial_summary));
        }
        if !self.generative_summary.is_empty() {
            parts.push(format!("summary: {}", self.generative_summary));
        }
        if !self.review_summary.is_empty() {
            parts.push(format!("reviews: {}", self.review_summary));
        }
        if !highlights.is_empty() {
            parts.push(format!("highlights: {}", highlights.join(", ")));
        }

        parts.join(" | ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Restaurant,
    Cafe,
    Attraction,
    Accommodation,
    Shopping,
    Entertainment,
    Region,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Restaurant => "restaurant",
            Category::Cafe => "cafe",
            Category::Attraction => "attraction",
            Category::Accommodation => "accommodation",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Region => "region",
            Category::Other => "other",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "restaurant" => Ok(Category::Restaurant),
            "cafe" | "coffee_shop" => Ok(Category::Cafe),
            "attraction" | "tourist_attraction" => Ok(Category::Attraction),
            "accommodation" | "lodging" | "hotel" => Ok(Category::Accommodation),
            "shopping" | "store" => Ok(Category::Shopping),
            "entertainment" => Ok(Category::Entertainment),
            "region" | "locality" => Ok(Category::Region),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    Free,
    Inexpensive,
    Moderate,
    Expensive,
    VeryExpensive,
}

impl PriceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceLevel::Free => "FREE",
            PriceLevel::Inexpensive => "INEXPENSIVE",
            PriceLevel::Moderate => "MODERATE",
            PriceLevel::Expensive => "EXPENSIVE",
            PriceLevel::VeryExpensive => "VERY_EXPENSIVE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoiSource {
    WebSearch,
    EmbeddingStore,
    UserFeedback,
}

/// Seven daily entries (Monday..Sunday order is caller-defined; the
/// Place Resolver populates this from the external provider's own day
/// indexing and does not reorder it).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub days: [DayHours; 7],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DayHours {
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub slots: Vec<TimeSlot>,
}

/// A single open/close pair. Slots wrapping past midnight are represented
/// with `close_time <= open_time` (e.g. 22:00 -> 02:00).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub open_time: chrono::NaiveTime,
    pub close_time: chrono::NaiveTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poi() -> Poi {
        Poi {
            poi_id: "p1".into(),
            name: "N Seoul Tower".into(),
            category: Category::Attraction,
            description: String::new(),
            city: "Seoul".into(),
            address: String::new(),
            latitude: None,
            longitude: None,
            external_place_id: None,
            external_types: Vec::new(),
            primary_type: Some("tourist_attraction".into()),
            maps_uri: None,
            website_uri: None,
            phone: None,
            rating: Some(4.6),
            rating_count: Some(1200),
            price_level: None,
            price_range: None,
            editorial_summary: "Iconic observation tower".into(),
            generative_summary: String::new(),
            review_summary: String::new(),
            raw_text: String::new(),
            source: PoiSource::WebSearch,
            source_url: Some("https://example.com".into()),
            created_at: chrono::Utc::now(),
            opening_hours: None,
        }
    }

    #[test]
    fn raw_text_omits_empty_fields() {
        let poi = sample_poi();
        let text = poi.build_raw_text(&[]);
        assert!(text.contains("type: tourist_attraction"));
        assert!(text.contains("rating: 4.6 (1200 reviews)"));
        assert!(text.contains("editorial: Iconic observation tower"));
        assert!(!text.contains("description:"));
        assert!(!text.contains("summary: |"));
        assert!(!text.contains("reviews:"));
        assert!(!text.contains("highlights:"));
    }

    #[test]
    fn raw_text_includes_description_and_highlights_when_present() {
        let mut poi = sample_poi();
        poi.description = "266m observation tower overlooking the city".into();
        let highlights = vec!["sunset views".to_string(), "cable car access".to_string()];
        let text = poi.build_raw_text(&highlights);
        assert!(text.contains("description: 266m observation tower overlooking the city"));
        assert!(text.contains("highlights: sunset views, cable car access"));
    }

    #[test]
    fn category_from_str_falls_back_gracefully() {
        assert_eq!("restaurant".parse::<Category>(), Ok(Category::Restaurant));
        assert!("totally_unknown".parse::<Category>().is_err());
    }
}
