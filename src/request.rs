use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Search input shared by every source adapter. Built once by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchRequest {
    pub destination: String,
    pub dates: DateRange,
    pub occupancy: Occupancy,
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
    #[serde(default)]
    pub bedrooms: u32,
    #[serde(default)]
    pub bathrooms: u32,
    #[serde(default)]
    pub pool: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Occupancy {
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub pets: u32,
    // Per-child ages, only forwarded by sources that accept them
    #[serde(default)]
    pub child_ages: Vec<u8>,
}

impl Occupancy {
    pub fn adults(adults: u32) -> Self {
        Self {
            adults,
            children: 0,
            pets: 0,
            child_ages: Vec::new(),
        }
    }
}

/// Logical property category. Each source maps these to its own vocabulary and
/// silently drops the ones it has no equivalent for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum PropertyType {
    Apartment,
    House,
    Guesthouse,
    Hotel,
    Other(String),
}

impl PropertyType {
    pub fn label(&self) -> &str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Guesthouse => "guesthouse",
            PropertyType::Hotel => "hotel",
            PropertyType::Other(label) => label,
        }
    }
}

impl From<&str> for PropertyType {
    fn from(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "apartment" => PropertyType::Apartment,
            "house" => PropertyType::House,
            "guesthouse" => PropertyType::Guesthouse,
            "hotel" => PropertyType::Hotel,
            other => PropertyType::Other(other.to_string()),
        }
    }
}

impl From<String> for PropertyType {
    fn from(label: String) -> Self {
        PropertyType::from(label.as_str())
    }
}

impl From<PropertyType> for String {
    fn from(property_type: PropertyType) -> Self {
        property_type.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json() {
        let json = r#"{
            "destination": "Valencia",
            "dates": {"check_in": "2025-04-20", "check_out": "2025-04-28"},
            "occupancy": {"adults": 2, "children": 1, "child_ages": [7]},
            "property_types": ["Apartment", "house", "castle"],
            "bedrooms": 1,
            "pool": true
        }"#;

        let request: SearchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.destination, "Valencia");
        assert_eq!(request.dates.nights(), 8);
        assert_eq!(request.occupancy.pets, 0);
        assert_eq!(request.occupancy.child_ages, vec![7]);
        assert_eq!(request.bathrooms, 0);
        assert!(request.pool);
        assert_eq!(
            request.property_types,
            vec![
                PropertyType::Apartment,
                PropertyType::House,
                PropertyType::Other("castle".to_string()),
            ]
        );
    }

    #[test]
    fn test_property_type_serializes_as_label() {
        let json = serde_json::to_string(&vec![PropertyType::Guesthouse, PropertyType::Hotel])
            .unwrap();
        assert_eq!(json, r#"["guesthouse","hotel"]"#);
    }
}
