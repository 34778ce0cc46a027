use serde::{Deserialize, Serialize};

/// Closed set of turn intents. The classifier collaborator returns loose
/// text; anything not matching a known label lands on `General`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Booking,
    CustomerInfo,
    AvailabilityQuery,
    Rescheduling,
    Cancellation,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Booking => "booking",
            Intent::CustomerInfo => "customer_info",
            Intent::AvailabilityQuery => "availability_query",
            Intent::Rescheduling => "rescheduling",
            Intent::Cancellation => "cancellation",
            Intent::General => "general",
        }
    }

    pub fn parse_label(s: &str) -> Self {
        match s.trim().trim_matches('"').to_lowercase().as_str() {
            "booking" => Intent::Booking,
            "customer_info" => Intent::CustomerInfo,
            "availability_query" => Intent::AvailabilityQuery,
            "rescheduling" => Intent::Rescheduling,
            "cancellation" => Intent::Cancellation,
            _ => Intent::General,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_labels() {
        assert_eq!(Intent::parse_label("booking"), Intent::Booking);
        assert_eq!(Intent::parse_label(" Availability_Query \n"), Intent::AvailabilityQuery);
        assert_eq!(Intent::parse_label("\"customer_info\""), Intent::CustomerInfo);
    }

    #[test]
    fn test_unrecognized_label_falls_back_to_general() {
        assert_eq!(Intent::parse_label("smalltalk"), Intent::General);
        assert_eq!(Intent::parse_label(""), Intent::General);
    }
}
