use serde::{Deserialize, Serialize};

use super::availability::WeeklyAvailability;

/// An offered service. Prices are integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub duration_minutes: i64,
    pub price_cents: i64,
}

/// A barber and everything the scheduler needs to know about them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub availability: WeeklyAvailability,
    pub services: Vec<Service>,
}

impl Provider {
    pub fn service(&self, id: i64) -> Option<&Service> {
        self.services.iter().find(|s| s.id == id)
    }

    /// Case-insensitive lookup by service name, for resolving names the
    /// extractor returns against the catalog.
    pub fn service_by_name(&self, name: &str) -> Option<&Service> {
        let needle = name.trim().to_lowercase();
        self.services
            .iter()
            .find(|s| s.name.to_lowercase() == needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> Provider {
        Provider {
            id: 1,
            name: "Alex Thompson".to_string(),
            availability: WeeklyAvailability::default(),
            services: vec![
                Service {
                    id: 10,
                    name: "Haircut".to_string(),
                    duration_minutes: 30,
                    price_cents: 3000,
                },
                Service {
                    id: 11,
                    name: "Beard Trim".to_string(),
                    duration_minutes: 20,
                    price_cents: 2000,
                },
            ],
        }
    }

    #[test]
    fn test_service_by_name_case_insensitive() {
        let p = provider();
        assert_eq!(p.service_by_name("haircut").unwrap().id, 10);
        assert_eq!(p.service_by_name(" BEARD TRIM ").unwrap().id, 11);
        assert!(p.service_by_name("perm").is_none());
    }
}
