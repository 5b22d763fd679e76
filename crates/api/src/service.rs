//! The services this binary can run.

use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    User,
    Email,
    Payment,
    Product,
    Cache,
    Search,
    Analytics,
    Report,
    Order,
    Inventory,
    /// Every service in one process.
    All,
}

impl Service {
    /// Every individual service, in startup order: consumers that only
    /// react come before the producers feeding them.
    pub const INDIVIDUAL: [Service; 10] = [
        Service::Email,
        Service::Cache,
        Service::Search,
        Service::Analytics,
        Service::Report,
        Service::Inventory,
        Service::Payment,
        Service::Order,
        Service::Product,
        Service::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::User => "user",
            Service::Email => "email",
            Service::Payment => "payment",
            Service::Product => "product",
            Service::Cache => "cache",
            Service::Search => "search",
            Service::Analytics => "analytics",
            Service::Report => "report",
            Service::Order => "order",
            Service::Inventory => "inventory",
            Service::All => "all",
        }
    }

    /// Name reported by `/health`, e.g. `inventoryservice`.
    pub fn health_name(&self) -> String {
        format!("{}service", self.as_str())
    }

    /// The individual services this value stands for.
    pub fn members(&self) -> Vec<Service> {
        match self {
            Service::All => Self::INDIVIDUAL.to_vec(),
            single => vec![*single],
        }
    }

    pub fn info(&self) -> ServiceInfo {
        let (service, scenario, description) = match self {
            Service::User => (
                "UserService",
                "1 - Decoupling Non-Critical Tasks",
                "Registers users and publishes UserRegistered events for async email processing",
            ),
            Service::Email => (
                "EmailService",
                "1 - Decoupling Non-Critical Tasks",
                "Consumes UserRegistered events and sends welcome emails",
            ),
            Service::Payment => (
                "PaymentService",
                "2 - Long-Running Process / 5 - Saga",
                "Processes payments asynchronously and fails saga payments to trigger compensation",
            ),
            Service::Product => (
                "ProductService",
                "3 - Fan-Out Flow",
                "Updates products and broadcasts ProductUpdated events",
            ),
            Service::Cache => (
                "CacheService",
                "3 - Fan-Out Flow (Cache Invalidation)",
                "Consumes ProductUpdated events and invalidates cache in parallel",
            ),
            Service::Search => (
                "SearchService",
                "3 - Fan-Out Flow (Search Indexing)",
                "Consumes ProductUpdated events and reindexes search data in parallel",
            ),
            Service::Analytics => (
                "AnalyticsService",
                "3 - Fan-Out Flow / 6 - High-Throughput Ingestion",
                "Logs product analytics and buffers click tracking through the broker",
            ),
            Service::Report => (
                "ReportService",
                "4 - CPU-Intensive Task Offloading",
                "Offloads CPU-intensive report generation to background workers",
            ),
            Service::Order => (
                "OrderService",
                "5 - Choreography Saga",
                "Creates orders and starts the order saga",
            ),
            Service::Inventory => (
                "InventoryService",
                "5 - Choreography Saga",
                "Reserves stock and compensates when payment fails",
            ),
            Service::All => (
                "AllServices",
                "1-6",
                "Every service in one process on a shared broker",
            ),
        };
        ServiceInfo {
            service,
            version: env!("CARGO_PKG_VERSION"),
            architecture: "Event-Driven (Async)",
            scenario,
            description,
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub architecture: &'static str,
    pub scenario: &'static str,
    pub description: &'static str,
}

impl FromStr for Service {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let name = normalized.strip_suffix("service").unwrap_or(&normalized);
        Self::INDIVIDUAL
            .into_iter()
            .chain([Service::All])
            .find(|service| service.as_str() == name)
            .ok_or_else(|| format!("unknown service {value:?}"))
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_short_and_long_names() {
        assert_eq!("inventory".parse::<Service>().unwrap(), Service::Inventory);
        assert_eq!("OrderService".parse::<Service>().unwrap(), Service::Order);
        assert_eq!("all".parse::<Service>().unwrap(), Service::All);
        assert!("billing".parse::<Service>().is_err());
    }

    #[test]
    fn test_all_expands_to_every_service() {
        let members = Service::All.members();
        assert_eq!(members.len(), 10);
        assert!(!members.contains(&Service::All));
        assert_eq!(Service::Cache.members(), vec![Service::Cache]);
    }

    #[test]
    fn test_health_name() {
        assert_eq!(Service::Inventory.health_name(), "inventoryservice");
    }
}
