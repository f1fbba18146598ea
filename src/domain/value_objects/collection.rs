use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ミラーストアのコレクション名。永続化時はワイヤ名（kebab-case）を使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    Events,
    TicketTypes,
    Tickets,
    Artists,
    Bookings,
    ScanLogs,
    SyncQueue,
    Settings,
    Planner,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Events,
        Collection::TicketTypes,
        Collection::Tickets,
        Collection::Artists,
        Collection::Bookings,
        Collection::ScanLogs,
        Collection::SyncQueue,
        Collection::Settings,
        Collection::Planner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::TicketTypes => "ticket-types",
            Collection::Tickets => "tickets",
            Collection::Artists => "artists",
            Collection::Bookings => "bookings",
            Collection::ScanLogs => "scan-logs",
            Collection::SyncQueue => "sync-queue",
            Collection::Settings => "settings",
            Collection::Planner => "planner",
        }
    }

    /// Collections that only exist on this device and have no remote endpoint.
    pub fn is_local_only(&self) -> bool {
        matches!(self, Collection::SyncQueue)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.as_str() == value)
            .ok_or_else(|| format!("Unknown collection: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>().unwrap(), collection);
        }
        assert!("tickets_v2".parse::<Collection>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Collection::TicketTypes).unwrap();
        assert_eq!(json, "\"ticket-types\"");
    }
}
