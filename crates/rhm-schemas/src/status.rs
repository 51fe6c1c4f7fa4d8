//! Closed status vocabularies for every stateful entity.
//!
//! Statuses are stored and transmitted as SCREAMING_SNAKE tokens. Parsing is
//! strict: an unknown token is an error, never a silent fallback.

use serde::{Deserialize, Serialize};

/// Returned when a status token is not part of the entity's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus {
    pub entity: &'static str,
    pub token: String,
}

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} status: {:?}", self.entity, self.token)
    }
}

impl std::error::Error for UnknownStatus {}

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle of an order / lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Booked, awaiting payment.
    Pending,
    /// Paid; the tenant occupies the house.
    #[serde(alias = "PAID")]
    Active,
    /// Abandoned before payment. **Terminal.**
    Canceled,
    /// Tenant asked to end the lease early; awaiting the landlord.
    TerminateRequested,
    /// Landlord accepted the early end; awaiting move-out confirmation.
    TerminateApproved,
    /// Landlord refused the early end. Transient: the lease returns to `Active`.
    TerminateRejected,
    /// Ended early. **Terminal.**
    Terminated,
    /// Ran to its contractual end. **Terminal.**
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Active,
        OrderStatus::Canceled,
        OrderStatus::TerminateRequested,
        OrderStatus::TerminateApproved,
        OrderStatus::TerminateRejected,
        OrderStatus::Terminated,
        OrderStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Active => "ACTIVE",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::TerminateRequested => "TERMINATE_REQUESTED",
            OrderStatus::TerminateApproved => "TERMINATE_APPROVED",
            OrderStatus::TerminateRejected => "TERMINATE_REJECTED",
            OrderStatus::Terminated => "TERMINATED",
            OrderStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            // Legacy rows recorded payment as PAID.
            "ACTIVE" | "PAID" => Ok(OrderStatus::Active),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "TERMINATE_REQUESTED" => Ok(OrderStatus::TerminateRequested),
            "TERMINATE_APPROVED" => Ok(OrderStatus::TerminateApproved),
            "TERMINATE_REJECTED" => Ok(OrderStatus::TerminateRejected),
            "TERMINATED" => Ok(OrderStatus::Terminated),
            "COMPLETED" => Ok(OrderStatus::Completed),
            other => Err(UnknownStatus {
                entity: "order",
                token: other.to_string(),
            }),
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Terminated | Self::Completed)
    }

    /// Returns `true` while the tenant occupies the house, i.e. the lease is
    /// in force. A house is RENTED exactly when one such order references it.
    pub fn is_in_force(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::TerminateRequested | Self::TerminateApproved
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// HouseStatus
// ---------------------------------------------------------------------------

/// Moderation and occupancy state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HouseStatus {
    /// Submitted, awaiting admin review.
    Pending,
    /// Reviewed and available.
    Approved,
    /// Refused by an admin; editable for resubmission.
    Rejected,
    /// Actively promoted in search results.
    Online,
    /// Withdrawn from the market by its owner.
    Offline,
    /// Occupied by an in-force lease. Written only by the lease handler.
    Rented,
    /// Soft-deleted. **Terminal.**
    Deleted,
}

impl HouseStatus {
    pub const ALL: [HouseStatus; 7] = [
        HouseStatus::Pending,
        HouseStatus::Approved,
        HouseStatus::Rejected,
        HouseStatus::Online,
        HouseStatus::Offline,
        HouseStatus::Rented,
        HouseStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HouseStatus::Pending => "PENDING",
            HouseStatus::Approved => "APPROVED",
            HouseStatus::Rejected => "REJECTED",
            HouseStatus::Online => "ONLINE",
            HouseStatus::Offline => "OFFLINE",
            HouseStatus::Rented => "RENTED",
            HouseStatus::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "PENDING" => Ok(HouseStatus::Pending),
            "APPROVED" => Ok(HouseStatus::Approved),
            "REJECTED" => Ok(HouseStatus::Rejected),
            "ONLINE" => Ok(HouseStatus::Online),
            "OFFLINE" => Ok(HouseStatus::Offline),
            "RENTED" => Ok(HouseStatus::Rented),
            "DELETED" => Ok(HouseStatus::Deleted),
            other => Err(UnknownStatus {
                entity: "house",
                token: other.to_string(),
            }),
        }
    }

    /// A tenant may book (and pay for) the house.
    pub fn is_rentable(&self) -> bool {
        matches!(self, Self::Approved | Self::Online)
    }

    /// Taken off the market independently of any lease.
    pub fn is_withdrawn(&self) -> bool {
        matches!(self, Self::Offline | Self::Deleted)
    }

    /// Visible to tenants browsing the catalogue.
    pub fn is_listed(&self) -> bool {
        matches!(self, Self::Approved | Self::Online | Self::Rented)
    }
}

impl std::fmt::Display for HouseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HouseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// AppointmentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Canceled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Approved,
        AppointmentStatus::Rejected,
        AppointmentStatus::Completed,
        AppointmentStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Approved => "APPROVED",
            AppointmentStatus::Rejected => "REJECTED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "PENDING" => Ok(AppointmentStatus::Pending),
            "APPROVED" => Ok(AppointmentStatus::Approved),
            "REJECTED" => Ok(AppointmentStatus::Rejected),
            "COMPLETED" => Ok(AppointmentStatus::Completed),
            "CANCELED" => Ok(AppointmentStatus::Canceled),
            other => Err(UnknownStatus {
                entity: "appointment",
                token: other.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Canceled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_tokens_round_trip_through_parse() {
        for st in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(st.as_str()).unwrap(), st);
        }
    }

    #[test]
    fn legacy_paid_token_parses_as_active() {
        assert_eq!(OrderStatus::parse("PAID").unwrap(), OrderStatus::Active);
        let st: OrderStatus = serde_json::from_str("\"PAID\"").unwrap();
        assert_eq!(st, OrderStatus::Active);
    }

    #[test]
    fn unknown_token_is_rejected_not_defaulted() {
        let err = HouseStatus::parse("rented").unwrap_err();
        assert_eq!(err.entity, "house");
        assert!(err.to_string().contains("invalid house status"));
        assert!(AppointmentStatus::parse("").is_err());
    }

    #[test]
    fn in_force_statuses_are_exactly_the_occupying_ones() {
        let in_force: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.is_in_force())
            .collect();
        assert_eq!(
            in_force,
            vec![
                OrderStatus::Active,
                OrderStatus::TerminateRequested,
                OrderStatus::TerminateApproved
            ]
        );
        assert!(OrderStatus::ALL
            .iter()
            .all(|s| !(s.is_terminal() && s.is_in_force())));
    }

    #[test]
    fn serde_uses_screaming_snake_tokens() {
        let s = serde_json::to_string(&OrderStatus::TerminateRequested).unwrap();
        assert_eq!(s, "\"TERMINATE_REQUESTED\"");
        let h: HouseStatus = serde_json::from_str("\"OFFLINE\"").unwrap();
        assert!(h.is_withdrawn());
    }
}
