use serde::{Deserialize, Serialize};

/// What an early termination costs when the landlord names no figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenaltyPolicy {
    /// No default penalty.
    None,
    /// Forfeit the deposit.
    Deposit,
    /// A fixed number of months of rent.
    MonthsOfRent { months: i64 },
}

/// Pricing and termination rules applied by the lease planner.
///
/// Absent fields deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeasePolicy {
    /// Deposit charged at booking, in months of rent.
    pub deposit_months: i64,
    pub default_penalty: PenaltyPolicy,
    /// Longest lease accepted at booking.
    pub max_lease_months: i64,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            deposit_months: 1,
            default_penalty: PenaltyPolicy::Deposit,
            max_lease_months: 60,
        }
    }
}

impl LeasePolicy {
    /// Reject settings the planner cannot price with.
    pub fn validate(&self) -> Result<(), String> {
        if self.deposit_months < 0 {
            return Err(format!("deposit_months must be >= 0, got {}", self.deposit_months));
        }
        if self.max_lease_months < 1 {
            return Err(format!(
                "max_lease_months must be >= 1, got {}",
                self.max_lease_months
            ));
        }
        if let PenaltyPolicy::MonthsOfRent { months } = self.default_penalty {
            if months < 0 {
                return Err(format!("months_of_rent penalty must be >= 0, got {months}"));
            }
        }
        Ok(())
    }
}
