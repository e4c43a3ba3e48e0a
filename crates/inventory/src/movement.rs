use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockledger_core::{DomainError, TenantId, UserId};
use stockledger_events::TenantScoped;

use crate::product::ProductId;

/// Ledger entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub Uuid);

impl MovementId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MovementId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Kind of stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Transfer,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "transfer" => Ok(MovementType::Transfer),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(DomainError::validation(format!(
                "unknown movement type '{other}'"
            ))),
        }
    }
}

/// Sign of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Stock location (warehouse, shelf, store) within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    pub const DEFAULT: &'static str = "main";

    pub fn new(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into().trim().to_string();
        if code.is_empty() {
            return Err(DomainError::validation("location cannot be empty"));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocationId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl core::fmt::Display for LocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable ledger entry.
///
/// Corrections are new compensating entries; an entry is never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub direction: Direction,
    /// Always positive; the sign comes from `direction`.
    pub quantity: i64,
    pub location: LocationId,
    /// Shared by both legs of a transfer.
    pub transfer_id: Option<MovementId>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
}

impl StockMovement {
    pub fn signed_delta(&self) -> i64 {
        match self.direction {
            Direction::Inbound => self.quantity,
            Direction::Outbound => -self.quantity,
        }
    }

    /// Counts toward consumption (forecasting).
    pub fn is_outflow(&self) -> bool {
        self.movement_type == MovementType::Out
    }
}

impl TenantScoped for StockMovement {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Trim optional free text, dropping empty strings.
pub(crate) fn clean_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
