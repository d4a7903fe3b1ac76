//! Common types used across the seat pool services

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Provider ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ProviderId(pub Uuid);

impl ProviderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ProviderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Organization ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct OrganizationId(pub Uuid);

impl OrganizationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrganizationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Plan tier an organization (or a provider's seat pool) is billed on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    FamiliesAnnually,
    TeamsMonthly,
    TeamsAnnually,
    EnterpriseMonthly,
    EnterpriseAnnually,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanTier {
    /// Tiers a provider can hold a pooled seat ledger for
    pub const POOLED: [PlanTier; 2] = [Self::TeamsMonthly, Self::EnterpriseMonthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::FamiliesAnnually => "families_annually",
            Self::TeamsMonthly => "teams_monthly",
            Self::TeamsAnnually => "teams_annually",
            Self::EnterpriseMonthly => "enterprise_monthly",
            Self::EnterpriseAnnually => "enterprise_annually",
        }
    }

    /// Human-readable plan name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::FamiliesAnnually => "Families",
            Self::TeamsMonthly | Self::TeamsAnnually => "Teams",
            Self::EnterpriseMonthly | Self::EnterpriseAnnually => "Enterprise",
        }
    }

    /// Whether seats on this tier can be drawn from a provider's shared pool
    pub fn supports_pooled_billing(&self) -> bool {
        Self::POOLED.contains(self)
    }

    /// The pooled tier a client organization on this plan is managed under.
    /// Teams and Enterprise plans (monthly or annual) collapse onto their
    /// monthly provider tier; other plans cannot be managed by a provider.
    pub fn managed_tier(&self) -> Option<PlanTier> {
        match self {
            Self::TeamsMonthly | Self::TeamsAnnually => Some(Self::TeamsMonthly),
            Self::EnterpriseMonthly | Self::EnterpriseAnnually => Some(Self::EnterpriseMonthly),
            Self::Free | Self::FamiliesAnnually => None,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "families_annually" => Ok(Self::FamiliesAnnually),
            "teams_monthly" => Ok(Self::TeamsMonthly),
            "teams_annually" => Ok(Self::TeamsAnnually),
            "enterprise_monthly" => Ok(Self::EnterpriseMonthly),
            "enterprise_annually" => Ok(Self::EnterpriseAnnually),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

/// Kind of provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Managed service provider billed for a pooled seat count
    Msp,
    /// Reseller; clients are billed individually, no seat pool
    Reseller,
    /// Business unit drawing from a single enterprise pool
    BusinessUnit,
}

impl ProviderType {
    pub fn supports_pooled_billing(&self) -> bool {
        !matches!(self, Self::Reseller)
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Msp => write!(f, "msp"),
            Self::Reseller => write!(f, "reseller"),
            Self::BusinessUnit => write!(f, "business_unit"),
        }
    }
}

/// Lifecycle status of a client organization relative to its provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    /// Invited, not yet set up
    Pending,
    /// Standalone organization (not drawing from a provider pool)
    Created,
    /// Seats count toward the provider's pool
    Managed,
}

impl Default for OrganizationStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl std::fmt::Display for OrganizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Created => write!(f, "created"),
            Self::Managed => write!(f, "managed"),
        }
    }
}
