//! # Closed Domain Enums
//!
//! Every categorical field in the custody domain is a closed enum, so a new
//! variant has to be handled by every `match` over it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;

/// Kind of physical asset handed to a teller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Printer,
    Tablet,
    Key,
    Charger,
    CashBox,
    Stand,
    #[default]
    Other,
}

impl AssetKind {
    /// All asset kinds, in declaration order.
    pub const ALL: [AssetKind; 7] = [
        Self::Printer,
        Self::Tablet,
        Self::Key,
        Self::Charger,
        Self::CashBox,
        Self::Stand,
        Self::Other,
    ];

    /// Three-letter code embedded in asset ids.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Printer => "PRN",
            Self::Tablet => "TAB",
            Self::Key => "KEY",
            Self::Charger => "CHG",
            Self::CashBox => "CSH",
            Self::Stand => "STD",
            Self::Other => "OTH",
        }
    }

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Printer => "printer",
            Self::Tablet => "tablet",
            Self::Key => "key",
            Self::Charger => "charger",
            Self::CashBox => "cashBox",
            Self::Stand => "stand",
            Self::Other => "other",
        }
    }
}

/// Urgency of a deployment. Ordered `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Wire name of the priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// Physical condition reported when equipment comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReturnCondition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
    Damaged,
    Lost,
}

impl ReturnCondition {
    /// Wire name of the condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Damaged => "damaged",
            Self::Lost => "lost",
        }
    }
}

/// What a deployment carries, at the level of the whole loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentItemType {
    #[default]
    Equipment,
    Cash,
    Supplies,
    Documents,
    Other,
}

impl DeploymentItemType {
    /// Wire name of the item type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equipment => "equipment",
            Self::Cash => "cash",
            Self::Supplies => "supplies",
            Self::Documents => "documents",
            Self::Other => "other",
        }
    }
}

impl FromStr for AssetKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the legacy snake_case spelling used on printed stickers.
        match s.trim() {
            "printer" => Ok(Self::Printer),
            "tablet" => Ok(Self::Tablet),
            "key" | "keys" => Ok(Self::Key),
            "charger" => Ok(Self::Charger),
            "cashBox" | "cash_box" => Ok(Self::CashBox),
            "stand" => Ok(Self::Stand),
            "other" => Ok(Self::Other),
            other => Err(ValidationError::UnknownVariant {
                kind: "asset kind",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(ValidationError::UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for ReturnCondition {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "excellent" => Ok(Self::Excellent),
            "good" => Ok(Self::Good),
            "fair" => Ok(Self::Fair),
            "poor" => Ok(Self::Poor),
            "damaged" => Ok(Self::Damaged),
            "lost" => Ok(Self::Lost),
            other => Err(ValidationError::UnknownVariant {
                kind: "return condition",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for ReturnCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_kind_codes_are_unique() {
        let mut codes: Vec<&str> = AssetKind::ALL.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), AssetKind::ALL.len());
    }

    #[test]
    fn asset_kind_wire_names_round_trip_through_from_str() {
        for kind in AssetKind::ALL {
            assert_eq!(kind.as_str().parse::<AssetKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn legacy_sticker_spellings_parse() {
        assert_eq!("cash_box".parse::<AssetKind>().unwrap(), AssetKind::CashBox);
        assert_eq!("keys".parse::<AssetKind>().unwrap(), AssetKind::Key);
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn unknown_condition_is_rejected() {
        let err = "shiny".parse::<ReturnCondition>().unwrap_err();
        assert!(err.to_string().contains("shiny"));
    }
}
