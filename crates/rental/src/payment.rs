use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleetdesk_core::{CompanyId, ContractId, Entity, PaymentId};

/// Payment classification.
///
/// Contract creation always produces one `Rental` and one `Deposit` row.
/// Closing fees arrive as free-form labels from the desk and classify to a
/// known kind, falling back to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Rental,
    Deposit,
    Damage,
    Fuel,
    Cleaning,
    Other,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Rental => "rental",
            PaymentKind::Deposit => "deposit",
            PaymentKind::Damage => "damage",
            PaymentKind::Fuel => "fuel",
            PaymentKind::Cleaning => "cleaning",
            PaymentKind::Other => "other",
        }
    }

    /// Classify a desk-supplied fee label.
    pub fn classify(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "rental" => PaymentKind::Rental,
            "deposit" => PaymentKind::Deposit,
            "damage" => PaymentKind::Damage,
            "fuel" => PaymentKind::Fuel,
            "cleaning" => PaymentKind::Cleaning,
            _ => PaymentKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub company_id: CompanyId,
    pub contract_id: ContractId,
    pub kind: PaymentKind,
    /// Free-form label as submitted, kept for the desk's records.
    pub label: Option<String>,
    /// Amount in the smallest currency unit.
    pub amount: u64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_labels_classify_to_their_kind() {
        assert_eq!(PaymentKind::classify("damage"), PaymentKind::Damage);
        assert_eq!(PaymentKind::classify("  Fuel "), PaymentKind::Fuel);
        assert_eq!(PaymentKind::classify("CLEANING"), PaymentKind::Cleaning);
    }

    #[test]
    fn free_form_labels_fall_back_to_other() {
        assert_eq!(PaymentKind::classify("scratched bumper"), PaymentKind::Other);
        assert_eq!(PaymentKind::classify(""), PaymentKind::Other);
    }

    proptest! {
        /// Classification is total and stable under whitespace/case noise.
        #[test]
        fn classify_never_panics_and_is_case_insensitive(label in ".*") {
            let kind = PaymentKind::classify(&label);
            prop_assert_eq!(PaymentKind::classify(&label.to_ascii_uppercase()), kind);
        }
    }
}
