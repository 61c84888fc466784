//! Personal finance category (PFC) taxonomy
//!
//! Primary categories are a closed set plus `Other` for codes the aggregator
//! sends that we don't know about. Discretionary and seasonal membership are
//! plain match tables.

use serde::{Deserialize, Serialize};

/// Fallback category for transactions without a primary category
pub const UNCATEGORIZED: &str = "UNCATEGORIZED";

/// Primary personal finance category
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Category {
    Income,
    TransferIn,
    TransferOut,
    LoanPayments,
    BankFees,
    Entertainment,
    FoodAndDrink,
    GeneralMerchandise,
    HomeImprovement,
    Medical,
    PersonalCare,
    GeneralServices,
    GovernmentAndNonProfit,
    Transportation,
    Travel,
    RentAndUtilities,
    Uncategorized,
    /// Any code outside the known taxonomy
    Other(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Income => "INCOME",
            Self::TransferIn => "TRANSFER_IN",
            Self::TransferOut => "TRANSFER_OUT",
            Self::LoanPayments => "LOAN_PAYMENTS",
            Self::BankFees => "BANK_FEES",
            Self::Entertainment => "ENTERTAINMENT",
            Self::FoodAndDrink => "FOOD_AND_DRINK",
            Self::GeneralMerchandise => "GENERAL_MERCHANDISE",
            Self::HomeImprovement => "HOME_IMPROVEMENT",
            Self::Medical => "MEDICAL",
            Self::PersonalCare => "PERSONAL_CARE",
            Self::GeneralServices => "GENERAL_SERVICES",
            Self::GovernmentAndNonProfit => "GOVERNMENT_AND_NON_PROFIT",
            Self::Transportation => "TRANSPORTATION",
            Self::Travel => "TRAVEL",
            Self::RentAndUtilities => "RENT_AND_UTILITIES",
            Self::Uncategorized => UNCATEGORIZED,
            Self::Other(code) => code.as_str(),
        }
    }

    /// Parse a primary category code, falling back to `Uncategorized` for
    /// missing or blank input
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Self::from(c.to_string()),
            None => Self::Uncategorized,
        }
    }

    /// Whether spend in this category is optional lifestyle spend
    ///
    /// Codes we don't recognize (including `UNCATEGORIZED`) count as
    /// discretionary; only known fixed obligations and money movement are
    /// excluded.
    pub fn is_discretionary(&self) -> bool {
        match self {
            Self::FoodAndDrink
            | Self::Entertainment
            | Self::GeneralMerchandise
            | Self::PersonalCare
            | Self::Travel
            | Self::HomeImprovement
            | Self::GeneralServices => true,
            Self::Income
            | Self::TransferIn
            | Self::TransferOut
            | Self::LoanPayments
            | Self::BankFees
            | Self::Medical
            | Self::GovernmentAndNonProfit
            | Self::Transportation
            | Self::RentAndUtilities => false,
            Self::Uncategorized | Self::Other(_) => true,
        }
    }

    /// Months (1-12) in which elevated spend in this category is expected
    pub fn seasonal_months(&self) -> &'static [u32] {
        const SUMMER_AND_HOLIDAY: &[u32] = &[6, 7, 8, 11, 12];
        const HOLIDAY: &[u32] = &[11, 12];

        match self {
            Self::Travel => SUMMER_AND_HOLIDAY,
            Self::Entertainment => SUMMER_AND_HOLIDAY,
            Self::GeneralMerchandise => HOLIDAY,
            _ => &[],
        }
    }

    pub fn is_seasonal_month(&self, month: u32) -> bool {
        self.seasonal_months().contains(&month)
    }
}

impl From<String> for Category {
    fn from(code: String) -> Self {
        match code.to_uppercase().as_str() {
            "INCOME" => Self::Income,
            "TRANSFER_IN" => Self::TransferIn,
            "TRANSFER_OUT" => Self::TransferOut,
            "LOAN_PAYMENTS" => Self::LoanPayments,
            "BANK_FEES" => Self::BankFees,
            "ENTERTAINMENT" => Self::Entertainment,
            "FOOD_AND_DRINK" => Self::FoodAndDrink,
            "GENERAL_MERCHANDISE" => Self::GeneralMerchandise,
            "HOME_IMPROVEMENT" => Self::HomeImprovement,
            "MEDICAL" => Self::Medical,
            "PERSONAL_CARE" => Self::PersonalCare,
            "GENERAL_SERVICES" => Self::GeneralServices,
            "GOVERNMENT_AND_NON_PROFIT" => Self::GovernmentAndNonProfit,
            "TRANSPORTATION" => Self::Transportation,
            "TRAVEL" => Self::Travel,
            "RENT_AND_UTILITIES" => Self::RentAndUtilities,
            UNCATEGORIZED => Self::Uncategorized,
            _ => Self::Other(code),
        }
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Convenience for category strings stored on aggregate rows
pub fn is_discretionary_code(code: &str) -> bool {
    Category::from(code.to_string()).is_discretionary()
}

/// Detailed categories that represent money moving between the user's own
/// accounts (or fees for doing so)
pub const INTERNAL_TRANSFER_DETAILED: &[&str] = &[
    "TRANSFER_IN_ACCOUNT_TRANSFER",
    "TRANSFER_OUT_ACCOUNT_TRANSFER",
    "TRANSFER_IN_SAVINGS",
    "TRANSFER_OUT_SAVINGS",
    "TRANSFER_IN_INVESTMENT_AND_RETIREMENT_FUNDS",
    "TRANSFER_OUT_INVESTMENT_AND_RETIREMENT_FUNDS",
    "TRANSFER_IN_DEPOSIT",
    "TRANSFER_OUT_WITHDRAWAL",
    "LOAN_PAYMENTS_CREDIT_CARD_PAYMENT",
    "BANK_FEES_INSUFFICIENT_FUNDS",
    "BANK_FEES_OVERDRAFT_FEES",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_known_codes() {
        let cat = Category::from("FOOD_AND_DRINK".to_string());
        assert_eq!(cat, Category::FoodAndDrink);
        assert_eq!(cat.as_str(), "FOOD_AND_DRINK");
        assert_eq!(Category::from("travel".to_string()), Category::Travel);
    }

    #[test]
    fn test_unknown_code_is_other_and_discretionary() {
        let cat = Category::from("PET_SUPPLIES".to_string());
        assert_eq!(cat, Category::Other("PET_SUPPLIES".to_string()));
        assert!(cat.is_discretionary());
        assert_eq!(cat.as_str(), "PET_SUPPLIES");
    }

    #[test]
    fn test_missing_code_is_uncategorized() {
        assert_eq!(Category::from_code(None), Category::Uncategorized);
        assert_eq!(Category::from_code(Some("  ")), Category::Uncategorized);
        assert_eq!(Category::from_code(None).as_str(), UNCATEGORIZED);
    }

    #[test]
    fn test_fixed_obligations_not_discretionary() {
        assert!(!Category::RentAndUtilities.is_discretionary());
        assert!(!Category::LoanPayments.is_discretionary());
        assert!(!Category::TransferOut.is_discretionary());
        assert!(Category::FoodAndDrink.is_discretionary());
        assert!(is_discretionary_code("ENTERTAINMENT"));
        assert!(!is_discretionary_code("MEDICAL"));
    }

    #[test]
    fn test_seasonal_months() {
        assert!(Category::Travel.is_seasonal_month(7));
        assert!(!Category::Travel.is_seasonal_month(3));
        assert!(Category::GeneralMerchandise.is_seasonal_month(12));
        assert!(!Category::GeneralMerchandise.is_seasonal_month(7));
        assert!(!Category::FoodAndDrink.is_seasonal_month(12));
    }
}
