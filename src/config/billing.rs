//! Billing configuration

use serde::Deserialize;

use crate::domain::foundation::YearMonthDay;
use crate::domain::membership::{ClassificationPolicy, OrderClassifier};

use super::error::ValidationError;

/// Billing rules applied at checkout and confirmation
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Renewals are denied once paid time already reaches this far ahead
    #[serde(default = "default_max_renewal_years")]
    pub max_renewal_years: u32,

    /// Currency of catalog prices (ISO 4217, lowercase)
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl BillingConfig {
    pub fn classification_policy(&self) -> ClassificationPolicy {
        ClassificationPolicy {
            max_renewal: YearMonthDay::years(self.max_renewal_years),
        }
    }

    /// Classifier configured with these rules
    pub fn classifier(&self) -> OrderClassifier {
        OrderClassifier::new(self.classification_policy())
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=10).contains(&self.max_renewal_years) {
            return Err(ValidationError::InvalidRenewalCeiling(self.max_renewal_years));
        }
        let well_formed =
            self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_lowercase());
        if !well_formed {
            return Err(ValidationError::InvalidCurrency(self.currency.clone()));
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            max_renewal_years: default_max_renewal_years(),
            currency: default_currency(),
        }
    }
}

fn default_max_renewal_years() -> u32 {
    3
}

fn default_currency() -> String {
    "cny".to_string()
}
