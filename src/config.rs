use serde::{Deserialize, Serialize};

use crate::decimal::{Money, CURRENCY_SCALE};
use crate::errors::{LedgerError, Result};

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// absolute difference treated as "fully paid" / "fully applied"
    pub tolerance: Money,
    /// decimal places stored amounts are rounded to
    pub currency_scale: u32,
    /// allocate a payment to open installments as soon as it is recorded
    pub allocate_on_create: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tolerance: Money::TOLERANCE,
            currency_scale: CURRENCY_SCALE,
            allocate_on_create: true,
        }
    }
}

impl LedgerConfig {
    /// parse from json, missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::Configuration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tolerance.is_negative() {
            return Err(LedgerError::Configuration {
                message: format!("tolerance must not be negative, got {}", self.tolerance),
            });
        }
        if self.currency_scale > 8 {
            return Err(LedgerError::Configuration {
                message: format!("currency scale {} exceeds 8 places", self.currency_scale),
            });
        }
        Ok(())
    }

    /// round an amount to the configured scale
    pub fn round(&self, amount: Money) -> Money {
        amount.round_dp(self.currency_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.tolerance, Money::from_minor(1));
        assert_eq!(config.currency_scale, 2);
        assert!(config.allocate_on_create);
    }

    #[test]
    fn test_from_json_partial() {
        let config = LedgerConfig::from_json(r#"{ "allocate_on_create": false }"#).unwrap();
        assert!(!config.allocate_on_create);
        assert_eq!(config.tolerance, Money::TOLERANCE);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = LedgerConfig::from_json(r#"{ "tolerance": "-0.5" }"#).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration { .. }));

        let err = LedgerConfig::from_json(r#"{ "currency_scale": 12 }"#).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration { .. }));

        assert!(LedgerConfig::from_json("not json").is_err());
    }
}
