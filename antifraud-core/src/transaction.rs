//! Transaction candidates and the raw request they are parsed from.

use serde::{Deserialize, Serialize};

use crate::error::{AntifraudError, Result};

/// A numeric field that may arrive as a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Number(f64),
    Text(String),
}

impl NumberLike {
    /// Interpret the value as a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            NumberLike::Number(n) => *n,
            NumberLike::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for NumberLike {
    fn from(value: f64) -> Self {
        NumberLike::Number(value)
    }
}

/// Inbound validation request as sent by the wallet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub amount: Option<NumberLike>,
    #[serde(default)]
    pub fee_rate: Option<NumberLike>,
}

impl ValidationRequest {
    pub fn new(address: impl Into<String>, amount: f64, fee_rate: f64) -> Self {
        Self {
            address: Some(address.into()),
            amount: Some(amount.into()),
            fee_rate: Some(fee_rate.into()),
        }
    }

    /// Validate the request into an immutable candidate on `network`.
    pub fn into_candidate(self, network: &str) -> Result<TransactionCandidate> {
        let address = self.address.unwrap_or_default();
        let amount = self.amount.as_ref().and_then(NumberLike::as_f64);
        let fee_rate = self.fee_rate.as_ref().and_then(NumberLike::as_f64);
        match (amount, fee_rate) {
            (Some(amount), Some(fee_rate)) => {
                TransactionCandidate::new(address, amount, fee_rate, network)
            }
            _ => Err(AntifraudError::InvalidRequest(
                "address, amount and feeRate are required".to_string(),
            )),
        }
    }
}

/// A transaction about to be broadcast.
///
/// Only constructible through [`TransactionCandidate::new`], so every value
/// has a non-empty address and strictly positive, finite amount and fee rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCandidate {
    address: String,
    amount: f64,
    fee_rate: f64,
    network: String,
}

impl TransactionCandidate {
    /// Create a validated candidate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the trimmed address is empty or if the
    /// amount or fee rate is not a finite number greater than zero.
    pub fn new(
        address: impl Into<String>,
        amount: f64,
        fee_rate: f64,
        network: impl Into<String>,
    ) -> Result<Self> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err(AntifraudError::InvalidRequest("address is empty".into()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AntifraudError::InvalidRequest(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        if !fee_rate.is_finite() || fee_rate <= 0.0 {
            return Err(AntifraudError::InvalidRequest(format!(
                "feeRate must be positive, got {}",
                fee_rate
            )));
        }
        Ok(Self {
            address,
            amount,
            fee_rate,
            network: network.into(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    pub fn network(&self) -> &str {
        &self.network
    }
}
