//! Categorical features derived from a transaction candidate.
//!
//! Features are what leave the process when the mesh is consulted: buckets,
//! the address type and a short fingerprint instead of the raw address and
//! amount.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::clamp_unit;
use crate::transaction::TransactionCandidate;

/// Base risk before any categorical signal is applied.
pub const BASE_RISK: f64 = 0.18;

/// Hex characters kept from the address hash.
const FINGERPRINT_LEN: usize = 10;

/// Characters of the address kept as prefix.
const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountBucket {
    Bajo,
    Medio,
    Alto,
}

impl AmountBucket {
    pub fn from_amount(amount: f64) -> Self {
        if amount >= 5.0 {
            AmountBucket::Alto
        } else if amount >= 1.0 {
            AmountBucket::Medio
        } else {
            AmountBucket::Bajo
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeBucket {
    Baja,
    Media,
    Alta,
}

impl FeeBucket {
    pub fn from_fee_rate(fee_rate: f64) -> Self {
        if fee_rate >= 30.0 {
            FeeBucket::Alta
        } else if fee_rate <= 2.0 {
            FeeBucket::Baja
        } else {
            FeeBucket::Media
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Legacy,
    Segwit,
}

impl AddressType {
    /// P2PKH (`1...`) and P2SH (`3...`) addresses count as legacy.
    pub fn from_address(address: &str) -> Self {
        if address.starts_with('1') || address.starts_with('3') {
            AddressType::Legacy
        } else {
            AddressType::Segwit
        }
    }
}

/// Named risk signal reported back to the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignal {
    MontoAlto,
    MontoMedio,
    TarifaAlta,
    TarifaBaja,
    DireccionLegacy,
    DireccionSegwit,
}

impl RiskSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskSignal::MontoAlto => "monto_alto",
            RiskSignal::MontoMedio => "monto_medio",
            RiskSignal::TarifaAlta => "tarifa_alta",
            RiskSignal::TarifaBaja => "tarifa_baja",
            RiskSignal::DireccionLegacy => "direccion_legacy",
            RiskSignal::DireccionSegwit => "direccion_segwit",
        }
    }

    /// Risk added on top of [`BASE_RISK`] when the signal is present.
    pub fn risk_increment(&self) -> f64 {
        match self {
            RiskSignal::MontoAlto => 0.32,
            RiskSignal::MontoMedio => 0.18,
            RiskSignal::TarifaAlta => 0.12,
            RiskSignal::TarifaBaja => 0.08,
            RiskSignal::DireccionLegacy => 0.08,
            RiskSignal::DireccionSegwit => 0.0,
        }
    }
}

impl fmt::Display for RiskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Features shared with mesh peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFeatures {
    pub amount_bucket: AmountBucket,
    pub fee_bucket: FeeBucket,
    pub address_type: AddressType,
    pub address_prefix: String,
    pub address_fingerprint: String,
    pub network: String,
}

impl TransactionFeatures {
    /// Ordered risk signals matched by these features.
    pub fn risk_signals(&self) -> Vec<RiskSignal> {
        let mut signals = Vec::with_capacity(3);
        match self.amount_bucket {
            AmountBucket::Alto => signals.push(RiskSignal::MontoAlto),
            AmountBucket::Medio => signals.push(RiskSignal::MontoMedio),
            AmountBucket::Bajo => {}
        }
        match self.fee_bucket {
            FeeBucket::Alta => signals.push(RiskSignal::TarifaAlta),
            FeeBucket::Baja => signals.push(RiskSignal::TarifaBaja),
            FeeBucket::Media => {}
        }
        signals.push(match self.address_type {
            AddressType::Legacy => RiskSignal::DireccionLegacy,
            AddressType::Segwit => RiskSignal::DireccionSegwit,
        });
        signals
    }

    /// Base risk for these features, clamped to `[0, 1]`.
    pub fn base_risk(&self) -> f64 {
        base_risk(&self.risk_signals())
    }
}

/// Sum the increments of `signals` on top of [`BASE_RISK`].
pub fn base_risk(signals: &[RiskSignal]) -> f64 {
    clamp_unit(BASE_RISK + signals.iter().map(RiskSignal::risk_increment).sum::<f64>())
}

/// Derive the shareable features of a candidate.
pub fn derive_features(tx: &TransactionCandidate) -> TransactionFeatures {
    let digest = Sha256::digest(tx.address().as_bytes());
    let mut fingerprint = hex::encode(digest);
    fingerprint.truncate(FINGERPRINT_LEN);

    TransactionFeatures {
        amount_bucket: AmountBucket::from_amount(tx.amount()),
        fee_bucket: FeeBucket::from_fee_rate(tx.fee_rate()),
        address_type: AddressType::from_address(tx.address()),
        address_prefix: tx.address().chars().take(PREFIX_LEN).collect(),
        address_fingerprint: fingerprint,
        network: tx.network().to_string(),
    }
}
