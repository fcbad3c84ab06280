use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub bettor: String,
    pub outcome: u8,
    pub amount: Decimal,
    #[serde(default)]
    pub placed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub total_staked: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportMeta {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub starts_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub settled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_outcome: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<i64>,
}

/// Locally persisted snapshot of a betting box, keyed by its address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedBox {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub bets: Vec<Bet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_data: Option<TokenData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<SportMeta>,
    #[serde(default)]
    pub settlement: Settlement,
    /// Milliseconds since epoch; drives pruning.
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<Vec<Value>>,
}

impl CachedBox {
    /// Copy without the transient fields that are never persisted.
    pub fn stripped(&self) -> Self {
        Self {
            image_data: None,
            recent_activity: None,
            ..self.clone()
        }
    }

    pub fn total_staked(&self) -> Decimal {
        self.bets.iter().map(|bet| bet.amount).sum()
    }
}
