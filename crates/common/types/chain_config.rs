use serde::{Deserialize, Serialize};

/// Consensus parameters of a chain, stored as JSON keyed by genesis hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub unit_price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive_sha_impl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istanbul: Option<IstanbulConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IstanbulConfig {
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub policy: u64,
    #[serde(default)]
    pub sub_group_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let config = ChainConfig {
            chain_id: 8217,
            unit_price: 25_000_000_000,
            derive_sha_impl: Some(2),
            istanbul: Some(IstanbulConfig {
                epoch: 604_800,
                policy: 2,
                sub_group_size: 22,
            }),
        };
        let encoded = serde_json::to_vec(&config).unwrap();
        let decoded: ChainConfig = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn missing_optional_fields_default() {
        let decoded: ChainConfig = serde_json::from_str(r#"{"chainId":1000}"#).unwrap();
        assert_eq!(decoded.chain_id, 1000);
        assert_eq!(decoded.unit_price, 0);
        assert!(decoded.istanbul.is_none());
    }
}
