// crates/bastion-daemon/src/genesis.rs
//
// Genesis loading for the daemon: either a JSON file on disk or a generated
// dev genesis with freshly generated ed25519 consensus keys.

use std::fs;

use rust_decimal::Decimal;

use bastion_core::crypto::Keypair;
use bastion_core::{Address, AddressCodec};
use bastion_staking::{CommissionRates, GenesisAccount, GenesisState, GenesisValidator, Params};

use crate::config::expand_tilde;

/// Balance minted to each dev validator account.
const DEV_ACCOUNT_BALANCE: u64 = 10_000_000_000;

/// Read and parse a JSON genesis file.
pub fn load(path: &str) -> Result<GenesisState, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(expand_tilde(path))?;
    let genesis: GenesisState = serde_json::from_str(&contents)?;
    genesis.validate()?;
    Ok(genesis)
}

/// Build a genesis with `count` validators whose self-bonds decrease by one
/// power unit each, so the initial set has a strict power order.
///
/// Operator addresses are taken from each key's consensus address.
pub fn dev_genesis(codec: &dyn AddressCodec, count: u32) -> GenesisState {
    let params = Params::default();
    let mut genesis = GenesisState {
        params: params.clone(),
        ..GenesisState::default()
    };

    for i in 0..count {
        let keypair = Keypair::generate();
        let operator = Address(keypair.consensus_pubkey().address().0);
        let encoded = codec.encode(operator.as_bytes());
        let self_bond = params.power_reduction * 1_000u64.saturating_sub(u64::from(i)).max(1);

        genesis.accounts.push(GenesisAccount {
            address: encoded.clone(),
            balance: DEV_ACCOUNT_BALANCE,
        });
        genesis.validators.push(GenesisValidator {
            operator: encoded,
            pubkey_type: "ed25519".to_string(),
            pubkey_hex: hex::encode(keypair.public_key_bytes()),
            moniker: format!("dev-validator-{}", i),
            commission: CommissionRates::new(
                Decimal::new(5, 2),
                Decimal::new(20, 2),
                Decimal::new(1, 2),
            ),
            min_self_delegation: params.power_reduction,
            self_bond,
        });
    }
    genesis
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::HexCodec;

    #[test]
    fn test_dev_genesis_is_valid() {
        let genesis = dev_genesis(&HexCodec::default(), 3);
        assert_eq!(genesis.accounts.len(), 3);
        assert_eq!(genesis.validators.len(), 3);
        assert!(genesis.validate().is_ok());
        assert!(genesis.validators[0].self_bond > genesis.validators[2].self_bond);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load("/nonexistent/bastion/genesis.json").is_err());
    }
}
