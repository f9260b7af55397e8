//! Balance command - show the sender account

use super::{connect, load_config};
use crate::style::*;
use crate::Cli;
use anyhow::Result;
use berry_deploy::types::format_ether;
use berry_deploy::OrchestratorError;

pub async fn run(cli: &Cli) -> Result<()> {
    print_header("Sender");

    let config = load_config(cli, false)?;
    let client = connect(&config, false)?;
    let sender = client.sender();

    let chain_id = client
        .chain_id()
        .await
        .map_err(|e| OrchestratorError::from_chain("eth_chainId", e, 1))?;
    let balance = client
        .balance(sender)
        .await
        .map_err(|e| OrchestratorError::from_chain("eth_getBalance", e, 1))?;
    let nonce = client
        .transaction_count(sender)
        .await
        .map_err(|e| OrchestratorError::from_chain("eth_getTransactionCount", e, 1))?;

    print_key_value("Network", &config.network.url);
    print_key_value("Chain ID", &chain_id.to_string());
    print_key_value("Address", &sender.to_checksum());
    print_key_value("Balance", &format!("{} ETH", format_ether(balance)));
    print_key_value("Nonce", &nonce.to_string());

    if chain_id != config.network.chain_id {
        println!();
        print_warning(&format!(
            "Endpoint serves chain {}, config expects {}",
            chain_id, config.network.chain_id
        ));
    }
    Ok(())
}
