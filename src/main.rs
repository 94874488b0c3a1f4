//! Via Deposit Launcher
//!
//! Deposits BTC from a wallet into the Via bridge.
//!
//! Usage:
//!   via-deposit deposit --address <addr> --pubkey <hex>
//!   via-deposit config
//!   via-deposit help

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use via_deposit::common::init_from_config;
use via_deposit::{DepositConfig, DepositPipeline, EsploraClient, HttpSigner, OwnedAddress};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::FAILURE;
    }

    match args[1].as_str() {
        "deposit" => cmd_deposit(&args[2..]).await,
        "config" => cmd_config(),
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("Via Bridge Deposit");
    println!();
    println!("Usage:");
    println!("  via-deposit deposit --address <addr> --pubkey <hex>   Deposit into the bridge");
    println!("  via-deposit config                                    Show effective config");
    println!("  via-deposit help                                      Show this message");
    println!();
    println!("Examples:");
    println!("  via-deposit deposit --address tb1q... --pubkey 02...");
    println!();
    println!("Environment:");
    println!("  VIA_NETWORK          mainnet | testnet (default testnet)");
    println!("  VIA_BRIDGE_ADDRESS   Bridge address (required on mainnet)");
    println!("  VIA_L2_RECEIVER      L2 receiver id, hex (required on mainnet)");
    println!("  VIA_DEPOSIT_SATS     Deposit amount in sats (default 1500)");
    println!("  VIA_FEE_SATS         Fee in sats (default 300)");
    println!("  VIA_ESPLORA_URL      Esplora API URL");
    println!("  VIA_EXPLORER_URL     Explorer tx URL prefix");
    println!("  VIA_SIGNER_URL       External signer endpoint");
    println!("  VIA_LOG_LEVEL        trace | debug | info | warn | error");
    println!("  VIA_LOG_JSON         1 for JSON logs");
}

fn load_config() -> Option<DepositConfig> {
    let config = match DepositConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return None;
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    Some(config)
}

fn cmd_config() -> ExitCode {
    let Some(config) = load_config() else {
        return ExitCode::FAILURE;
    };

    config.print_summary();

    println!("Network:       {:?}", config.network);
    println!("Bridge:        {}", config.bridge_address);
    println!("L2 receiver:   {}", config.receiver);
    println!("Deposit:       {} sats", config.deposit_amount.to_sat());
    println!("Fee:           {} sats", config.fee.to_sat());
    println!("Esplora:       {}", config.esplora_url);
    println!("Explorer:      {}", config.explorer_url);
    println!("Signer:        {}", config.signer_url);

    ExitCode::SUCCESS
}

async fn cmd_deposit(args: &[String]) -> ExitCode {
    let mut address = None;
    let mut pubkey = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--address" if i + 1 < args.len() => {
                address = Some(args[i + 1].clone());
                i += 2;
            }
            "--pubkey" if i + 1 < args.len() => {
                pubkey = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }

    let (Some(address), Some(pubkey)) = (address, pubkey) else {
        println!("Usage: via-deposit deposit --address <addr> --pubkey <hex>");
        return ExitCode::FAILURE;
    };

    let Some(config) = load_config() else {
        return ExitCode::FAILURE;
    };

    let esplora = Arc::new(EsploraClient::new(&config.esplora_url));
    let signer = Arc::new(HttpSigner::new(&config.signer_url));
    let pipeline = DepositPipeline::new(config, esplora.clone(), signer, esplora);

    let owner = OwnedAddress::new(&address, &pubkey);

    println!("Depositing {} sats from {}", pipeline.config().deposit_amount.to_sat(), owner.address);
    println!("Approve the request in your wallet...");

    match pipeline.deposit(&owner).await {
        Ok(receipt) => {
            println!();
            println!("Deposit broadcast!");
            println!("  Txid:     {}", receipt.txid);
            println!("  Amount:   {} sats", receipt.amount.to_sat());
            println!("  Fee:      {} sats", receipt.fee.to_sat());
            if let Some(change) = receipt.change {
                println!("  Change:   {} sats", change.to_sat());
            }
            println!("  Explorer: {}", receipt.explorer_url);
            ExitCode::SUCCESS
        }
        Err(e) if e.is_user_cancellation() => {
            println!("Deposit cancelled in wallet.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            ExitCode::FAILURE
        }
    }
}
