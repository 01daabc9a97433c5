use crate::core::Amount;
use crate::network::NodeName;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "roster-chain", about = "Permissioned multi-node ledger")]
pub struct Opt {
    #[arg(long, global = true, help = "TOML settings file")]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        default_value = "A",
        help = "Roster node to act on (A, B or C)"
    )]
    pub node: NodeName,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a wallet and register it on every node")]
    Createwallet {
        #[arg(help = "Display name for the wallet")]
        name: String,
    },
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(name = "send", about = "Submit a signed transfer to the selected node")]
    Send {
        #[arg(help = "Source wallet address (must have local keys)")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send, e.g. 1.25")]
        amount: Amount,
        #[arg(long, default_value = "0", help = "Fee paid to the miner")]
        fee: Amount,
        #[arg(long, help = "Optional note stored with the transaction")]
        note: Option<String>,
        #[arg(long, help = "Mine immediately on the same node, rewarding the sender")]
        mine: bool,
    },
    #[command(name = "mine", about = "Mine pending transactions and broadcast the chain")]
    Mine {
        #[arg(long, help = "Reward address (must have local keys); defaults to the node key")]
        miner: Option<String>,
    },
    #[command(name = "printchain", about = "Print all blocks of the selected node")]
    Printchain,
    #[command(name = "validate", about = "Validate the selected node's chain block by block")]
    Validate,
    #[command(name = "balances", about = "Print balances replayed from the chain")]
    Balances {
        #[arg(long, help = "Include pending mempool transactions")]
        pending: bool,
    },
    #[command(name = "getwallet", about = "Show a wallet with its balance and history")]
    GetWallet {
        #[arg(help = "Wallet id on the selected node")]
        id: u64,
    },
    #[command(name = "getblock", about = "Print one block as JSON")]
    GetBlock {
        #[arg(help = "Block index")]
        index: u64,
    },
    #[command(
        name = "setdifficulty",
        about = "Set and record the difficulty the node mines at next"
    )]
    SetDifficulty {
        #[arg(help = "Leading zero hex digits required")]
        difficulty: u32,
    },
    #[command(name = "editblock", about = "Overwrite fields of a stored block")]
    EditBlock {
        #[arg(help = "Block index")]
        index: u64,
        #[arg(long, help = "New timestamp in milliseconds")]
        timestamp: Option<i64>,
        #[arg(long, help = "New base64 signature")]
        signature: Option<String>,
    },
    #[command(name = "exportchain", about = "Write the node's chain to a JSON file")]
    ExportChain {
        #[arg(help = "Output file")]
        file: PathBuf,
    },
    #[command(
        name = "importchain",
        about = "Offer a JSON chain to the node, then broadcast it if adopted"
    )]
    ImportChain {
        #[arg(help = "Input file")]
        file: PathBuf,
    },
    #[command(name = "simulate", about = "Run an in-memory roster scenario")]
    Simulate {
        #[arg(long, default_value_t = 3, help = "Blocks each node mines")]
        rounds: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_parses_amounts_and_flags() {
        let opt = Opt::try_parse_from([
            "roster-chain", "--node", "b", "send", "ADDR_1", "ADDR_2", "1.5", "--fee", "0.01",
            "--mine",
        ])
        .unwrap();
        assert_eq!(opt.node, NodeName::B);
        match opt.command {
            Command::Send {
                amount, fee, mine, ..
            } => {
                assert_eq!(amount, "1.5".parse().unwrap());
                assert_eq!(fee, "0.01".parse().unwrap());
                assert!(mine);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        assert!(Opt::try_parse_from(["roster-chain", "--node", "Z", "printchain"]).is_err());
    }

    #[test]
    fn test_node_defaults_to_primary() {
        let opt = Opt::try_parse_from(["roster-chain", "balances", "--pending"]).unwrap();
        assert_eq!(opt.node, NodeName::A);
        assert!(matches!(opt.command, Command::Balances { pending: true }));
    }
}
