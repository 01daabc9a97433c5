// This is my main entry point for the roster-chain CLI application
// Every invocation opens the whole roster from disk, acts on one node, and lets broadcasts reach the rest
use clap::Parser;
use log::{error, LevelFilter};
use roster_chain::core::{StakingContract, TimeLockContract};
use roster_chain::utils::{from_json, to_json_pretty};
use roster_chain::{
    validate_address, Amount, Block, BlockEdit, BroadcastReport, ChainSettings, Command, Keystore,
    NodeName, Opt, Roster, SyncOutcome, Transaction, WalletKeys, KEYSTORE_FILE,
};
use std::fs;
use std::process;

fn main() {
    // I initialize logging so I can see what's happening on every node
    // Info by default, RUST_LOG still wins when it is set
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// This is where I handle all the different CLI commands
fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let settings = ChainSettings::load(opt.config.as_deref())?;
    match opt.command {
        // The simulation never touches the data directory
        Command::Simulate { rounds } => simulate(&settings, rounds),
        command => run_node_command(&settings, opt.node, command),
    }
}

// Everything except the simulation acts on the persisted roster
fn run_node_command(
    settings: &ChainSettings,
    node_name: NodeName,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    let roster = Roster::open(settings)?;
    let node = roster.node(node_name);
    let mut keystore = Keystore::open(&settings.data_dir.join(KEYSTORE_FILE));

    match command {
        // When I want a new participant: keys stay local, the public key goes to every node
        Command::Createwallet { name } => {
            let keys = WalletKeys::generate()?;
            let wallet = roster.register_wallet(keys.public_key(), &name)?;
            keystore.insert(&name, keys)?;
            println!("Your new address: {}", wallet.get_address());
        }
        Command::ListAddresses => {
            for address in keystore.get_addresses() {
                let entry = keystore.require(&address)?;
                println!("{address}  {}", entry.label);
            }
        }
        // When I want to move funds: sign locally, submit to the chosen node
        Command::Send {
            from,
            to,
            amount,
            fee,
            note,
            mine,
        } => {
            if !validate_address(&to) {
                return Err(format!("Invalid recipient address: {to}").into());
            }
            let sender = keystore.require(&from)?;
            let mut tx = Transaction::new(&from, &to, amount, fee);
            if let Some(note) = note {
                tx = tx.with_note(&note);
            }
            tx.sign(sender.keys.private_key())?;
            let stored = roster.submit_transaction(node_name, tx)?;
            println!("Transaction {} accepted by node {node_name}", stored.get_id());

            if mine {
                let report = roster.mine_and_broadcast(node_name, sender.keys.private_key())?;
                print_report(&report);
            }
        }
        Command::Mine { miner } => {
            let report = match miner {
                Some(address) => {
                    let entry = keystore.require(&address)?;
                    roster.mine_and_broadcast(node_name, entry.keys.private_key())?
                }
                None => roster.mine_and_broadcast(node_name, node.node_keys().private_key())?,
            };
            print_report(&report);
        }
        Command::Printchain => {
            for block in node.chain()? {
                print_block(&block);
            }
        }
        Command::Validate => {
            let report = node.validation_report()?;
            println!("{}", to_json_pretty(&report)?);
        }
        Command::Balances { pending } => {
            for (address, balance) in node.compute_balances(pending)? {
                println!("{address}: {balance}");
            }
        }
        Command::GetWallet { id } => {
            let overview = node.wallet_overview(id)?;
            println!("{}", to_json_pretty(&overview)?);
        }
        Command::GetBlock { index } => {
            let block = node.get_block(index)?;
            println!("{}", to_json_pretty(&block)?);
        }
        // The node's store records the value, so the next mine picks it up
        Command::SetDifficulty { difficulty } => {
            let applied = node.set_difficulty(difficulty)?;
            println!("Node {node_name} difficulty set to {applied}");
            println!("Average mining time: {} ms", node.average_mining_time_ms());
        }
        // When I want to show that validation catches tampering
        Command::EditBlock {
            index,
            timestamp,
            signature,
        } => {
            let block = node.edit_block(index, &BlockEdit { timestamp, signature })?;
            print_block(&block);
            println!("Chain valid after edit: {}", node.is_chain_valid()?);
        }
        Command::ExportChain { file } => {
            let chain = node.chain()?;
            fs::write(&file, to_json_pretty(&chain)?)?;
            println!("Wrote {} blocks to {}", chain.len(), file.display());
        }
        Command::ImportChain { file } => {
            let chain: Vec<Block> = from_json(&fs::read_to_string(&file)?)?;
            match node.try_adopt_external_chain(&chain)? {
                SyncOutcome::Adopted { length } => {
                    println!("Node {node_name} adopted chain of length {length}");
                    for peer in roster.broadcast_chain(node_name)? {
                        println!("  {}: {:?}", peer.peer, peer.result);
                    }
                }
                SyncOutcome::Rejected(reason) => println!("Chain rejected: {reason}"),
            }
        }
        Command::Simulate { .. } => {
            return Err("simulate runs in memory and cannot target a stored node".into())
        }
    }
    Ok(())
}

fn print_block(block: &Block) {
    println!("Block {} (difficulty {})", block.get_index(), block.get_difficulty());
    println!("  Prev hash: {}", block.get_previous_hash());
    println!("  Hash:      {}", block.get_hash());
    println!("  Timestamp: {}", block.get_timestamp());
    println!("  Nonce:     {}", block.get_nonce());
    println!("  Mined in:  {} ms", block.get_mining_duration_ms());
    println!("  Signed:    {}", block.verify());
    for tx in block.get_transactions() {
        println!(
            "  - tx {}: {} -> {} amount {} fee {}",
            tx.get_id(),
            tx.get_from_address(),
            tx.get_to_address(),
            tx.get_amount(),
            tx.get_fee()
        );
    }
    println!();
}

fn print_report(report: &BroadcastReport) {
    println!(
        "Node {} mined block {} ({})",
        report.origin,
        report.block.get_index(),
        report.block.get_hash()
    );
    for peer in &report.peers {
        match &peer.result {
            Ok(SyncOutcome::Adopted { length }) => {
                println!("  {} adopted chain of length {length}", peer.peer)
            }
            Ok(SyncOutcome::Rejected(reason)) => println!("  {} rejected: {reason}", peer.peer),
            Err(e) => println!("  {} failed: {e}", peer.peer),
        }
    }
}

// A self-contained run: wallets, transfers, contracts and a fork, all in memory
fn simulate(settings: &ChainSettings, rounds: u64) -> Result<(), Box<dyn std::error::Error>> {
    let roster = Roster::new(settings)?;
    let (alice, alice_keys) = roster.create_wallet("alice")?;
    let (bob, _) = roster.create_wallet("bob")?;

    let staking = roster
        .node(NodeName::A)
        .add_contract(Box::new(StakingContract::new("0.01".parse()?, 2)?))?;
    let lock = roster
        .node(NodeName::B)
        .add_contract(Box::new(TimeLockContract::new(rounds * 3)?))?;
    println!("Staking contract on A: {}", staking.address);
    println!("Time lock on B until block {}: {}", rounds * 3, lock.address);

    // Alice earns block rewards on every node in turn
    for round in 0..rounds {
        for name in NodeName::ALL {
            let report = roster.mine_and_broadcast(name, alice_keys.private_key())?;
            println!(
                "round {round}: node {name} mined block {}, adopted by {:?}",
                report.block.get_index(),
                report.adopted_by()
            );
        }
    }

    let primary = roster.node(NodeName::A);
    let transfer = Transaction::new_signed(
        alice.get_address(),
        bob.get_address(),
        "1.5".parse()?,
        "0.1".parse()?,
        alice_keys.private_key(),
    )?;
    roster.submit_transaction(NodeName::A, transfer)?;
    let deposit = Transaction::new_signed(
        alice.get_address(),
        &staking.address,
        Amount::from_coins(1),
        Amount::ZERO,
        alice_keys.private_key(),
    )?;
    roster.submit_transaction(NodeName::A, deposit)?;
    print_report(&roster.mine_and_broadcast(NodeName::A, primary.node_keys().private_key())?);

    // Two nodes mine on the same tip; the tie is refused until one side pulls ahead
    let b = roster.node(NodeName::B);
    let c = roster.node(NodeName::C);
    b.mine()?;
    c.mine()?;
    for peer in roster.broadcast_chain(NodeName::B)? {
        println!("fork: B -> {}: {:?}", peer.peer, peer.result);
    }
    print_report(&roster.mine_and_broadcast(NodeName::C, c.node_keys().private_key())?);

    if let Some(status) = primary.stake_status(&staking.address, alice.get_address())? {
        println!("{}", to_json_pretty(&status)?);
    }

    println!("Chain lengths: {:?}", roster.chain_lengths()?);
    println!("Balances on A:");
    for (address, balance) in primary.compute_balances(false)? {
        println!("  {address}: {balance}");
    }
    println!(
        "Chain valid: {}, difficulty {}, average mining time {} ms",
        primary.is_chain_valid()?,
        primary.difficulty(),
        primary.average_mining_time_ms()
    );
    Ok(())
}
