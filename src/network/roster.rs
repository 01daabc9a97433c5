// The fixed set of nodes I run side by side in one process
// There is no discovery: every node knows the whole roster from the start
// Broadcasting hands the full chain to each sibling, which revalidates it on its own

use crate::config::ChainSettings;
use crate::core::{Block, NodeEngine, SyncOutcome, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{LedgerStore, MemoryStore, SledStore};
use crate::wallet::{Keystore, Wallet, WalletKeys};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Key pairs for the roster nodes live next to their databases
pub const NODE_KEYSTORE_FILE: &str = "nodes.dat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeName {
    A,
    B,
    C,
}

impl NodeName {
    pub const ALL: [NodeName; 3] = [NodeName::A, NodeName::B, NodeName::C];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeName::A => "A",
            NodeName::B => "B",
            NodeName::C => "C",
        }
    }

    fn keystore_label(self) -> String {
        format!("node:{}", self.as_str())
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeName {
    type Err = BlockchainError;

    fn from_str(s: &str) -> Result<NodeName> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(NodeName::A),
            "B" => Ok(NodeName::B),
            "C" => Ok(NodeName::C),
            other => Err(BlockchainError::not_found("node", other)),
        }
    }
}

/// How one sibling answered a broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSync {
    pub peer: NodeName,
    pub result: Result<SyncOutcome>,
}

#[derive(Debug, Clone)]
pub struct BroadcastReport {
    pub origin: NodeName,
    pub block: Block,
    pub peers: Vec<PeerSync>,
}

impl BroadcastReport {
    pub fn adopted_by(&self) -> Vec<NodeName> {
        self.peers
            .iter()
            .filter(|p| matches!(&p.result, Ok(outcome) if outcome.is_adopted()))
            .map(|p| p.peer)
            .collect()
    }
}

pub struct Roster {
    nodes: BTreeMap<NodeName, Arc<NodeEngine>>,
}

impl Roster {
    /// Every node on its own in-memory store with freshly generated keys
    pub fn new(settings: &ChainSettings) -> Result<Roster> {
        Roster::with_stores(
            settings,
            |_| Ok(Arc::new(MemoryStore::new()) as Arc<dyn LedgerStore>),
            |_| WalletKeys::generate(),
        )
    }

    // When I want the roster to survive restarts: sled under data/node_<name>, keys in nodes.dat
    pub fn open(settings: &ChainSettings) -> Result<Roster> {
        let mut keystore = Keystore::open(&settings.data_dir.join(NODE_KEYSTORE_FILE));
        Roster::with_stores(
            settings,
            |name| {
                let store = SledStore::open(&settings.node_data_dir(name.as_str()))?;
                Ok(Arc::new(store) as Arc<dyn LedgerStore>)
            },
            |name| keystore.get_or_create(&name.keystore_label()),
        )
    }

    pub fn with_stores<S, K>(settings: &ChainSettings, mut store_for: S, mut keys_for: K) -> Result<Roster>
    where
        S: FnMut(NodeName) -> Result<Arc<dyn LedgerStore>>,
        K: FnMut(NodeName) -> Result<WalletKeys>,
    {
        let mut nodes = BTreeMap::new();
        for name in NodeName::ALL {
            let engine = NodeEngine::new(
                name.as_str(),
                keys_for(name)?,
                store_for(name)?,
                settings.clone(),
            )?;
            nodes.insert(name, Arc::new(engine));
        }
        let roster = Roster { nodes };
        roster.bootstrap()?;
        Ok(roster)
    }

    // A owns genesis; empty siblings pick it up through the normal adoption path
    fn bootstrap(&self) -> Result<()> {
        let primary = self.node(NodeName::A);
        primary.ensure_genesis()?;
        let chain = primary.chain()?;
        for (name, engine) in self.siblings(NodeName::A) {
            if engine.chain_length()? == 0 {
                if let SyncOutcome::Rejected(reason) = engine.try_adopt_external_chain(&chain)? {
                    return Err(BlockchainError::SyncFailure(format!(
                        "node {name} refused genesis: {reason}"
                    )));
                }
            }
        }
        // Every node knows every node's wallet so blocks mined anywhere can be attributed
        for name in NodeName::ALL {
            let engine = self.node(name);
            self.register_wallet(engine.public_key(), &format!("node {name}"))?;
        }
        Ok(())
    }

    pub fn node(&self, name: NodeName) -> Arc<NodeEngine> {
        Arc::clone(&self.nodes[&name])
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeName, &Arc<NodeEngine>)> {
        self.nodes.iter().map(|(name, engine)| (*name, engine))
    }

    fn siblings(&self, origin: NodeName) -> impl Iterator<Item = (NodeName, &Arc<NodeEngine>)> {
        self.nodes().filter(move |(name, _)| *name != origin)
    }

    /// Register on every node; returns the primary node's record
    pub fn register_wallet(&self, public_key: &str, display_name: &str) -> Result<Wallet> {
        let mut primary = None;
        for (name, engine) in self.nodes() {
            let wallet = engine.register_wallet(public_key, display_name)?;
            if name == NodeName::A {
                primary = Some(wallet);
            }
        }
        primary.ok_or_else(|| BlockchainError::not_found("node", NodeName::A))
    }

    pub fn create_wallet(&self, display_name: &str) -> Result<(Wallet, WalletKeys)> {
        let keys = WalletKeys::generate()?;
        let wallet = self.register_wallet(keys.public_key(), display_name)?;
        Ok((wallet, keys))
    }

    pub fn submit_transaction(&self, node: NodeName, tx: Transaction) -> Result<Transaction> {
        self.node(node).submit_transaction(tx)
    }

    // Mining returns before broadcasting, so the miner's lock is already released here
    pub fn mine_and_broadcast(
        &self,
        origin: NodeName,
        miner_private_key: &str,
    ) -> Result<BroadcastReport> {
        let block = self.node(origin).mine_pending(miner_private_key)?;
        let peers = self.broadcast_chain(origin)?;
        Ok(BroadcastReport {
            origin,
            block,
            peers,
        })
    }

    /// Offer `origin`'s full chain to every other node
    pub fn broadcast_chain(&self, origin: NodeName) -> Result<Vec<PeerSync>> {
        let chain = self.node(origin).chain()?;
        info!(
            "Node {origin} broadcasting chain of length {} to {} peers",
            chain.len(),
            self.nodes.len() - 1
        );
        Ok(self
            .siblings(origin)
            .map(|(peer, engine)| {
                let result = engine.try_adopt_external_chain(&chain);
                if let Err(e) = &result {
                    warn!("Node {peer} failed to sync from {origin}: {e}");
                }
                PeerSync { peer, result }
            })
            .collect())
    }

    /// Chain lengths per node, for status displays
    pub fn chain_lengths(&self) -> Result<BTreeMap<NodeName, u64>> {
        self.nodes()
            .map(|(name, engine)| Ok((name, engine.chain_length()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Amount, ChainRejection};
    use crate::testnet::test_utils::{coins, create_temp_dir, fast_settings};

    #[test]
    fn test_node_names_parse_case_insensitively() {
        assert_eq!("b".parse::<NodeName>().unwrap(), NodeName::B);
        assert_eq!(NodeName::C.to_string(), "C");
        assert!("D".parse::<NodeName>().is_err());
    }

    #[test]
    fn test_siblings_start_on_primary_genesis() {
        let roster = Roster::new(&fast_settings()).unwrap();
        let genesis = roster.node(NodeName::A).get_block(0).unwrap();
        for (_, engine) in roster.nodes() {
            assert_eq!(engine.chain().unwrap(), vec![genesis.clone()]);
        }
    }

    #[test]
    fn test_every_node_knows_every_node_wallet() {
        let roster = Roster::new(&fast_settings()).unwrap();
        for (_, engine) in roster.nodes() {
            for name in NodeName::ALL {
                let address = roster.node(name).address();
                assert!(engine.find_wallet(&address).is_ok());
            }
        }
    }

    #[test]
    fn test_mined_block_reaches_every_sibling() {
        let roster = Roster::new(&fast_settings()).unwrap();
        let b = roster.node(NodeName::B);
        let report = roster
            .mine_and_broadcast(NodeName::B, b.node_keys().private_key())
            .unwrap();
        assert_eq!(report.block.get_index(), 1);
        assert_eq!(report.adopted_by(), vec![NodeName::A, NodeName::C]);
        let lengths = roster.chain_lengths().unwrap();
        assert!(lengths.values().all(|len| *len == 2));
    }

    #[test]
    fn test_fork_tie_is_rejected_then_longer_branch_wins() {
        let roster = Roster::new(&fast_settings()).unwrap();
        let a = roster.node(NodeName::A);
        let b = roster.node(NodeName::B);

        a.mine().unwrap();
        let b_block = b.mine().unwrap();

        let peers = roster.broadcast_chain(NodeName::A).unwrap();
        let to_b = peers.iter().find(|p| p.peer == NodeName::B).unwrap();
        assert_eq!(
            to_b.result,
            Ok(SyncOutcome::Rejected(ChainRejection::NotLonger {
                candidate: 2,
                current: 2
            }))
        );
        assert_eq!(b.get_block(1).unwrap(), b_block);

        let report = roster
            .mine_and_broadcast(NodeName::A, a.node_keys().private_key())
            .unwrap();
        assert!(report.adopted_by().contains(&NodeName::B));
        assert_eq!(b.chain().unwrap(), a.chain().unwrap());
        assert_eq!(b.chain_length().unwrap(), 3);
    }

    #[test]
    fn test_adoption_discards_sibling_mempool() {
        let roster = Roster::new(&fast_settings()).unwrap();
        let c = roster.node(NodeName::C);
        let (alice, keys) = roster.create_wallet("alice").unwrap();
        c.mine_pending(keys.private_key()).unwrap();

        let tx = Transaction::new_signed(
            alice.get_address(),
            &c.address(),
            coins("0.5"),
            Amount::ZERO,
            keys.private_key(),
        )
        .unwrap();
        roster.submit_transaction(NodeName::C, tx).unwrap();
        assert_eq!(c.mempool().unwrap().len(), 1);

        let a = roster.node(NodeName::A);
        a.mine().unwrap();
        roster
            .mine_and_broadcast(NodeName::A, a.node_keys().private_key())
            .unwrap();
        assert_eq!(c.chain_length().unwrap(), 3);
        assert!(c.mempool().unwrap().is_empty());
    }

    #[test]
    fn test_open_persists_chain_and_node_keys() {
        let dir = create_temp_dir().unwrap();
        let mut settings = fast_settings();
        settings.data_dir = dir.path().to_path_buf();

        let (address, length) = {
            let roster = Roster::open(&settings).unwrap();
            let a = roster.node(NodeName::A);
            roster
                .mine_and_broadcast(NodeName::A, a.node_keys().private_key())
                .unwrap();
            (a.address(), roster.node(NodeName::C).chain_length().unwrap())
        };
        assert_eq!(length, 2);

        let reopened = Roster::open(&settings).unwrap();
        assert_eq!(reopened.node(NodeName::A).address(), address);
        let lengths = reopened.chain_lengths().unwrap();
        assert!(lengths.values().all(|len| *len == 2));
        assert!(reopened.node(NodeName::B).is_chain_valid().unwrap());
        assert!(dir.path().join("node_b").exists());
    }
}
