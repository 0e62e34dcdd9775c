//! End-to-end run of one cross-chain message through a relayer over LMDB:
//! anchor on the source chain, validation, commit, confirm and archive on the
//! destination chain, all driven by the scheduler's own duty loop.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use xrelay_chain::{AuthMessage, CrossChainMessage, CrossChainReceipt, SdpMessage};
use xrelay_node::{
    DispatchOutcome, NodeConfig, NodeIdentity, Relayer, RelayerDeps,
};
use xrelay_nullables::{NullChainClientFactory, NullClock, NullPluginRegistry, NullShuffler};
use xrelay_store::{BlockchainStore, CrossChainMessageStore, ScheduleStore};
use xrelay_store_lmdb::LmdbStore;
use xrelay_types::{
    AuthMsgTrustLevel, BlockchainMeta, BlockchainState, ChainKey, CrossChainDomain, Identity,
    LedgerInfo, NodeId, SdpMsgProcessState, TaskType, Timestamp, UpperProtocolType,
};

struct Harness {
    _dir: TempDir,
    store: Arc<LmdbStore>,
    factory: Arc<NullChainClientFactory>,
    relayer: Relayer,
}

fn domain(s: &str) -> CrossChainDomain {
    CrossChainDomain::new(s).unwrap()
}

fn add_chain(store: &LmdbStore, id: &str) -> ChainKey {
    let chain = ChainKey::new("testchain", id);
    let mut meta = BlockchainMeta::new(chain.clone(), domain(&format!("{id}.domain")), "plugin-1");
    meta.properties.state = BlockchainState::Running;
    store.save_blockchain_meta(&meta).unwrap();
    chain
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LmdbStore::open(dir.path(), 1 << 26).unwrap());
    let factory = Arc::new(NullChainClientFactory::new());
    let deps = RelayerDeps {
        store: store.clone(),
        client_factory: factory.clone(),
        plugins: Arc::new(NullPluginRegistry::ready(["plugin-1"])),
        clock: Arc::new(NullClock::new(1_000_000)),
        shuffler: Arc::new(NullShuffler::new()),
        plugin_monitor: None,
    };
    let identity = NodeIdentity {
        node_id: NodeId::new("node-1"),
        node_ip: None,
    };
    let relayer = Relayer::new(NodeConfig::default(), identity, deps).unwrap();
    Harness {
        _dir: dir,
        store,
        factory,
        relayer,
    }
}

fn outbound_message(to_domain: &str) -> CrossChainMessage {
    let sdp = SdpMessage {
        receiver_domain: domain(to_domain),
        receiver_identity: Identity::new([0x22; 32]),
        sequence: 0,
        payload: b"ping".to_vec(),
    };
    let am = AuthMessage {
        identity: Identity::new([0x11; 32]),
        trust_level: AuthMsgTrustLevel::PositiveTrust,
        upper_protocol: UpperProtocolType::Sdp,
        payload: sdp.encode(),
    };
    CrossChainMessage {
        message: am.encode(),
        proof: vec![0xaa, 0xbb],
        ledger: LedgerInfo {
            height: 7,
            block_hash: "0xblock".into(),
            tx_hash: "0xsrc".into(),
            timestamp: Timestamp::new(999_000),
        },
    }
}

impl Harness {
    /// One pass of both duty loops, then wait until every run finished.
    async fn duty_round(&self) {
        let engine = self.relayer.engine();
        engine.duty.run_once().unwrap();
        engine.biz_duty.run_once().unwrap();
        for _ in 0..500 {
            let busy = TaskType::ALL.iter().any(|t| {
                !self
                    .relayer
                    .executors()
                    .get(*t)
                    .unwrap()
                    .running()
                    .is_empty()
            });
            if !busy {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task runs did not finish");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn message_travels_from_anchor_to_archive() {
    let h = harness();
    let a = add_chain(&h.store, "a");
    let b = add_chain(&h.store, "b");
    let source = h.factory.client(&a);
    source.set_latest_height(7);
    source.add_messages(7, vec![outbound_message("b.domain")]);

    let engine = h.relayer.engine();
    engine.activator.activate().unwrap();
    assert_eq!(
        engine.dispatcher.dispatch().unwrap(),
        DispatchOutcome::Dispatched {
            assigned: 2 * TaskType::ALL.len()
        }
    );
    let leases = h.store.get_all_distributed_tasks().unwrap();
    assert!(leases.iter().all(|t| t.is_owned_by(&NodeId::new("node-1"))));

    // Anchor, process and commit run concurrently, so the message needs a
    // few rounds to reach the destination chain.
    let destination = h.factory.client(&b);
    let mut submitted = None;
    for _ in 0..10 {
        h.duty_round().await;
        let pending = h.store.get_sdps_by_state(&b, SdpMsgProcessState::TxPending, 10).unwrap();
        if let Some(sdp) = pending.first() {
            submitted = Some((sdp.id, sdp.tx_hash.clone().unwrap()));
            break;
        }
    }
    let (sdp_id, tx_hash) = submitted.expect("message was never committed");
    assert_eq!(h.store.get_anchor_height(&a).unwrap(), Some(7));
    assert_eq!(destination.relayed().len(), 1);

    destination.set_receipt(CrossChainReceipt {
        tx_hash: tx_hash.clone(),
        confirmed: true,
        successful: true,
        error_msg: None,
        tx_timestamp: Timestamp::new(1_000_500),
    });

    let mut archived = None;
    for _ in 0..10 {
        h.duty_round().await;
        archived = h.store.get_archived_sdp(sdp_id).unwrap();
        if archived.is_some() {
            break;
        }
    }
    let archived = archived.expect("confirmed message was never archived");
    assert_eq!(archived.state, SdpMsgProcessState::TxSuccess);
    assert_eq!(archived.tx_hash.as_deref(), Some(tx_hash.as_str()));
    assert_eq!(archived.receiver, Some(b.clone()));
    assert!(archived.tx_success);

    // Deployment ran on both chains alongside the pipeline.
    for chain in [&a, &b] {
        let meta = h.store.get_blockchain_meta(chain).unwrap().unwrap();
        assert!(meta.is_deployed(), "{chain} not deployed");
    }

    let metrics = h.relayer.metrics().encode_text().unwrap();
    assert!(metrics.contains("xrelay_sdp_created_total"));
}

#[tokio::test]
async fn start_and_stop_are_clean() {
    let h = harness();
    add_chain(&h.store, "a");
    h.relayer.start();
    h.relayer.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.relayer.stop().await.unwrap();

    let nodes = h.store.get_all_active_nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node_id, NodeId::new("node-1"));
}
