use proptest::prelude::*;

use xrelay_types::{
    ActiveNode, ChainKey, DistributedTask, NodeId, SdpMsgProcessState, TaskType, Timestamp,
};

proptest! {
    /// A lease started at T0 is held strictly before T0 + slice and free from then on.
    #[test]
    fn lease_expiry_boundary(
        start in 0u64..(u64::MAX / 2),
        slice in 1u64..1_000_000,
        offset in 0u64..2_000_000,
    ) {
        let mut task = DistributedTask::unassigned(TaskType::Anchor, ChainKey::new("p", "b"), slice);
        task.assign(NodeId::new("n"), Timestamp::new(start));
        let now = Timestamp::new(start + offset);
        prop_assert_eq!(task.is_expired(now), offset >= slice);
    }

    /// A node is online exactly while its heartbeat is younger than the TTL.
    #[test]
    fn node_liveness(last in 0u64..(u64::MAX / 2), ttl in 1u64..1_000_000, age in 0u64..2_000_000) {
        let node = ActiveNode {
            node_id: NodeId::new("n"),
            node_ip: None,
            last_active: Timestamp::new(last),
        };
        prop_assert_eq!(node.is_online(Timestamp::new(last + age), ttl), age < ttl);
    }

    /// Persisted codes of every task kind decode back to the same kind through serde.
    #[test]
    fn task_type_survives_bincode(idx in 0usize..6) {
        let task_type = TaskType::ALL[idx];
        let encoded = bincode::serialize(&task_type).unwrap();
        let decoded: TaskType = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, task_type);
    }

    /// Arbitrary strings only decode when they are one of the known codes.
    #[test]
    fn arbitrary_codes_are_rejected(code in "[A-Z_]{1,20}") {
        let known = SdpMsgProcessState::ALL.iter().any(|s| s.code() == code);
        prop_assert_eq!(SdpMsgProcessState::from_code(&code).is_ok(), known);
    }
}
