// tests/property/registry_consistency_test.rs

//! Property-based tests for registry consistency
//! Random add/delete sequences must keep both indexes describing the same set.

use crate::test_helpers::BrokenStream;
use proptest::prelude::*;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;
use wsplex::connection::{Connection, SessionId};
use wsplex::core::ConnectionRegistry;

#[derive(Debug, Clone)]
enum Op {
    Add { session: u8, descriptor: RawFd },
    Delete { session: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, 0i32..16).prop_map(|(session, descriptor)| Op::Add { session, descriptor }),
        (0u8..16).prop_map(|session| Op::Delete { session }),
    ]
}

fn assert_consistent(
    registry: &ConnectionRegistry<BrokenStream>,
    model: &HashMap<String, Arc<Connection<BrokenStream>>>,
) {
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), model.len());
    assert_eq!(registry.len(), model.len());

    for conn in &snapshot {
        let by_session = registry.get_by_session(conn.session_id().as_str()).unwrap();
        let by_fd = registry.get_by_descriptor(conn.descriptor()).unwrap();
        assert!(Arc::ptr_eq(&by_session, conn));
        assert!(Arc::ptr_eq(&by_fd, conn));
    }
    for (session, conn) in model {
        let stored = registry.get_by_session(session).unwrap();
        assert!(Arc::ptr_eq(&stored, conn));
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_indexes_stay_bijective(ops in prop::collection::vec(op_strategy(), 1..100)) {
        let registry = ConnectionRegistry::new();
        let mut model: HashMap<String, Arc<Connection<BrokenStream>>> = HashMap::new();

        for op in ops {
            match op {
                Op::Add { session, descriptor } => {
                    let key = format!("s{session}");
                    let taken = model.contains_key(&key)
                        || model.values().any(|c| c.descriptor() == descriptor);
                    let result = registry.add(
                        SessionId::from(key.as_str()),
                        descriptor,
                        BrokenStream::new(descriptor),
                    );
                    prop_assert_eq!(result.is_err(), taken);
                    if let Ok(conn) = result {
                        model.insert(key, conn);
                    }
                }
                Op::Delete { session } => {
                    let key = format!("s{session}");
                    match model.remove(&key) {
                        Some(conn) => {
                            prop_assert!(registry.delete(&conn));
                            prop_assert!(!registry.delete(&conn));
                        }
                        None => prop_assert!(registry.get_by_session(&key).is_none()),
                    }
                }
            }
            assert_consistent(&registry, &model);
        }
    }
}
