//! Addressing properties that must hold for any agent and network name.

use connector::{ConnectorContext, ConnectorError, TargetResolver};
use proptest::prelude::*;
use std::sync::Arc;
use types::MessageKind;

fn resolver(networks: Vec<String>) -> TargetResolver {
    TargetResolver::new(Arc::new(
        ConnectorContext::new("n1", networks).with_pid(1234),
    ))
}

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

proptest! {
    #[test]
    fn broadcast_subject_ignores_identity(agent in name(), network in name(), identity in name()) {
        let resolver = resolver(vec![network.clone()]);
        for kind in [MessageKind::Broadcast, MessageKind::Request] {
            let subject = resolver.resolve(&agent, kind, &network, Some(&identity)).unwrap();
            prop_assert_eq!(subject, format!("{}.broadcast.agent.{}", network, agent));
        }
    }

    #[test]
    fn node_subject_uses_identity_or_default(agent in name(), network in name(), identity in proptest::option::of(name())) {
        let resolver = resolver(vec![network.clone()]);
        for kind in [MessageKind::DirectRequest, MessageKind::Directed] {
            let subject = resolver.resolve(&agent, kind, &network, identity.as_deref()).unwrap();
            let expected = identity.clone().unwrap_or_else(|| "n1".to_string());
            prop_assert_eq!(subject, format!("{}.node.{}", network, expected));
        }
    }

    #[test]
    fn reply_sequence_strictly_increases(network in name(), calls in 1usize..50) {
        let resolver = resolver(vec![network.clone()]);
        let mut last = None;
        for _ in 0..calls {
            let subject = resolver.resolve("any", MessageKind::Reply, &network, Some("n1")).unwrap();
            let sequence: u64 = subject.rsplit('.').next().unwrap().parse().unwrap();
            let expected_prefix = format!("{}.reply.n1.1234.", network);
            prop_assert!(subject.starts_with(&expected_prefix));
            if let Some(previous) = last {
                prop_assert!(sequence > previous);
            } else {
                prop_assert_eq!(sequence, 0);
            }
            last = Some(sequence);
        }
    }

    #[test]
    fn unconfigured_network_is_rejected(agent in name(), network in name()) {
        prop_assume!(network != "mcollective");
        let err = resolver(vec!["mcollective".into()])
            .resolve(&agent, MessageKind::Request, &network, None)
            .unwrap_err();
        let is_unknown_network = matches!(err, ConnectorError::UnknownNetwork { .. });
        prop_assert!(is_unknown_network);
        prop_assert!(err.to_string().contains("mcollective"));
    }

    #[test]
    fn subjects_are_colon_free(agent in name(), network in name()) {
        let resolver = resolver(vec![network.clone()]);
        for kind in MessageKind::ALL {
            let subject = resolver.resolve(&agent, kind, &network, None).unwrap();
            prop_assert!(!subject.contains(':'));
            prop_assert!(subject.split('.').all(|segment| !segment.is_empty()));
        }
    }
}
