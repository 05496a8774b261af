use proptest::prelude::*;
use synbus_core::*;

fn uids(count: usize) -> Vec<Uid> {
    let generator = ContinuousUidGenerator::with_prefix(7);
    (0..count).map(|_| generator.generate()).collect()
}

fn pattern(all: &[Uid], picks: &[usize]) -> SenderPattern {
    SenderPattern::senders(picks.iter().map(|&i| all[i]))
}

/// Publish `messages` on a fresh bus and return what one receiver gets
fn deliver(senders: &[Uid], receiver: Uid, messages: &[(usize, Step, u32)]) -> Vec<(Uid, Step, Vec<u32>)> {
    let bus = MessageBus::new();
    let endpoint = bus.create_endpoint(receiver).unwrap();
    endpoint
        .subscribe_to::<SpikeMessage>(SenderPattern::Any)
        .unwrap();
    for &(sender, time, index) in messages {
        bus.publish(SpikeMessage::new(senders[sender], time, vec![index]));
    }
    bus.route_step();
    endpoint
        .unload_messages::<SpikeMessage>()
        .into_iter()
        .map(|m| (m.header.sender_uid, m.header.send_time, m.neuron_indexes))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn delivery_order_ignores_publish_order(
        (messages, shuffled) in prop::collection::vec((0usize..4, 0u64..10, 0u32..100), 0..40)
            .prop_flat_map(|m| (Just(m.clone()), Just(m).prop_shuffle())),
    ) {
        let all = uids(5);
        let (senders, receiver) = all.split_at(4);
        let first = deliver(senders, receiver[0], &messages);
        let second = deliver(senders, receiver[0], &shuffled);
        prop_assert_eq!(first.len(), messages.len());

        let keys = |d: &[(Uid, Step, Vec<u32>)]| d.iter().map(|(s, t, _)| (*s, *t)).collect::<Vec<_>>();
        prop_assert_eq!(keys(&first[..]), keys(&second[..]));
        prop_assert!(keys(&first[..]).windows(2).all(|w| w[0] <= w[1]));

        let mut first = first;
        let mut second = second;
        first.sort();
        second.sort();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn merging_patterns_is_idempotent_union(
        a in prop::collection::vec(0usize..8, 0..8),
        b in prop::collection::vec(0usize..8, 0..8),
    ) {
        let all = uids(8);
        let mut merged = pattern(&all, &a);
        merged.merge(&pattern(&all, &b));
        let once = merged.clone();
        merged.merge(&pattern(&all, &b));
        prop_assert_eq!(&merged, &once);

        for (i, uid) in all.iter().enumerate() {
            prop_assert_eq!(merged.matches(uid), a.contains(&i) || b.contains(&i));
        }

        merged.merge(&SenderPattern::Any);
        prop_assert_eq!(merged, SenderPattern::Any);
    }
}
