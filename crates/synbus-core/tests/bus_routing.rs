use std::thread;

use synbus_core::*;

fn spikes(sender: Uid, time: Step, indexes: &[u32]) -> SpikeMessage {
    SpikeMessage::new(sender, time, indexes.to_vec())
}

#[test]
fn concurrent_publishers_deliver_in_sorted_order() {
    let uids = ContinuousUidGenerator::with_prefix(1);
    let bus = MessageBus::new();
    let senders: Vec<Uid> = (0..8).map(|_| uids.generate()).collect();
    let receiver = bus.create_endpoint(uids.generate()).unwrap();
    receiver
        .subscribe_to::<SpikeMessage>(SenderPattern::Any)
        .unwrap();
    bus.seal();

    let mut handles = Vec::new();
    for (i, &sender) in senders.iter().enumerate().rev() {
        let bus = bus.clone();
        handles.push(thread::spawn(move || {
            for time in (0..4).rev() {
                bus.publish(spikes(sender, time, &[i as u32]));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(receiver.pending_len(), 32);
    assert_eq!(bus.route_step(), 32);
    let order: Vec<(Uid, Step)> = receiver
        .unload_messages::<SpikeMessage>()
        .iter()
        .map(|m| (m.header.sender_uid, m.header.send_time))
        .collect();
    let mut expected = order.clone();
    expected.sort();
    assert_eq!(order, expected);
    assert_eq!(order.len(), 32);
}

#[test]
fn messages_wait_for_route_step() {
    let bus = MessageBus::new();
    let source = Uid::new();
    let a = bus.create_endpoint(Uid::new()).unwrap();
    let b = bus.create_endpoint(Uid::new()).unwrap();
    a.subscribe_to::<SpikeMessage>(source).unwrap();
    b.subscribe_to::<SynapticImpactMessage>(source).unwrap();

    assert_eq!(bus.publish(spikes(source, 0, &[1, 2])), 1);
    assert!(a.unload_messages::<SpikeMessage>().is_empty());

    bus.route_step();
    let received = a.unload_messages::<SpikeMessage>();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].neuron_indexes, vec![1, 2]);
    assert_eq!(b.inbox_len(), 0);

    let stats = bus.stats();
    assert_eq!(stats.endpoints, 2);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.routed, 1);
}

#[test]
fn sealed_bus_rejects_changes_but_routes() {
    let bus = MessageBus::new();
    let source = Uid::new();
    let endpoint = bus.create_endpoint(Uid::new()).unwrap();
    endpoint.subscribe_to::<SpikeMessage>(source).unwrap();
    bus.seal();

    assert!(matches!(
        endpoint.subscribe_to::<SynapticImpactMessage>(source),
        Err(BusError::ConcurrentModification { .. })
    ));
    assert!(matches!(
        bus.create_endpoint(Uid::new()),
        Err(BusError::ConcurrentModification { .. })
    ));
    assert!(bus.unsubscribe(endpoint.uid(), MessageKind::Spike).is_err());

    bus.publish(spikes(source, 3, &[0]));
    bus.route_step();
    assert_eq!(endpoint.unload_messages_from::<SpikeMessage>(&source).len(), 1);
}
