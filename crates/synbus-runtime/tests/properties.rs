use proptest::prelude::*;
use synbus_runtime::*;

fn target(size: usize) -> Population<BlifatNeuron> {
    Population::blifat(size, BlifatParams::default()).unwrap()
}

fn synaptic_resources(backend: &Backend, uid: &Uid) -> Vec<f32> {
    match backend.projection(uid) {
        Some(ProjectionVariant::ResourceStdpDelta(projection)) => projection
            .synapses()
            .iter()
            .map(|s| s.rule.synaptic_resource)
            .collect(),
        _ => Vec::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn additive_stdp_weights_stay_in_bounds(
        initial in 0.0f32..1.0,
        pre_times in prop::collection::vec(0u64..40, 1..20),
        post_times in prop::collection::vec(0u64..40, 1..20),
    ) {
        let post = target(1);
        let params = AdditiveStdpParams::new(0.2, 0.25, 5.0, 5.0, 0.0, 1.0).unwrap();
        let mut projection = Projection::additive_stdp(
            ProjectionEnds::new(Uid::new(), Some(1), post.uid(), 1),
            params,
            vec![(0, 0, DeltaSynapseParams::excitatory(initial, 1).unwrap())],
        )
        .unwrap();
        let pre_uid = projection.presynaptic_uid();

        for step in 0..40u64 {
            let mut messages = Vec::new();
            if pre_times.contains(&step) {
                messages.push(SpikeMessage::new(pre_uid, step, vec![0]));
            }
            if post_times.contains(&step) {
                messages.push(SpikeMessage::new(post.uid(), step, vec![0]));
            }
            projection.calculate(&messages, step + 1);
            let w = projection.weights()[0];
            prop_assert!((0.0..=1.0).contains(&w), "weight {} left bounds", w);
        }
    }

    #[test]
    fn resource_weight_stays_below_max(
        resource in 0.0f32..1e6,
        w_min in -1.0f32..0.5,
        span in 0.01f32..2.0,
    ) {
        let w_max = w_min + span;
        let w = weight_from_resource(resource, w_min, w_max);
        let tolerance = 1e-5 * (1.0 + w_max.abs());
        prop_assert!(w >= w_min - tolerance);
        prop_assert!(w <= w_max + tolerance);
    }

    #[test]
    fn impacts_arrive_after_exact_delay(delay in 1u32..16, sent in 0u64..50) {
        let post = target(1);
        let mut projection = Projection::delta(
            ProjectionEnds::new(Uid::new(), Some(1), post.uid(), 1),
            vec![(0, 0, DeltaSynapseParams::excitatory(1.0, delay).unwrap())],
        )
        .unwrap();
        let spike = SpikeMessage::new(projection.presynaptic_uid(), sent, vec![0]);

        let mut arrivals = Vec::new();
        for step in (sent + 1)..(sent + 20) {
            let messages = if step == sent + 1 { vec![spike.clone()] } else { Vec::new() };
            if projection.calculate(&messages, step).is_some() {
                arrivals.push(step);
            }
        }
        let expected = (sent + u64::from(delay)).max(sent + 1);
        prop_assert_eq!(arrivals, vec![expected]);
    }

    #[test]
    fn handler_output_is_sorted_subset(
        indexes in prop::collection::vec(0u32..64, 0..40),
        winners in 0usize..10,
        seed in any::<u64>(),
    ) {
        let message = SpikeMessage::new(Uid::new(), 0, indexes.clone());
        let mut handler = KWtaRandomHandler::new(winners, seed);
        let out = handler.handle(&[message]);
        prop_assert!(out.len() <= winners);
        prop_assert!(out.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(out.iter().all(|i| indexes.contains(i)));
    }

    #[test]
    fn resource_pools_stay_in_bounds(
        recovery in 0.0f32..0.5,
        d_h in 0.0f32..1.0,
        d_u in 0.0f32..0.5,
        threshold in 0.0f32..2.0,
        drain in 0.0f32..5.0,
        dopamine in -1.0f32..1.0,
        input in prop::collection::vec(prop::collection::btree_set(0u32..6, 0..6), 60),
        rewards in prop::collection::vec(any::<bool>(), 60),
    ) {
        let mut backend = Backend::new().unwrap();
        let resource = SynapticResourceParams {
            stability_change_parameter: 0.5,
            stability_change_at_isi: 0.2,
            synaptic_resource_threshold: threshold,
            resource_drain_coefficient: drain,
            ..SynapticResourceParams::new(1.0, recovery, d_h).unwrap()
        };
        let neuron = ResourceStdpBlifatNeuron::new(BlifatParams::default(), resource).unwrap();
        let hidden = Population::uniform(3, neuron).unwrap();
        let hidden_uid = hidden.uid();
        let channel = backend.add_input_channel(Some(6)).unwrap();
        let reward = backend.add_input_channel(Some(1)).unwrap();

        let stdp = ResourceStdpParams { d_u, ..ResourceStdpParams::default() };
        let synapses: Vec<_> = (0..6)
            .flat_map(|pre| (0..3).map(move |post| (pre, post)))
            .map(|(pre, post)| (pre, post, DeltaSynapseParams::excitatory(0.3, 1 + pre % 3).unwrap()))
            .collect();
        let learning = Projection::resource_stdp(
            ProjectionEnds::from_source(channel, Some(6), &hidden),
            stdp.clone(),
            synapses,
        )
        .unwrap();
        let dopamine_params = DeltaSynapseParams::new(dopamine, 1, OutputType::Dopamine).unwrap();
        let reinforcement = Projection::delta(
            ProjectionEnds::from_source(reward, Some(1), &hidden),
            (0..3).map(|post| (0, post, dopamine_params)),
        )
        .unwrap();

        backend.add_population(hidden).unwrap();
        let learning = backend.add_projection(learning).unwrap();
        backend.add_projection(reinforcement).unwrap();

        for (spikes, rewarded) in input.iter().zip(&rewards) {
            backend.send_spikes(channel, spikes.iter().copied().collect()).unwrap();
            if *rewarded {
                backend.send_spikes(reward, vec![0]).unwrap();
            }
            backend.step(1).unwrap();

            let free = backend
                .population(&hidden_uid)
                .and_then(PopulationVariant::free_resources)
                .unwrap();
            prop_assert!(free.iter().all(|f| (0.0..=1.0 + 1e-6).contains(f)), "free pool {:?}", free);

            let resources = synaptic_resources(&backend, &learning);
            prop_assert_eq!(resources.len(), 18);
            prop_assert!(resources.iter().all(|r| r.is_finite() && *r >= 0.0), "resources {:?}", resources);

            let weights = backend.weights(&learning).unwrap();
            prop_assert!(weights.iter().all(|w| (stdp.w_min..=stdp.w_max).contains(w)));
        }
    }
}
