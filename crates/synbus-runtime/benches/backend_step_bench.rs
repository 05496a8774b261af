use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use synbus_runtime::{
    Backend, BlifatParams, DeltaSynapseParams, Population, Projection, ProjectionEnds, Uid,
};

fn build_chain(layers: usize, width: u32) -> (Backend, Uid) {
    let mut backend = Backend::new().expect("bench backend");
    let channel = backend.add_input_channel(Some(width as usize)).expect("bench channel");
    let params = BlifatParams::default();
    let synapse = DeltaSynapseParams::excitatory(0.6, 1).expect("bench synapse");

    let mut previous: Option<Population<_>> = None;
    for _ in 0..layers {
        let layer = Population::blifat(width as usize, params.clone()).expect("bench layer");
        let ends = match &previous {
            Some(prev) => ProjectionEnds::between(prev, &layer),
            None => ProjectionEnds::from_source(channel, Some(width as usize), &layer),
        };
        // Each neuron listens to itself and its left neighbour
        let synapses = (0..width).flat_map(|i| [(i, i, synapse), ((i + 1) % width, i, synapse)]);
        let projection = Projection::delta(ends, synapses).expect("bench projection");
        backend.add_population(layer.clone()).expect("bench add layer");
        backend.add_projection(projection).expect("bench add projection");
        previous = Some(layer);
    }
    (backend, channel)
}

fn bench_backend_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_step");
    let ticks = 50u64;

    for &width in &[16u32, 128u32, 1024u32] {
        group.throughput(Throughput::Elements(width as u64 * ticks));
        group.bench_with_input(BenchmarkId::new("chain_4_layers", width), &width, |b, &width| {
            b.iter_batched(
                || build_chain(4, width),
                |(mut backend, channel)| {
                    for tick in 0..ticks {
                        let spikes: Vec<u32> = (0..width).filter(|i| (*i as u64 + tick) % 3 == 0).collect();
                        backend.send_spikes(channel, spikes).unwrap();
                        backend.step(1).unwrap();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_backend_step);
criterion_main!(benches);
