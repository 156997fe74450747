use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opentelemetry::metrics::noop::NoopMeterProvider;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry_auto::testing::metrics::InMemoryMeterProvider;
use opentelemetry_auto::{Factory, InstrumentOptions, ObserverOptions};

fn criterion_benchmark(c: &mut Criterion) {
    noop_factory(c);
    default_factory(c);
    in_memory_factory(c);
}

fn noop_factory(c: &mut Criterion) {
    let factory = Factory::new(NoopMeterProvider::new().meter("benchmarks"));

    c.bench_function("NoopFactory_U64Counter", |b| {
        b.iter(|| {
            black_box(factory.u64_counter("counter_bench", InstrumentOptions::new()))
        });
    });

    c.bench_function("NoopFactory_F64ObservableGauge", |b| {
        b.iter(|| {
            black_box(factory.f64_observable_gauge(
                "gauge_bench",
                ObserverOptions::<f64>::new().with_callback(|observer| observer.observe(1.0, &[])),
            ))
        });
    });

    c.bench_function("NoopFactory_RegisterCallback", |b| {
        b.iter(|| black_box(factory.register_callback(&[], |_| {})));
    });
}

// Resolves the global provider on every call.
fn default_factory(c: &mut Criterion) {
    c.bench_function("DefaultFactory_U64Counter", |b| {
        b.iter(|| {
            black_box(opentelemetry_auto::u64_counter(
                "counter_bench",
                InstrumentOptions::new(),
            ))
        });
    });

    c.bench_function("DefaultFactory_Resolve", |b| {
        b.iter(|| black_box(opentelemetry_auto::default_factory()));
    });
}

fn in_memory_factory(c: &mut Criterion) {
    c.bench_function("InMemoryFactory_U64CounterAdd", |b| {
        let provider = InMemoryMeterProvider::new();
        let counter = Factory::from_provider(&provider)
            .u64_counter("counter_bench", InstrumentOptions::new());
        b.iter(|| counter.add(1, &[]));
    });
}

criterion_group!(benches, criterion_benchmark);

criterion_main!(benches);
