//! The free functions follow the global meter provider when it is replaced.
//!
//! Everything runs in a single test since the global provider is process wide.
use std::panic::{catch_unwind, AssertUnwindSafe};

use opentelemetry::global;
use opentelemetry_auto::testing::metrics::{InMemoryMeterProvider, MeasurementValue};
use opentelemetry_auto::{
    InstrumentKind, InstrumentOptions, ObserverOptions, RegistrationFailure,
    INSTRUMENTATION_NAME, INSTRUMENTATION_VERSION,
};

#[test]
fn free_functions_follow_the_global_provider() {
    let first = InMemoryMeterProvider::new();
    let second = InMemoryMeterProvider::new();

    global::set_meter_provider(first.clone());
    let requests = opentelemetry_auto::u64_counter("requests", InstrumentOptions::new());
    requests.add(1, &[]);

    let instruments = first.instruments();
    assert_eq!(instruments.len(), 1);
    assert_eq!(instruments[0].scope, INSTRUMENTATION_NAME);
    assert_eq!(
        instruments[0].scope_version.as_deref(),
        Some(INSTRUMENTATION_VERSION)
    );
    assert_eq!(instruments[0].kind, InstrumentKind::U64Counter);

    // The name is taken in the first provider's scope.
    let err = opentelemetry_auto::try_u64_counter("requests", InstrumentOptions::new())
        .err()
        .expect("duplicate instrument");
    assert!(matches!(err, RegistrationFailure::Meter { .. }));
    let panic = catch_unwind(AssertUnwindSafe(|| {
        opentelemetry_auto::u64_counter("requests", InstrumentOptions::new())
    }));
    assert!(panic.is_err());

    global::set_meter_provider(second.clone());
    let requests_again = opentelemetry_auto::u64_counter("requests", InstrumentOptions::new());
    let _queue = opentelemetry_auto::i64_observable_up_down_counter(
        "queue",
        ObserverOptions::<i64>::new().with_callback(|observer| observer.observe(4, &[])),
    );
    requests_again.add(2, &[]);

    // Instruments created before the swap keep their provider.
    requests.add(3, &[]);

    let values = |provider: &InMemoryMeterProvider| -> Vec<MeasurementValue> {
        provider.measurements().into_iter().map(|m| m.value).collect()
    };
    assert_eq!(
        values(&first),
        vec![MeasurementValue::U64(1), MeasurementValue::U64(3)]
    );
    assert_eq!(values(&second), vec![MeasurementValue::U64(2)]);
    assert_eq!(second.instruments().len(), 2);

    let observed = second.collect();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].instrument, "queue");
    assert_eq!(observed[0].value, MeasurementValue::I64(4));
    assert!(first.collect().is_empty());
}
