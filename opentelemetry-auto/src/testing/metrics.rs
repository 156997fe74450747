//! # In-memory OpenTelemetry Metrics Implementation
//!
//! A [`MeterProvider`] keeping every created instrument, recorded measurement
//! and registered callback in memory, so tests can check what reached the
//! metrics pipeline and drive collection cycles by hand.
use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use opentelemetry::metrics::{
    AsyncInstrument, CallbackRegistration, Counter, Histogram, InstrumentProvider, Meter,
    MeterProvider, MetricsError, ObservableCounter, ObservableGauge, ObservableUpDownCounter,
    Observer, Result, SyncCounter, SyncHistogram, SyncUpDownCounter, Unit, UpDownCounter,
};
use opentelemetry::KeyValue;

use crate::internal_logging::otel_debug;
use crate::options::ObserveFn;
use crate::InstrumentKind;

/// A meter provider recording instruments and measurements in memory.
///
/// Clones share the same state. Every meter handed out records into it,
/// tagged with the meter's scope.
///
/// The provider behaves like an SDK would where this crate relies on it:
/// - instruments with an empty name are rejected,
/// - an instrument name can only be registered once per scope,
/// - a callback registered without instruments is neither stored nor called,
/// - a callback only observes values for the instruments it was registered
///   with, until its registration is unregistered.
///
/// # Example
///
/// ```
/// use opentelemetry_auto::testing::metrics::{InMemoryMeterProvider, MeasurementValue};
/// use opentelemetry_auto::{Factory, InstrumentOptions};
///
/// let provider = InMemoryMeterProvider::new();
/// let factory = Factory::from_provider(&provider);
///
/// factory.u64_counter("jobs", InstrumentOptions::new()).add(3, &[]);
///
/// let measurements = provider.measurements();
/// assert_eq!(measurements[0].value, MeasurementValue::U64(3));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryMeterProvider {
    shared: Arc<Shared>,
}

impl InMemoryMeterProvider {
    /// Creates a provider with nothing recorded.
    pub fn new() -> Self {
        InMemoryMeterProvider::default()
    }

    /// Makes the next instrument creation or callback registration, on any
    /// meter of this provider, fail with `message`.
    pub fn fail_next_with(&self, message: impl Into<String>) {
        self.shared.lock().fail_next = Some(message.into());
    }

    /// Instruments created so far, in creation order.
    pub fn instruments(&self) -> Vec<InstrumentRecord> {
        self.shared.lock().instruments.clone()
    }

    /// Measurements recorded so far, including the ones observed during
    /// collection cycles.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.shared.lock().measurements.clone()
    }

    /// Number of callbacks that would run on the next collection cycle.
    pub fn callback_count(&self) -> usize {
        self.shared.lock().callbacks.len()
    }

    /// Runs one collection cycle and returns what was observed during it.
    ///
    /// Callbacks run in registration order, without the provider's lock held.
    pub fn collect(&self) -> Vec<Measurement> {
        let callbacks: Vec<CollectFn> = self.shared.lock().callbacks.values().cloned().collect();
        for callback in &callbacks {
            callback();
        }

        let mut state = self.shared.lock();
        let observed = std::mem::take(&mut state.cycle);
        state.measurements.extend(observed.iter().cloned());
        otel_debug!(
            name: "InMemoryMeterProvider.Collected",
            callbacks = callbacks.len(),
            measurements = observed.len()
        );
        observed
    }

    /// Forgets recorded measurements. Instruments and callbacks stay registered.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.measurements.clear();
        state.cycle.clear();
    }
}

impl MeterProvider for InMemoryMeterProvider {
    fn versioned_meter(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: Option<impl Into<Cow<'static, str>>>,
        _schema_url: Option<impl Into<Cow<'static, str>>>,
        _attributes: Option<Vec<KeyValue>>,
    ) -> Meter {
        Meter::new(Arc::new(RecordingMeter {
            scope: name.into(),
            scope_version: version.map(Into::into),
            shared: self.shared.clone(),
        }))
    }
}

impl fmt::Debug for InMemoryMeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("InMemoryMeterProvider")
            .field("instruments", &state.instruments.len())
            .field("measurements", &state.measurements.len())
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// An instrument created on an [`InMemoryMeterProvider`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentRecord {
    /// Name of the meter's instrumentation scope.
    pub scope: Cow<'static, str>,
    /// Version of the meter's instrumentation scope.
    pub scope_version: Option<Cow<'static, str>>,
    /// Instrument name.
    pub name: Cow<'static, str>,
    /// Instrument kind.
    pub kind: InstrumentKind,
    /// Instrument description.
    pub description: Option<Cow<'static, str>>,
    /// Instrument unit.
    pub unit: Option<Cow<'static, str>>,
}

/// A value recorded or observed by an instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeasurementValue {
    /// Unsigned integer value.
    U64(u64),
    /// Signed integer value.
    I64(i64),
    /// Floating point value.
    F64(f64),
}

impl From<u64> for MeasurementValue {
    fn from(value: u64) -> Self {
        MeasurementValue::U64(value)
    }
}

impl From<i64> for MeasurementValue {
    fn from(value: i64) -> Self {
        MeasurementValue::I64(value)
    }
}

impl From<f64> for MeasurementValue {
    fn from(value: f64) -> Self {
        MeasurementValue::F64(value)
    }
}

/// A measurement recorded on an [`InMemoryMeterProvider`].
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Name of the instrumentation scope of the instrument's meter.
    pub scope: Cow<'static, str>,
    /// Name of the instrument.
    pub instrument: Cow<'static, str>,
    /// Recorded value.
    pub value: MeasurementValue,
    /// Attributes recorded along the value.
    pub attributes: Vec<KeyValue>,
}

type CollectFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct State {
    instruments: Vec<InstrumentRecord>,
    measurements: Vec<Measurement>,
    // Observations of the collection cycle in progress.
    cycle: Vec<Measurement>,
    callbacks: BTreeMap<usize, CollectFn>,
    next_id: usize,
    fail_next: Option<String>,
}

impl State {
    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

struct RecordingMeter {
    scope: Cow<'static, str>,
    scope_version: Option<Cow<'static, str>>,
    shared: Arc<Shared>,
}

impl RecordingMeter {
    fn register(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Unit>,
    ) -> Result<RecordingInstrument> {
        let mut state = self.shared.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(MetricsError::Other(message));
        }
        if name.is_empty() {
            return Err(MetricsError::InvalidInstrumentConfiguration(
                "instrument name must not be empty",
            ));
        }
        if state
            .instruments
            .iter()
            .any(|record| record.scope == self.scope && record.name == name)
        {
            return Err(MetricsError::Other(format!(
                "instrument `{name}` is already registered in scope `{}`",
                self.scope
            )));
        }

        let id = state.next_id();
        state.instruments.push(InstrumentRecord {
            scope: self.scope.clone(),
            scope_version: self.scope_version.clone(),
            name: name.clone(),
            kind,
            description,
            unit: unit.map(|unit| Cow::Owned(unit.as_str().to_owned())),
        });
        otel_debug!(
            name: "InMemoryMeterProvider.InstrumentRegistered",
            scope = self.scope.as_ref(),
            instrument = name.as_ref()
        );

        Ok(RecordingInstrument {
            id,
            scope: self.scope.clone(),
            name,
            shared: Arc::downgrade(&self.shared),
        })
    }

    fn register_observable<T>(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Unit>,
        callbacks: Vec<ObserveFn<T>>,
    ) -> Result<RecordingInstrument>
    where
        T: Into<MeasurementValue> + 'static,
    {
        let instrument = self.register(kind, name, description, unit)?;
        if callbacks.is_empty() {
            return Ok(instrument);
        }

        let observed = instrument.clone();
        let collect: CollectFn = Arc::new(move || {
            let inst: &dyn AsyncInstrument<T> = &observed;
            for callback in &callbacks {
                callback(inst);
            }
        });
        let mut state = self.shared.lock();
        let id = state.next_id();
        state.callbacks.insert(id, collect);

        Ok(instrument)
    }
}

macro_rules! recording_sync {
    ($($method:ident => $handle:ident<$value:ty>, $kind:ident;)+) => {
        $(
            fn $method(
                &self,
                name: Cow<'static, str>,
                description: Option<Cow<'static, str>>,
                unit: Option<Unit>,
            ) -> Result<$handle<$value>> {
                let instrument = self.register(InstrumentKind::$kind, name, description, unit)?;
                Ok($handle::new(Arc::new(instrument)))
            }
        )+
    };
}

macro_rules! recording_observable {
    ($($method:ident => $handle:ident<$value:ty>, $kind:ident;)+) => {
        $(
            fn $method(
                &self,
                name: Cow<'static, str>,
                description: Option<Cow<'static, str>>,
                unit: Option<Unit>,
                callbacks: Vec<ObserveFn<$value>>,
            ) -> Result<$handle<$value>> {
                let instrument = self.register_observable(
                    InstrumentKind::$kind,
                    name,
                    description,
                    unit,
                    callbacks,
                )?;
                Ok($handle::new(Arc::new(instrument)))
            }
        )+
    };
}

impl InstrumentProvider for RecordingMeter {
    recording_sync! {
        u64_counter => Counter<u64>, U64Counter;
        f64_counter => Counter<f64>, F64Counter;
        i64_up_down_counter => UpDownCounter<i64>, I64UpDownCounter;
        f64_up_down_counter => UpDownCounter<f64>, F64UpDownCounter;
        u64_histogram => Histogram<u64>, U64Histogram;
        f64_histogram => Histogram<f64>, F64Histogram;
    }

    recording_observable! {
        u64_observable_counter => ObservableCounter<u64>, U64ObservableCounter;
        f64_observable_counter => ObservableCounter<f64>, F64ObservableCounter;
        i64_observable_up_down_counter => ObservableUpDownCounter<i64>, I64ObservableUpDownCounter;
        f64_observable_up_down_counter => ObservableUpDownCounter<f64>, F64ObservableUpDownCounter;
        i64_observable_gauge => ObservableGauge<i64>, I64ObservableGauge;
        f64_observable_gauge => ObservableGauge<f64>, F64ObservableGauge;
    }

    fn register_callback(
        &self,
        instruments: &[Arc<dyn Any>],
        callback: Box<dyn Fn(&dyn Observer) + Send + Sync>,
    ) -> Result<Box<dyn CallbackRegistration>> {
        let mut state = self.shared.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(MetricsError::Other(message));
        }
        if instruments.is_empty() {
            otel_debug!(name: "InMemoryMeterProvider.CallbackIgnored");
            return Ok(Box::new(InMemoryRegistration {
                id: None,
                shared: Weak::new(),
            }));
        }

        let own = Arc::downgrade(&self.shared);
        let mut allowed = HashSet::with_capacity(instruments.len());
        for instrument in instruments {
            match instrument.downcast_ref::<RecordingInstrument>() {
                Some(recording) if Weak::ptr_eq(&recording.shared, &own) => {
                    allowed.insert(recording.id);
                }
                _ => {
                    return Err(MetricsError::Other(
                        "callback registered with an instrument from another provider".into(),
                    ))
                }
            }
        }

        let observer = RegisteredObserver {
            allowed,
            shared: own.clone(),
        };
        let collect: CollectFn = Arc::new(move || {
            let observer: &dyn Observer = &observer;
            callback(observer);
        });
        let id = state.next_id();
        state.callbacks.insert(id, collect);

        Ok(Box::new(InMemoryRegistration {
            id: Some(id),
            shared: own,
        }))
    }
}

#[derive(Clone)]
struct RecordingInstrument {
    id: usize,
    scope: Cow<'static, str>,
    name: Cow<'static, str>,
    shared: Weak<Shared>,
}

impl RecordingInstrument {
    fn push(&self, value: MeasurementValue, attributes: &[KeyValue], observed: bool) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let measurement = Measurement {
            scope: self.scope.clone(),
            instrument: self.name.clone(),
            value,
            attributes: attributes.to_vec(),
        };

        let mut state = shared.lock();
        if observed {
            state.cycle.push(measurement);
        } else {
            state.measurements.push(measurement);
        }
    }
}

impl<T: Into<MeasurementValue>> SyncCounter<T> for RecordingInstrument {
    fn add(&self, value: T, attributes: &[KeyValue]) {
        self.push(value.into(), attributes, false)
    }
}

impl<T: Into<MeasurementValue>> SyncUpDownCounter<T> for RecordingInstrument {
    fn add(&self, value: T, attributes: &[KeyValue]) {
        self.push(value.into(), attributes, false)
    }
}

impl<T: Into<MeasurementValue>> SyncHistogram<T> for RecordingInstrument {
    fn record(&self, value: T, attributes: &[KeyValue]) {
        self.push(value.into(), attributes, false)
    }
}

impl<T: Into<MeasurementValue>> AsyncInstrument<T> for RecordingInstrument {
    fn observe(&self, measurement: T, attributes: &[KeyValue]) {
        self.push(measurement.into(), attributes, true)
    }

    fn as_any(&self) -> Arc<dyn Any> {
        Arc::new(self.clone())
    }
}

/// Observer handed to multi-instrument callbacks, only letting through the
/// instruments the callback was registered with.
struct RegisteredObserver {
    allowed: HashSet<usize>,
    shared: Weak<Shared>,
}

impl RegisteredObserver {
    fn observe<T>(&self, inst: &dyn AsyncInstrument<T>, measurement: T, attrs: &[KeyValue]) {
        let any = inst.as_any();
        match any.downcast_ref::<RecordingInstrument>() {
            Some(recording)
                if Weak::ptr_eq(&recording.shared, &self.shared)
                    && self.allowed.contains(&recording.id) =>
            {
                inst.observe(measurement, attrs)
            }
            _ => {
                otel_debug!(name: "InMemoryMeterProvider.ObservationDropped");
            }
        }
    }
}

impl Observer for RegisteredObserver {
    fn observe_f64(&self, inst: &dyn AsyncInstrument<f64>, measurement: f64, attrs: &[KeyValue]) {
        self.observe(inst, measurement, attrs)
    }

    fn observe_u64(&self, inst: &dyn AsyncInstrument<u64>, measurement: u64, attrs: &[KeyValue]) {
        self.observe(inst, measurement, attrs)
    }

    fn observe_i64(&self, inst: &dyn AsyncInstrument<i64>, measurement: i64, attrs: &[KeyValue]) {
        self.observe(inst, measurement, attrs)
    }
}

struct InMemoryRegistration {
    id: Option<usize>,
    shared: Weak<Shared>,
}

impl CallbackRegistration for InMemoryRegistration {
    fn unregister(&mut self) -> Result<()> {
        if let (Some(id), Some(shared)) = (self.id.take(), self.shared.upgrade()) {
            shared.lock().callbacks.remove(&id);
            otel_debug!(name: "InMemoryMeterProvider.CallbackUnregistered");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use opentelemetry::metrics::MeterProvider as _;

    use super::*;

    #[test]
    fn sync_measurements_are_recorded_in_order() {
        let provider = InMemoryMeterProvider::new();
        let meter = provider.meter("scope");

        let counter = meter.u64_counter("requests").try_init().unwrap();
        let histogram = meter.f64_histogram("latency").try_init().unwrap();
        counter.add(2, &[KeyValue::new("route", "/")]);
        histogram.record(1.5, &[]);

        let measurements = provider.measurements();
        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].scope, "scope");
        assert_eq!(measurements[0].instrument, "requests");
        assert_eq!(measurements[0].value, MeasurementValue::U64(2));
        assert_eq!(measurements[0].attributes, vec![KeyValue::new("route", "/")]);
        assert_eq!(measurements[1].value, MeasurementValue::F64(1.5));
    }

    #[test]
    fn duplicate_names_are_rejected_per_scope() {
        let provider = InMemoryMeterProvider::new();

        assert!(provider.meter("a").u64_counter("jobs").try_init().is_ok());
        assert!(provider.meter("b").u64_counter("jobs").try_init().is_ok());
        assert!(provider.meter("a").f64_counter("jobs").try_init().is_err());
        assert_eq!(provider.instruments().len(), 2);
    }

    #[test]
    fn injected_failure_applies_once() {
        let provider = InMemoryMeterProvider::new();
        let meter = provider.meter("scope");
        provider.fail_next_with("registry is full");

        match meter.i64_up_down_counter("first").try_init() {
            Err(MetricsError::Other(message)) => assert_eq!(message, "registry is full"),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
        assert!(meter.i64_up_down_counter("second").try_init().is_ok());
    }

    #[test]
    fn callbacks_only_observe_their_instruments() {
        let provider = InMemoryMeterProvider::new();
        let meter = provider.meter("scope");
        let registered = meter.u64_observable_counter("registered").try_init().unwrap();
        let foreign = meter.u64_observable_counter("foreign").try_init().unwrap();

        let observed_registered = registered.clone();
        let _registration = meter
            .register_callback(&[registered.as_any()], move |observer| {
                observer.observe_u64(&observed_registered, 1, &[]);
                observer.observe_u64(&foreign, 2, &[]);
            })
            .unwrap();

        let observed = provider.collect();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].instrument, "registered");
    }

    #[test]
    fn instruments_of_another_provider_are_refused() {
        let provider = InMemoryMeterProvider::new();
        let other = InMemoryMeterProvider::new();
        let gauge = other
            .meter("scope")
            .f64_observable_gauge("gauge")
            .try_init()
            .unwrap();

        let result = provider
            .meter("scope")
            .register_callback(&[gauge.as_any()], |_| {});
        assert!(result.is_err());
        assert_eq!(provider.callback_count(), 0);
    }

    #[test]
    fn callbacks_do_not_observe_instruments_of_another_provider() {
        let provider = InMemoryMeterProvider::new();
        let other = InMemoryMeterProvider::new();
        // First instrument of each provider, so both get the same id.
        let registered = provider
            .meter("scope")
            .i64_observable_gauge("registered")
            .try_init()
            .unwrap();
        let foreign = other
            .meter("scope")
            .i64_observable_gauge("foreign")
            .try_init()
            .unwrap();

        let observed_registered = registered.clone();
        let _registration = provider
            .meter("scope")
            .register_callback(&[registered.as_any()], move |observer| {
                observer.observe_i64(&observed_registered, 1, &[]);
                observer.observe_i64(&foreign, 2, &[]);
            })
            .unwrap();

        let observed = provider.collect();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].instrument, "registered");
        assert!(other.collect().is_empty());
        assert!(other.measurements().is_empty());
    }

    #[test]
    fn unregister_stops_collection_and_is_idempotent() {
        let provider = InMemoryMeterProvider::new();
        let meter = provider.meter("scope");
        let gauge = meter.i64_observable_gauge("gauge").try_init().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let mut registration = meter
            .register_callback(&[gauge.as_any()], move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        provider.collect();
        registration.unregister().unwrap();
        registration.unregister().unwrap();
        provider.collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.callback_count(), 0);
    }

    #[test]
    fn reset_keeps_registrations() {
        let provider = InMemoryMeterProvider::new();
        let meter = provider.meter("scope");
        let _gauge = meter
            .f64_observable_gauge("gauge")
            .with_callback(|observer| observer.observe(1.0, &[]))
            .try_init()
            .unwrap();

        provider.collect();
        assert_eq!(provider.measurements().len(), 1);

        provider.reset();
        assert!(provider.measurements().is_empty());
        assert_eq!(provider.callback_count(), 1);
        assert_eq!(provider.collect().len(), 1);
    }
}
