use std::borrow::Cow;
use std::fmt;

use opentelemetry::metrics::{
    self, Counter, Histogram, Meter, ObservableCounter, ObservableGauge, ObservableUpDownCounter,
    UpDownCounter,
};

use crate::options::{InstrumentOptions, ObserverOptions};

/// The instruments a [`Factory`](crate::Factory) knows how to create.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// `Counter<u64>`
    U64Counter,
    /// `Counter<f64>`
    F64Counter,
    /// `UpDownCounter<i64>`
    I64UpDownCounter,
    /// `UpDownCounter<f64>`
    F64UpDownCounter,
    /// `Histogram<u64>`
    U64Histogram,
    /// `Histogram<f64>`
    F64Histogram,
    /// `ObservableCounter<u64>`
    U64ObservableCounter,
    /// `ObservableCounter<f64>`
    F64ObservableCounter,
    /// `ObservableUpDownCounter<i64>`
    I64ObservableUpDownCounter,
    /// `ObservableUpDownCounter<f64>`
    F64ObservableUpDownCounter,
    /// `ObservableGauge<i64>`
    I64ObservableGauge,
    /// `ObservableGauge<f64>`
    F64ObservableGauge,
}

impl InstrumentKind {
    /// Every kind, synchronous ones first.
    pub const ALL: [InstrumentKind; 12] = [
        InstrumentKind::U64Counter,
        InstrumentKind::F64Counter,
        InstrumentKind::I64UpDownCounter,
        InstrumentKind::F64UpDownCounter,
        InstrumentKind::U64Histogram,
        InstrumentKind::F64Histogram,
        InstrumentKind::U64ObservableCounter,
        InstrumentKind::F64ObservableCounter,
        InstrumentKind::I64ObservableUpDownCounter,
        InstrumentKind::F64ObservableUpDownCounter,
        InstrumentKind::I64ObservableGauge,
        InstrumentKind::F64ObservableGauge,
    ];

    /// Name of the [`Meter`] method creating this kind of instrument.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::U64Counter => "u64_counter",
            InstrumentKind::F64Counter => "f64_counter",
            InstrumentKind::I64UpDownCounter => "i64_up_down_counter",
            InstrumentKind::F64UpDownCounter => "f64_up_down_counter",
            InstrumentKind::U64Histogram => "u64_histogram",
            InstrumentKind::F64Histogram => "f64_histogram",
            InstrumentKind::U64ObservableCounter => "u64_observable_counter",
            InstrumentKind::F64ObservableCounter => "f64_observable_counter",
            InstrumentKind::I64ObservableUpDownCounter => "i64_observable_up_down_counter",
            InstrumentKind::F64ObservableUpDownCounter => "f64_observable_up_down_counter",
            InstrumentKind::I64ObservableGauge => "i64_observable_gauge",
            InstrumentKind::F64ObservableGauge => "f64_observable_gauge",
        }
    }

    /// Whether instruments of this kind report values through callbacks
    /// during collection instead of recording them synchronously.
    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            InstrumentKind::U64ObservableCounter
                | InstrumentKind::F64ObservableCounter
                | InstrumentKind::I64ObservableUpDownCounter
                | InstrumentKind::F64ObservableUpDownCounter
                | InstrumentKind::I64ObservableGauge
                | InstrumentKind::F64ObservableGauge
        )
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request a [`Factory`](crate::Factory) was serving when it failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Creating an instrument.
    CreateInstrument {
        /// Kind of the requested instrument.
        kind: InstrumentKind,
        /// Name of the requested instrument.
        name: Cow<'static, str>,
    },
    /// Registering a multi-instrument callback.
    RegisterCallback {
        /// Number of instruments the callback was registered for.
        instruments: usize,
    },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateInstrument { kind, name } => write!(f, "create {kind} `{name}`"),
            Operation::RegisterCallback { instruments: 1 } => {
                f.write_str("register callback over 1 instrument")
            }
            Operation::RegisterCallback { instruments } => {
                write!(f, "register callback over {instruments} instruments")
            }
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// A synchronous instrument the [`Meter`] can create.
///
/// Implemented for every synchronous handle of the metrics API. The trait is
/// sealed.
pub trait SyncInstrument: Sized + private::Sealed {
    /// The kind this handle corresponds to.
    const KIND: InstrumentKind;

    /// Creates the instrument on `meter`, surfacing the meter's error.
    fn build(
        meter: &Meter,
        name: Cow<'static, str>,
        options: InstrumentOptions,
    ) -> metrics::Result<Self>;
}

/// An asynchronous instrument observing values of type `T` the [`Meter`] can
/// create.
///
/// Implemented for every observable handle of the metrics API. The trait is
/// sealed.
pub trait ObservableInstrument<T>: Sized + private::Sealed {
    /// The kind this handle corresponds to.
    const KIND: InstrumentKind;

    /// Creates the instrument on `meter`, surfacing the meter's error.
    fn build(
        meter: &Meter,
        name: Cow<'static, str>,
        options: ObserverOptions<T>,
    ) -> metrics::Result<Self>;
}

macro_rules! sync_instrument {
    ($($handle:ty => $kind:ident, $method:ident;)+) => {
        $(
            impl private::Sealed for $handle {}

            impl SyncInstrument for $handle {
                const KIND: InstrumentKind = InstrumentKind::$kind;

                fn build(
                    meter: &Meter,
                    name: Cow<'static, str>,
                    options: InstrumentOptions,
                ) -> metrics::Result<Self> {
                    let mut builder = meter.$method(name);
                    if let Some(description) = options.description {
                        builder = builder.with_description(description);
                    }
                    if let Some(unit) = options.unit {
                        builder = builder.with_unit(unit);
                    }
                    builder.try_init()
                }
            }
        )+
    };
}

macro_rules! observable_instrument {
    ($($handle:ty, $value:ty => $kind:ident, $method:ident;)+) => {
        $(
            impl private::Sealed for $handle {}

            impl ObservableInstrument<$value> for $handle {
                const KIND: InstrumentKind = InstrumentKind::$kind;

                fn build(
                    meter: &Meter,
                    name: Cow<'static, str>,
                    options: ObserverOptions<$value>,
                ) -> metrics::Result<Self> {
                    let mut builder = meter.$method(name);
                    if let Some(description) = options.description {
                        builder = builder.with_description(description);
                    }
                    if let Some(unit) = options.unit {
                        builder = builder.with_unit(unit);
                    }
                    for callback in options.callbacks {
                        builder = builder.with_callback(callback);
                    }
                    builder.try_init()
                }
            }
        )+
    };
}

sync_instrument! {
    Counter<u64> => U64Counter, u64_counter;
    Counter<f64> => F64Counter, f64_counter;
    UpDownCounter<i64> => I64UpDownCounter, i64_up_down_counter;
    UpDownCounter<f64> => F64UpDownCounter, f64_up_down_counter;
    Histogram<u64> => U64Histogram, u64_histogram;
    Histogram<f64> => F64Histogram, f64_histogram;
}

observable_instrument! {
    ObservableCounter<u64>, u64 => U64ObservableCounter, u64_observable_counter;
    ObservableCounter<f64>, f64 => F64ObservableCounter, f64_observable_counter;
    ObservableUpDownCounter<i64>, i64 => I64ObservableUpDownCounter, i64_observable_up_down_counter;
    ObservableUpDownCounter<f64>, f64 => F64ObservableUpDownCounter, f64_observable_up_down_counter;
    ObservableGauge<i64>, i64 => I64ObservableGauge, i64_observable_gauge;
    ObservableGauge<f64>, f64 => F64ObservableGauge, f64_observable_gauge;
}
