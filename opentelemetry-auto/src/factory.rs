use core::fmt;
use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

use opentelemetry::metrics::{
    CallbackRegistration, Counter, Histogram, Meter, MeterProvider, ObservableCounter,
    ObservableGauge, ObservableUpDownCounter, Observer, UpDownCounter,
};

use crate::error::{RegistrationFailure, Result};
use crate::internal_logging::{otel_debug, otel_error};
use crate::kind::{ObservableInstrument, Operation, SyncInstrument};
use crate::options::{InstrumentOptions, ObserverOptions};
use crate::{INSTRUMENTATION_NAME, INSTRUMENTATION_VERSION};

macro_rules! sync_constructors {
    ($($(#[$doc:meta])* $method:ident, $try_method:ident => $handle:ty;)+) => {
        $(
            $(#[$doc])*
            ///
            /// # Panics
            ///
            /// Panics if the factory has no meter or the meter refuses the
            /// instrument.
            #[doc = concat!("Use [`", stringify!($try_method), "`](Factory::", stringify!($try_method), ") if you want to handle errors.")]
            #[track_caller]
            pub fn $method(
                &self,
                name: impl Into<Cow<'static, str>>,
                options: InstrumentOptions,
            ) -> $handle {
                self.create(name, options)
            }

            $(#[$doc])*
            pub fn $try_method(
                &self,
                name: impl Into<Cow<'static, str>>,
                options: InstrumentOptions,
            ) -> Result<$handle> {
                self.try_create(name, options)
            }
        )+
    };
}

macro_rules! observable_constructors {
    ($($(#[$doc:meta])* $method:ident, $try_method:ident => $handle:ty, $value:ty;)+) => {
        $(
            $(#[$doc])*
            ///
            /// # Panics
            ///
            /// Panics if the factory has no meter or the meter refuses the
            /// instrument.
            #[doc = concat!("Use [`", stringify!($try_method), "`](Factory::", stringify!($try_method), ") if you want to handle errors.")]
            #[track_caller]
            pub fn $method(
                &self,
                name: impl Into<Cow<'static, str>>,
                options: ObserverOptions<$value>,
            ) -> $handle {
                self.create_observable(name, options)
            }

            $(#[$doc])*
            pub fn $try_method(
                &self,
                name: impl Into<Cow<'static, str>>,
                options: ObserverOptions<$value>,
            ) -> Result<$handle> {
                self.try_create_observable(name, options)
            }
        )+
    };
}

/// Creates instruments and registers callbacks on a [`Meter`], turning every
/// registration error into a panic.
///
/// Instruments are usually created once, when a process or a module starts.
/// A failure at that point is a programming error, so the plain constructors
/// panic instead of returning a `Result`. Each of them has a `try_` variant
/// returning [`RegistrationFailure`] for callers that want to handle it.
///
/// A factory built without a meter is valid; every operation on it fails.
///
/// ```
/// use opentelemetry::metrics::{MeterProvider as _, Unit};
/// use opentelemetry::metrics::noop::NoopMeterProvider;
/// use opentelemetry_auto::{Factory, InstrumentOptions};
///
/// let meter = NoopMeterProvider::new().meter("my-library");
/// let factory = Factory::new(meter);
///
/// let requests = factory.u64_counter(
///     "http.server.requests",
///     InstrumentOptions::new()
///         .with_description("Requests served")
///         .with_unit(Unit::new("{request}")),
/// );
/// requests.add(1, &[]);
/// ```
#[derive(Clone, Default)]
pub struct Factory {
    meter: Option<Meter>,
}

impl Factory {
    /// Creates a factory registering instruments on `meter`.
    pub fn new(meter: Meter) -> Self {
        Factory { meter: Some(meter) }
    }

    /// Creates a factory registering instruments on `meter`, if any.
    ///
    /// `None` is accepted here. The returned factory fails on first use, not
    /// at construction.
    pub fn with(meter: Option<Meter>) -> Self {
        Factory { meter }
    }

    /// Creates a factory on the meter `provider` hands out for this crate's
    /// instrumentation scope.
    pub fn from_provider<P: MeterProvider>(provider: &P) -> Self {
        Factory::new(provider.versioned_meter(
            INSTRUMENTATION_NAME,
            Some(INSTRUMENTATION_VERSION),
            None::<&'static str>,
            None,
        ))
    }

    /// The meter instruments are registered on.
    pub fn meter(&self) -> Option<&Meter> {
        self.meter.as_ref()
    }

    /// Creates a synchronous instrument of type `I`.
    pub fn try_create<I: SyncInstrument>(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: InstrumentOptions,
    ) -> Result<I> {
        let name = name.into();
        let Some(meter) = &self.meter else {
            return Err(RegistrationFailure::MissingMeter {
                operation: Operation::CreateInstrument { kind: I::KIND, name },
            });
        };

        match I::build(meter, name.clone(), options) {
            Ok(instrument) => {
                otel_debug!(
                    name: "Factory.InstrumentCreated",
                    kind = I::KIND.as_str(),
                    instrument = name.as_ref()
                );
                Ok(instrument)
            }
            Err(source) => Err(RegistrationFailure::Meter {
                operation: Operation::CreateInstrument { kind: I::KIND, name },
                source,
            }),
        }
    }

    /// Creates a synchronous instrument of type `I`.
    ///
    /// # Panics
    ///
    /// Panics if the factory has no meter or the meter refuses the
    /// instrument. Use [`try_create`](Factory::try_create) if you want to
    /// handle errors.
    #[track_caller]
    pub fn create<I: SyncInstrument>(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: InstrumentOptions,
    ) -> I {
        abort_on_failure(self.try_create(name, options))
    }

    /// Creates an asynchronous instrument of type `I` observing values of
    /// type `T`.
    pub fn try_create_observable<I, T>(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: ObserverOptions<T>,
    ) -> Result<I>
    where
        I: ObservableInstrument<T>,
    {
        let name = name.into();
        let Some(meter) = &self.meter else {
            return Err(RegistrationFailure::MissingMeter {
                operation: Operation::CreateInstrument { kind: I::KIND, name },
            });
        };

        let callbacks = options.callbacks_len();
        match I::build(meter, name.clone(), options) {
            Ok(instrument) => {
                otel_debug!(
                    name: "Factory.InstrumentCreated",
                    kind = I::KIND.as_str(),
                    instrument = name.as_ref(),
                    callbacks = callbacks
                );
                Ok(instrument)
            }
            Err(source) => Err(RegistrationFailure::Meter {
                operation: Operation::CreateInstrument { kind: I::KIND, name },
                source,
            }),
        }
    }

    /// Creates an asynchronous instrument of type `I` observing values of
    /// type `T`.
    ///
    /// # Panics
    ///
    /// Panics if the factory has no meter or the meter refuses the
    /// instrument. Use [`try_create_observable`](Factory::try_create_observable)
    /// if you want to handle errors.
    #[track_caller]
    pub fn create_observable<I, T>(
        &self,
        name: impl Into<Cow<'static, str>>,
        options: ObserverOptions<T>,
    ) -> I
    where
        I: ObservableInstrument<T>,
    {
        abort_on_failure(self.try_create_observable(name, options))
    }

    /// Registers `callback` to be called during the collection of a
    /// measurement cycle.
    ///
    /// The instruments passed are the only instruments `callback` may observe
    /// values for. If none are passed, the meter is expected neither to
    /// register nor to call it.
    ///
    /// Once the returned registration is unregistered, `callback` is no
    /// longer called during collection.
    pub fn try_register_callback<F>(
        &self,
        instruments: &[Arc<dyn Any>],
        callback: F,
    ) -> Result<Box<dyn CallbackRegistration>>
    where
        F: Fn(&dyn Observer) + Send + Sync + 'static,
    {
        let operation = Operation::RegisterCallback {
            instruments: instruments.len(),
        };
        let Some(meter) = &self.meter else {
            return Err(RegistrationFailure::MissingMeter { operation });
        };

        match meter.register_callback(instruments, callback) {
            Ok(registration) => {
                otel_debug!(
                    name: "Factory.CallbackRegistered",
                    instruments = instruments.len()
                );
                Ok(registration)
            }
            Err(source) => Err(RegistrationFailure::Meter { operation, source }),
        }
    }

    /// Registers `callback` to be called during the collection of a
    /// measurement cycle.
    ///
    /// See [`try_register_callback`](Factory::try_register_callback) for how
    /// the instruments and the returned registration are treated.
    ///
    /// # Panics
    ///
    /// Panics if the factory has no meter or the meter refuses the callback.
    #[track_caller]
    pub fn register_callback<F>(
        &self,
        instruments: &[Arc<dyn Any>],
        callback: F,
    ) -> Box<dyn CallbackRegistration>
    where
        F: Fn(&dyn Observer) + Send + Sync + 'static,
    {
        abort_on_failure(self.try_register_callback(instruments, callback))
    }

    sync_constructors! {
        /// Creates an instrument recording increasing `u64` measurements
        /// synchronously, during a computational operation.
        u64_counter, try_u64_counter => Counter<u64>;
        /// Creates an instrument recording increasing `f64` measurements
        /// synchronously, during a computational operation.
        f64_counter, try_f64_counter => Counter<f64>;
        /// Creates an instrument recording `i64` changes of a value
        /// synchronously, during a computational operation.
        i64_up_down_counter, try_i64_up_down_counter => UpDownCounter<i64>;
        /// Creates an instrument recording `f64` changes of a value
        /// synchronously, during a computational operation.
        f64_up_down_counter, try_f64_up_down_counter => UpDownCounter<f64>;
        /// Creates an instrument recording the distribution of `u64`
        /// measurements synchronously, during a computational operation.
        u64_histogram, try_u64_histogram => Histogram<u64>;
        /// Creates an instrument recording the distribution of `f64`
        /// measurements synchronously, during a computational operation.
        f64_histogram, try_f64_histogram => Histogram<f64>;
    }

    observable_constructors! {
        /// Creates an instrument reporting increasing `u64` measurements once
        /// per collection cycle.
        u64_observable_counter, try_u64_observable_counter => ObservableCounter<u64>, u64;
        /// Creates an instrument reporting increasing `f64` measurements once
        /// per collection cycle.
        f64_observable_counter, try_f64_observable_counter => ObservableCounter<f64>, f64;
        /// Creates an instrument reporting `i64` changes of a value once per
        /// collection cycle.
        i64_observable_up_down_counter, try_i64_observable_up_down_counter => ObservableUpDownCounter<i64>, i64;
        /// Creates an instrument reporting `f64` changes of a value once per
        /// collection cycle.
        f64_observable_up_down_counter, try_f64_observable_up_down_counter => ObservableUpDownCounter<f64>, f64;
        /// Creates an instrument reporting the instantaneous `i64` value once
        /// per collection cycle.
        i64_observable_gauge, try_i64_observable_gauge => ObservableGauge<i64>, i64;
        /// Creates an instrument reporting the instantaneous `f64` value once
        /// per collection cycle.
        f64_observable_gauge, try_f64_observable_gauge => ObservableGauge<f64>, f64;
    }
}

impl From<Meter> for Factory {
    fn from(meter: Meter) -> Self {
        Factory::new(meter)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("has_meter", &self.meter.is_some())
            .finish()
    }
}

#[track_caller]
fn abort_on_failure<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            otel_error!(name: "Factory.RegistrationFailed", error = err.to_string());
            panic!("{err}")
        }
    }
}
