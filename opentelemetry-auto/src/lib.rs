//! Infallible constructors for the [OpenTelemetry] metric instruments.
//!
//! The metrics API hands out instrument builders whose `try_init` returns a
//! `Result`. Instruments are nearly always created while a program starts,
//! where a failed registration is a bug to be fixed rather than a condition
//! to recover from. This crate wraps the builders so that the common path
//! returns the instrument directly and panics, with the meter's error as
//! message, when registration fails. It follows the spirit of Prometheus'
//! `promauto`.
//!
//! [OpenTelemetry]: https://opentelemetry.io/
//!
//! # Getting Started
//!
//! The free functions create instruments on the globally configured
//! [`MeterProvider`](opentelemetry::metrics::MeterProvider), under the
//! [`INSTRUMENTATION_NAME`] scope:
//!
//! ```
//! use opentelemetry::KeyValue;
//! use opentelemetry_auto::InstrumentOptions;
//!
//! let counter = opentelemetry_auto::u64_counter("my.counter", InstrumentOptions::new());
//! counter.add(1, &[KeyValue::new("route", "/")]);
//! ```
//!
//! The global provider is looked up on every call, so instruments created
//! after [`opentelemetry::global::set_meter_provider`] land on the new
//! provider.
//!
//! Use a [`Factory`] to create instruments on a specific meter:
//!
//! ```
//! use opentelemetry::metrics::MeterProvider as _;
//! use opentelemetry::metrics::noop::NoopMeterProvider;
//! use opentelemetry_auto::{Factory, ObserverOptions};
//!
//! let factory = Factory::new(NoopMeterProvider::new().meter("my-library"));
//! let _uptime = factory.f64_observable_gauge(
//!     "process.uptime",
//!     ObserverOptions::<f64>::new().with_callback(|observer| observer.observe(12.5, &[])),
//! );
//! ```
//!
//! # Crate Feature Flags
//!
//! * `internal-logs`: (enabled by default) emits `tracing` events when
//!   instruments are created and when registration fails.
//! * `testing`: exposes [`testing::metrics::InMemoryMeterProvider`], a meter
//!   provider recording instruments and measurements in memory.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use std::any::Any;
use std::borrow::Cow;
use std::sync::Arc;

use opentelemetry::global;
use opentelemetry::metrics::{
    CallbackRegistration, Counter, Histogram, ObservableCounter, ObservableGauge,
    ObservableUpDownCounter, Observer, UpDownCounter,
};

mod error;
mod factory;
mod internal_logging;
mod kind;
mod options;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(any(test, feature = "testing"))))]
pub mod testing;

pub use error::{RegistrationFailure, Result};
pub use factory::Factory;
pub use kind::{InstrumentKind, ObservableInstrument, Operation, SyncInstrument};
pub use options::{InstrumentOptions, ObserverOptions};

/// Name of the instrumentation scope instruments created through the free
/// functions are attributed to.
pub const INSTRUMENTATION_NAME: &str = env!("CARGO_PKG_NAME");

/// Version of the instrumentation scope instruments created through the free
/// functions are attributed to.
pub const INSTRUMENTATION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns a [`Factory`] on the meter of the current global meter provider.
///
/// The global provider is resolved on each call and never cached.
pub fn default_factory() -> Factory {
    Factory::from_provider(&global::meter_provider())
}

macro_rules! default_sync_constructors {
    ($($(#[$doc:meta])* $method:ident, $try_method:ident => $handle:ty;)+) => {
        $(
            $(#[$doc])*
            ///
            /// # Panics
            ///
            /// Panics if the global meter refuses the instrument.
            #[track_caller]
            pub fn $method(name: impl Into<Cow<'static, str>>, options: InstrumentOptions) -> $handle {
                default_factory().$method(name, options)
            }

            $(#[$doc])*
            pub fn $try_method(
                name: impl Into<Cow<'static, str>>,
                options: InstrumentOptions,
            ) -> Result<$handle> {
                default_factory().$try_method(name, options)
            }
        )+
    };
}

macro_rules! default_observable_constructors {
    ($($(#[$doc:meta])* $method:ident, $try_method:ident => $handle:ty, $value:ty;)+) => {
        $(
            $(#[$doc])*
            ///
            /// # Panics
            ///
            /// Panics if the global meter refuses the instrument.
            #[track_caller]
            pub fn $method(name: impl Into<Cow<'static, str>>, options: ObserverOptions<$value>) -> $handle {
                default_factory().$method(name, options)
            }

            $(#[$doc])*
            pub fn $try_method(
                name: impl Into<Cow<'static, str>>,
                options: ObserverOptions<$value>,
            ) -> Result<$handle> {
                default_factory().$try_method(name, options)
            }
        )+
    };
}

default_sync_constructors! {
    /// Creates, on the global meter, an instrument recording increasing `u64`
    /// measurements synchronously.
    u64_counter, try_u64_counter => Counter<u64>;
    /// Creates, on the global meter, an instrument recording increasing `f64`
    /// measurements synchronously.
    f64_counter, try_f64_counter => Counter<f64>;
    /// Creates, on the global meter, an instrument recording `i64` changes of
    /// a value synchronously.
    i64_up_down_counter, try_i64_up_down_counter => UpDownCounter<i64>;
    /// Creates, on the global meter, an instrument recording `f64` changes of
    /// a value synchronously.
    f64_up_down_counter, try_f64_up_down_counter => UpDownCounter<f64>;
    /// Creates, on the global meter, an instrument recording the distribution
    /// of `u64` measurements synchronously.
    u64_histogram, try_u64_histogram => Histogram<u64>;
    /// Creates, on the global meter, an instrument recording the distribution
    /// of `f64` measurements synchronously.
    f64_histogram, try_f64_histogram => Histogram<f64>;
}

default_observable_constructors! {
    /// Creates, on the global meter, an instrument reporting increasing `u64`
    /// measurements once per collection cycle.
    u64_observable_counter, try_u64_observable_counter => ObservableCounter<u64>, u64;
    /// Creates, on the global meter, an instrument reporting increasing `f64`
    /// measurements once per collection cycle.
    f64_observable_counter, try_f64_observable_counter => ObservableCounter<f64>, f64;
    /// Creates, on the global meter, an instrument reporting `i64` changes of
    /// a value once per collection cycle.
    i64_observable_up_down_counter, try_i64_observable_up_down_counter => ObservableUpDownCounter<i64>, i64;
    /// Creates, on the global meter, an instrument reporting `f64` changes of
    /// a value once per collection cycle.
    f64_observable_up_down_counter, try_f64_observable_up_down_counter => ObservableUpDownCounter<f64>, f64;
    /// Creates, on the global meter, an instrument reporting the
    /// instantaneous `i64` value once per collection cycle.
    i64_observable_gauge, try_i64_observable_gauge => ObservableGauge<i64>, i64;
    /// Creates, on the global meter, an instrument reporting the
    /// instantaneous `f64` value once per collection cycle.
    f64_observable_gauge, try_f64_observable_gauge => ObservableGauge<f64>, f64;
}

/// Registers `callback` on the global meter, to be called during the
/// collection of a measurement cycle.
///
/// The instruments passed are the only instruments `callback` may observe
/// values for. If none are passed, `callback` is neither registered nor
/// called. Once the returned registration is unregistered, `callback` is no
/// longer called.
///
/// # Panics
///
/// Panics if the global meter refuses the callback.
#[track_caller]
pub fn register_callback<F>(
    instruments: &[Arc<dyn Any>],
    callback: F,
) -> Box<dyn CallbackRegistration>
where
    F: Fn(&dyn Observer) + Send + Sync + 'static,
{
    default_factory().register_callback(instruments, callback)
}

/// Registers `callback` on the global meter, to be called during the
/// collection of a measurement cycle.
///
/// See [`register_callback`] for how the instruments and the returned
/// registration are treated.
pub fn try_register_callback<F>(
    instruments: &[Arc<dyn Any>],
    callback: F,
) -> Result<Box<dyn CallbackRegistration>>
where
    F: Fn(&dyn Observer) + Send + Sync + 'static,
{
    default_factory().try_register_callback(instruments, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_factory_has_a_meter() {
        assert!(default_factory().meter().is_some());
    }

    #[test]
    fn default_constructors_use_the_noop_provider_when_none_is_set() {
        let counter = u64_counter("my.counter", InstrumentOptions::new());
        counter.add(1, &[]);

        let gauge = i64_observable_gauge("my.gauge", ObserverOptions::new());
        let registration = register_callback(&[gauge.as_any()], move |observer| {
            observer.observe_i64(&gauge, 1, &[])
        });
        drop(registration);
    }
}
