use core::fmt;
use std::borrow::Cow;

use opentelemetry::metrics::{AsyncInstrument, Unit};

/// A callback observing the values of a single asynchronous instrument.
pub(crate) type ObserveFn<T> = Box<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync>;

/// Configuration for creating a synchronous instrument.
///
/// Nothing here is validated by the factory, it is handed to the meter as is.
#[derive(Clone, Default)]
pub struct InstrumentOptions {
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Unit>,
}

impl InstrumentOptions {
    /// Options with no description and no unit.
    pub fn new() -> Self {
        InstrumentOptions::default()
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }
}

impl fmt::Debug for InstrumentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentOptions")
            .field("description", &self.description)
            .field("unit", &self.unit)
            .finish()
    }
}

/// Configuration for creating an asynchronous instrument observing values of
/// type `T`.
pub struct ObserverOptions<T> {
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Unit>,
    pub(crate) callbacks: Vec<ObserveFn<T>>,
}

impl<T> ObserverOptions<T> {
    /// Options with no description, no unit and no callback.
    pub fn new() -> Self {
        ObserverOptions {
            description: None,
            unit: None,
            callbacks: Vec::new(),
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Add a callback invoked once per collection cycle to report the
    /// instrument's current value.
    ///
    /// Callbacks run in the order they were added and need to complete in a
    /// finite amount of time.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn AsyncInstrument<T>) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Number of callbacks added so far.
    pub fn callbacks_len(&self) -> usize {
        self.callbacks.len()
    }
}

impl<T> Default for ObserverOptions<T> {
    fn default() -> Self {
        ObserverOptions::new()
    }
}

impl<T> fmt::Debug for ObserverOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverOptions")
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<T>())
            .field("callbacks_len", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_options_keep_what_they_are_given() {
        let options = InstrumentOptions::new()
            .with_description("Requests served")
            .with_unit(Unit::new("{request}"));

        assert_eq!(options.description.as_deref(), Some("Requests served"));
        assert_eq!(options.unit.as_ref().map(Unit::as_str), Some("{request}"));
    }

    #[test]
    fn observer_options_accumulate_callbacks() {
        let options = ObserverOptions::<u64>::new()
            .with_callback(|observer| observer.observe(1, &[]))
            .with_callback(|observer| observer.observe(2, &[]));

        assert_eq!(options.callbacks_len(), 2);
        assert!(format!("{options:?}").contains("callbacks_len: 2"));
    }
}
