use opentelemetry::metrics::MetricsError;
use thiserror::Error;

use crate::kind::Operation;

/// A specialized `Result` type for the fallible factory operations.
pub type Result<T> = std::result::Result<T, RegistrationFailure>;

/// Errors raised when an instrument or a callback cannot be registered.
///
/// The aborting factory operations panic with this error's message.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistrationFailure {
    /// The factory was built without a meter.
    #[error("cannot {operation}: factory has no meter")]
    MissingMeter {
        /// The failed request.
        operation: Operation,
    },
    /// The meter refused the request.
    #[error("cannot {operation}: {source}")]
    Meter {
        /// The failed request.
        operation: Operation,
        /// Error returned by the meter.
        source: MetricsError,
    },
}

impl RegistrationFailure {
    /// The request that failed.
    pub fn operation(&self) -> &Operation {
        match self {
            RegistrationFailure::MissingMeter { operation }
            | RegistrationFailure::Meter { operation, .. } => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::InstrumentKind;

    #[test]
    fn message_names_the_operation_and_the_cause() {
        let err = RegistrationFailure::Meter {
            operation: Operation::CreateInstrument {
                kind: InstrumentKind::U64Counter,
                name: "my.counter".into(),
            },
            source: MetricsError::Other("duplicate instrument".into()),
        };

        let message = err.to_string();
        assert!(message.contains("create u64_counter `my.counter`"), "{message}");
        assert!(message.contains("duplicate instrument"), "{message}");
        assert!(err.source().is_some());
    }

    #[test]
    fn missing_meter_has_no_source() {
        let err = RegistrationFailure::MissingMeter {
            operation: Operation::RegisterCallback { instruments: 2 },
        };

        assert_eq!(
            err.to_string(),
            "cannot register callback over 2 instruments: factory has no meter"
        );
        assert!(err.source().is_none());
        assert_eq!(err.operation(), &Operation::RegisterCallback { instruments: 2 });
    }
}
