#![allow(unused_macros)]
//! Logging macros used by this crate to report what happens to instrument and
//! callback registrations.
//!
//! Events carry a `name` (the operation being logged) plus optional key-value
//! pairs, and are emitted with the crate name as target. They compile to
//! `tracing` events when the `internal-logs` feature is enabled.
//!
//! When running tests with `--nocapture`, these macros print their output to
//! stdout as well.

/// Logs a debug event.
///
/// ```ignore
/// otel_debug!(name: "Factory.InstrumentCreated", kind = "u64_counter");
/// ```
macro_rules! otel_debug {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("otel_debug: name={}\n", $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name; // Compiler will optimize this out as it's unused.
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("otel_debug: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+); // Compiler will optimize this out as it's unused.
        }
    };
}

/// Logs an error event.
///
/// ```ignore
/// otel_error!(name: "Factory.RegistrationFailed", error = err.to_string());
/// ```
macro_rules! otel_error {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            tracing::error!(name: $name,
                            target: env!("CARGO_PKG_NAME"),
                            name = $name,
                            $($key = {
                                    $value
                            }),+,
                    )
        }

        #[cfg(test)]
        {
            print!("otel_error: name={}", $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+); // Compiler will optimize this out as it's unused.
        }
    };
}

pub(crate) use otel_debug;
pub(crate) use otel_error;
