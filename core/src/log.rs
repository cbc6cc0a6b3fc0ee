// SPDX-License-Identifier: MPL-2.0

use std::fmt;

use tracing_subscriber::{filter::Directive, EnvFilter};

use crate::Config;

/// These are kinda noisy. If your terminal is spewing with `wgpu` messages, this is the place to
/// go.
static DIRECTIVES: &[&str] = &[
    "naga=warn",
    "wgpu_core=warn",
    "wgpu_hal=warn",
];

#[derive(Debug)]
pub enum Error {
    InvalidDirective { directive: String, reason: String },
    AlreadyInitialized(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDirective { directive, reason } => {
                write!(f, "failed to parse log directive '{}': {}", directive, reason)
            }
            Self::AlreadyInitialized(reason) => {
                write!(f, "a global subscriber is already set: {}", reason)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Builds the filter: `RUST_LOG`, then the built-in directives, then those of `config`.
pub fn filter(config: &Config) -> Result<EnvFilter, Error> {
    DIRECTIVES
        .iter()
        .copied()
        .chain(config.log_directives.iter().map(String::as_str))
        .map(|it| {
            it.parse::<Directive>().map_err(|e| Error::InvalidDirective {
                directive: it.to_string(),
                reason: e.to_string(),
            })
        })
        .try_fold(EnvFilter::from_default_env(), |filter, it| Ok(filter.add_directive(it?)))
}

/// Installs a global `fmt` subscriber.
///
/// Set the environment variable `RUST_LOG` to one of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
/// to pick the verbosity.
pub fn init(config: &Config) -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(config)?)
        .with_ansi(true)
        .with_level(true)
        // The target is mostly just noise, I think.
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|e| Error::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_directives() {
        let config = Config {
            log_directives: vec![
                String::from("latte_gpu=trace"),
                String::from("latte_gpu=loud"),
            ],
            ..Default::default()
        };

        match filter(&config) {
            Err(Error::InvalidDirective { directive, .. }) => {
                assert_eq!(directive, "latte_gpu=loud");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn accepts_module_directives() {
        let config = Config {
            log_directives: vec![String::from("latte_gpu::driver=debug")],
            ..Default::default()
        };

        assert!(filter(&config).is_ok());
    }
}
