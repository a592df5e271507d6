use std::io;

use thiserror::Error;

use crate::serial::TransportError;

/// Errors related to loading link configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file couldn't be read.
    #[error("Failed to read configuration from {}", path)]
    Read {
        /// Path of the file.
        path: String,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The configuration wasn't valid TOML or didn't match the expected layout.
    #[error("Failed to parse configuration")]
    Parse {
        /// The underlying TOML error.
        #[from]
        source: toml::de::Error,
    },

    /// A value was out of range or inconsistent.
    #[error("Invalid configuration for link {}: {}", link, message)]
    Invalid {
        /// Name of the offending link.
        link: String,

        /// What's wrong with it.
        message: String,
    },
}

/// Errors related to running a link.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// The link's transport couldn't be set up.
    #[error("Link transport failed")]
    Transport {
        /// The underlying transport error.
        #[from]
        source: TransportError,
    },

    /// The link's configuration was invalid.
    #[error("Link configuration is invalid")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// The worker thread couldn't be started.
    #[error("Failed to start worker for link {}", link)]
    Spawn {
        /// Name of the link.
        link: String,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The worker thread panicked.
    #[error("Worker for link {} panicked", link)]
    WorkerPanicked {
        /// Name of the link.
        link: String,
    },
}
