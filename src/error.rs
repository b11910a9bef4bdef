use crate::naming::dns::DnsError;
use crate::naming::resolver::ResolveError;
use crate::network::NetworkError;
use crate::provider::ProviderError;
use thiserror::Error;

/// Top-level error for daemon composition.
///
/// Only the daemon decides whether a startup error is fatal; no component
/// below this level terminates the process on its own.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("naming error: {0}")]
    Naming(#[from] ResolveError),

    #[error("dns responder error: {0}")]
    Dns(#[from] DnsError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("configuration error: {0}")]
    Config(String),
}
