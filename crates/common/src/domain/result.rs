use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Teardown step that failed while shutting a subscription down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    CancelConsumer,
    DeleteQueue,
    CloseConnection,
}

impl std::fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            TeardownStep::CancelConsumer => "cancel consumer",
            TeardownStep::DeleteQueue => "delete queue",
            TeardownStep::CloseConnection => "close connection",
        };
        f.write_str(step)
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Failed to dial broker: {0:#}")]
    DialFailure(anyhow::Error),

    #[error("Subscription setup failed after {attempts} attempt(s): {source:#}")]
    SetupFailed {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Subscription already established")]
    AlreadySubscribed,

    #[error("Subscription cancelled before it was established")]
    SubscribeCancelled,

    #[error("Failed to {step}: {source:#}")]
    TeardownFailure {
        step: TeardownStep,
        #[source]
        source: anyhow::Error,
    },

    #[error("Store failure: {0:#}")]
    StoreFailure(anyhow::Error),
}
