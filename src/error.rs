use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("scheduler has been shut down")]
    SchedulerShutdown,

    #[error("{name} did not report ready within {timeout:?}")]
    BootstrapTimeout { name: String, timeout: Duration },

    #[error("config error: {0}")]
    Config(String),

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("cleanup action panicked: {0}")]
    CleanupPanicked(String),

    #[error("scheduled action panicked: {0}")]
    ActionPanicked(String),

    #[error("{} cleanup actions failed", .0.len())]
    Composite(Vec<Error>),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Error::Scheduler(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Error::Stream(msg.into())
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Error::Composite(_))
    }

    /// Collapses a list of failures into a single result: no failures is
    /// `Ok`, one is returned unchanged, several become [`Error::Composite`].
    pub fn aggregate(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Composite(errors)),
        }
    }

    /// Leaf errors of a (possibly nested) composite, in collection order.
    pub fn flatten(self) -> Vec<Error> {
        match self {
            Error::Composite(errors) => errors.into_iter().flat_map(Error::flatten).collect(),
            other => vec![other],
        }
    }
}
