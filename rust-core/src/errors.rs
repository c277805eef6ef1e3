use thiserror::Error;

/// Failures reported by a constraint solver backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("failed to launch solver '{command}': {reason}")]
    Launch { command: String, reason: String },
    #[error("solver answered something unexpected: {0}")]
    Protocol(String),
    #[error("no model is available, the last check was not satisfiable")]
    NoModel,
    #[error("the solver backend does not support {0}")]
    Unsupported(String),
    #[error("i/o error while talking to the solver: {0}")]
    Io(String),
}

impl From<std::io::Error> for SolverError {
    fn from(e: std::io::Error) -> Self {
        SolverError::Io(e.to_string())
    }
}

/// Fatal errors raised while building or decoding a scheduling model.
///
/// None of these can be recovered by relaxing a bound: they point to an inconsistent
/// application, platform or partition description, or to a defect in the model passes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    #[error("the unfolded graph has no sink instance, latency is undefined")]
    NoSinkInstance,
    #[error("a negative-weight cycle was found while computing instance distances")]
    NegativeCycle,
    #[error("one iteration of the graph deadlocks: instance '{0}' lies on a precedence cycle")]
    CyclicPrecedence(String),
    #[error("unknown actor '{0}'")]
    UnknownActor(String),
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),
    #[error("actor '{0}' is not allocated to any cluster")]
    UnmappedActor(String),
    #[error("actor '{0}' is declared twice")]
    DuplicateActor(String),
    #[error("channel '{0}' is declared twice")]
    DuplicateChannel(String),
    #[error("variable '{0}' is declared twice in the same model")]
    DuplicateVariable(String),
    #[error("variable '{0}' is not declared in this model")]
    UndeclaredVariable(String),
    #[error("channel '{0}' has a port with rate zero")]
    ZeroRate(String),
    #[error("actor '{0}' has a repetition count of zero")]
    ZeroRepetition(String),
    #[error(
        "channel '{channel}' is unbalanced: {produced} tokens produced but {consumed} consumed per iteration"
    )]
    InconsistentRates {
        channel: String,
        produced: u64,
        consumed: u64,
    },
    #[error("buffer encodings '{0}' and '{1}' cannot be mixed in one model")]
    MixedBufferEncodings(String, String),
    #[error("cluster '{cluster}' has no {resource} to host actor '{actor}'")]
    MissingResource {
        cluster: String,
        resource: String,
        actor: String,
    },
    #[error("the assignment does not give a value to '{0}'")]
    MissingValue(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
}
