/// Coarse error categories, used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    GeneralError,
    ValidationError,
    DependencyError,
    CircularDependency,
    SpawnError,
    JobFailed,
    InternalError,
}

impl ErrorCode {
    /// Process exit code reported by the CLI for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::GeneralError => 1,
            Self::ValidationError | Self::DependencyError | Self::CircularDependency => 11,
            Self::SpawnError => 20,
            Self::JobFailed => 30,
            Self::InternalError => 50,
        }
    }
}
