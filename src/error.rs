#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not found")]
    RoomNotFound,
    #[error("room is full")]
    RoomFull,
    #[error("game already in progress")]
    GameInProgress,
    #[error("already in a room")]
    AlreadyInRoom,
    #[error("too many rooms")]
    TooManyRooms,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max rooms must be at least 1")]
    InvalidMaxRooms,
    #[error("default duration must be between {min} and {max} minutes, got {got}")]
    InvalidDuration { got: u64, min: u64, max: u64 },
    #[error("static dir {0} does not exist")]
    MissingStaticDir(String),
}
