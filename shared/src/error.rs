use thiserror::Error;

/// Errors raised while parsing configuration values shared by both binaries
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid transform '{0}', expected x,y or x,y,yaw")]
    Transform(String),

    #[error("unknown pawn kind '{0}'")]
    PawnKind(String),

    #[error("invalid prop '{0}', expected kind@x,y")]
    Prop(String),
}
