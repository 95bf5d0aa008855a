use crate::HtpStatus;

/// Convenience alias used throughout the parser: almost every fallible
/// operation here fails with an [`HtpStatus`] rather than a rich error type,
/// since the status doubles as a control-flow signal for the state machine.
pub type Result<T> = std::result::Result<T, HtpStatus>;

/// I/O only comes up when buffering raw chunk data or writing a PUT body
/// to a tempfile; neither has a recovery path worth distinguishing from any
/// other fatal parse error.
impl From<std::io::Error> for HtpStatus {
    fn from(_: std::io::Error) -> Self {
        HtpStatus::ERROR
    }
}
