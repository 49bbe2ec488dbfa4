use streamtap_capture::CaptureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnifferError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
}
