#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Free-format MPEG audio is not supported (bitrate_index = 0)")]
    MpegFreeFormat,

    #[error("Reserved MPEG audio field: {field} = {value:#X}")]
    MpegReserved { field: &'static str, value: u8 },

    #[error("Reserved AC-3 fscod. Read {0:#X}")]
    Ac3ReservedSampleRate(u8),

    #[error("AC-3 frmsizecod must be <= 37. Read {0}")]
    Ac3InvalidFrameSizeCode(u8),

    #[error("Unsupported bsid {0}, expected <= 16")]
    UnsupportedBsid(u8),

    #[error("Reserved E-AC-3 strmtyp. Read {0}")]
    Eac3ReservedStreamType(u8),

    #[error("Reserved E-AC-3 fscod2. Read {0:#X}")]
    Eac3ReservedSampleRate(u8),

    #[error("Reserved ADTS sampling_frequency_index. Read {0:#X}")]
    AdtsReservedSampleRate(u8),

    #[error("ADTS frame_length {length} shorter than its {header}-byte header")]
    AdtsFrameTooShort { length: usize, header: usize },

    #[error("Frame of {size} bytes can never fit a {capacity}-byte buffer")]
    FrameExceedsCapacity { size: usize, capacity: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum DriveError {
    #[error("Decoder rejected {codec} frame of {size} bytes: {reason}")]
    DecodeFailed {
        codec: crate::structs::codec::Codec,
        size: usize,
        reason: String,
    },

    #[error("Output of {size} bytes exceeds largest obtainable buffer ({max} bytes)")]
    OutputTooLarge { size: usize, max: usize },

    #[error("Output pipeline rejected setup {0}")]
    SetupRejected(String),

    #[error("Output buffer request failed: {0}")]
    BufferRequestFailed(String),

    #[error("Output buffer submission failed: {0}")]
    SubmitFailed(String),
}
