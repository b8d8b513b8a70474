pub type Result<T> = std::result::Result<T, ParseError>;

/// Why a MIDI file could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed MIDI file: {0}")]
    Malformed(#[from] midly::Error),

    #[error("Unsupported SMPTE timing ({fps} fps, {subframes} ticks per frame)")]
    UnsupportedTiming { fps: f32, subframes: u8 },

    #[error("MIDI header declares zero ticks per quarter note")]
    InvalidPpq,
}
