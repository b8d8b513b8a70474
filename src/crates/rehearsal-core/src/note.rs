const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Convert a MIDI note number to the name instruments expect (e.g. "C4", "G#5")
pub fn note_name(midi_note: u8) -> String {
    let name = NOTE_NAMES[(midi_note % 12) as usize];
    let octave = (midi_note / 12) as i32 - 1;

    format!("{}{}", name, octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4"); // Middle C
        assert_eq!(note_name(69), "A4"); // A440
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }
}
