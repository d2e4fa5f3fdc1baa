/// Outbound line terminator expected by the device.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Turns raw line bytes from the port into a clean, printable text line.
pub struct FrameDecoder;

impl FrameDecoder {
    /// Decode one received chunk.
    ///
    /// Invalid UTF-8 sequences are dropped, surrounding whitespace and line
    /// terminators are trimmed, and any remaining non-printable characters are
    /// removed rather than escaped.
    pub fn decode(raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        text.trim()
            .chars()
            .filter(|&c| c != char::REPLACEMENT_CHARACTER && is_printable(c))
            .collect()
    }

    /// Frame an outbound command with the protocol terminator.
    pub fn encode_line(text: &str) -> Vec<u8> {
        let mut line = String::with_capacity(text.len() + LINE_TERMINATOR.len());
        line.push_str(text);
        line.push_str(LINE_TERMINATOR);
        line.into_bytes()
    }
}

/// Format (Cf) code points, such as BOM and zero-width space. `char::is_control`
/// does not cover them.
const FORMAT_CHARS: &[(char, char)] = &[
    ('\u{00AD}', '\u{00AD}'),
    ('\u{0600}', '\u{0605}'),
    ('\u{061C}', '\u{061C}'),
    ('\u{06DD}', '\u{06DD}'),
    ('\u{070F}', '\u{070F}'),
    ('\u{0890}', '\u{0891}'),
    ('\u{08E2}', '\u{08E2}'),
    ('\u{180E}', '\u{180E}'),
    ('\u{200B}', '\u{200F}'),
    ('\u{202A}', '\u{202E}'),
    ('\u{2060}', '\u{2064}'),
    ('\u{2066}', '\u{206F}'),
    ('\u{FEFF}', '\u{FEFF}'),
    ('\u{FFF9}', '\u{FFFB}'),
    ('\u{110BD}', '\u{110BD}'),
    ('\u{110CD}', '\u{110CD}'),
    ('\u{13430}', '\u{1343F}'),
    ('\u{1BCA0}', '\u{1BCA3}'),
    ('\u{1D173}', '\u{1D17A}'),
    ('\u{E0001}', '\u{E0001}'),
    ('\u{E0020}', '\u{E007F}'),
];

fn is_format(c: char) -> bool {
    FORMAT_CHARS.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

fn is_private_use(c: char) -> bool {
    matches!(c, '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}')
}

fn is_printable(c: char) -> bool {
    c == ' ' || !(c.is_control() || c.is_whitespace() || is_format(c) || is_private_use(c))
}
