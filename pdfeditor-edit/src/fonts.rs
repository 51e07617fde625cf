//! Mapping from requested font families onto the PDF standard-14 Type1 fonts.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFamily {
    Helvetica,
    Times,
    Courier,
    Symbol,
    ZapfDingbats,
}

impl StandardFamily {
    /// Unknown family names land on Helvetica, which is also what `Arial` maps to.
    pub fn from_name(name: &str) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "times" | "times new roman" | "times-roman" | "serif" | "georgia" | "cambria"
            | "garamond" | "book antiqua" | "palatino" | "palatino linotype" => {
                StandardFamily::Times
            }
            "courier" | "courier new" | "consolas" | "lucida console" | "mono" | "monospace" => {
                StandardFamily::Courier
            }
            "symbol" => StandardFamily::Symbol,
            "zapfdingbats" | "zapf dingbats" | "dingbats" | "wingdings" => {
                StandardFamily::ZapfDingbats
            }
            _ => StandardFamily::Helvetica,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardFont {
    pub family: StandardFamily,
    pub bold: bool,
    pub italic: bool,
}

impl StandardFont {
    pub fn select(name: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: StandardFamily::from_name(name),
            bold,
            italic,
        }
    }

    pub fn base_name(&self) -> &'static str {
        match (self.family, self.bold, self.italic) {
            (StandardFamily::Helvetica, false, false) => "Helvetica",
            (StandardFamily::Helvetica, true, false) => "Helvetica-Bold",
            (StandardFamily::Helvetica, false, true) => "Helvetica-Oblique",
            (StandardFamily::Helvetica, true, true) => "Helvetica-BoldOblique",
            (StandardFamily::Times, false, false) => "Times-Roman",
            (StandardFamily::Times, true, false) => "Times-Bold",
            (StandardFamily::Times, false, true) => "Times-Italic",
            (StandardFamily::Times, true, true) => "Times-BoldItalic",
            (StandardFamily::Courier, false, false) => "Courier",
            (StandardFamily::Courier, true, false) => "Courier-Bold",
            (StandardFamily::Courier, false, true) => "Courier-Oblique",
            (StandardFamily::Courier, true, true) => "Courier-BoldOblique",
            (StandardFamily::Symbol, _, _) => "Symbol",
            (StandardFamily::ZapfDingbats, _, _) => "ZapfDingbats",
        }
    }

    /// Symbol and ZapfDingbats carry their own built-in encodings.
    pub fn uses_win_ansi(&self) -> bool {
        !matches!(
            self.family,
            StandardFamily::Symbol | StandardFamily::ZapfDingbats
        )
    }

    /// Encodes `text` for a `Tj` operand. Characters the font cannot address become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        text.chars()
            .map(|c| {
                let byte = if self.uses_win_ansi() {
                    win_ansi_byte(c)
                } else {
                    ascii_byte(c)
                };
                byte.unwrap_or(b'?')
            })
            .collect()
    }
}

fn ascii_byte(c: char) -> Option<u8> {
    match c {
        '\t' => Some(b' '),
        ' '..='~' => Some(c as u8),
        _ => None,
    }
}

fn win_ansi_byte(c: char) -> Option<u8> {
    if let Some(byte) = ascii_byte(c) {
        return Some(byte);
    }
    let byte = match c {
        '\u{a0}'..='\u{ff}' => c as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8a,
        '‹' => 0x8b,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9a,
        '›' => 0x9b,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(byte)
}
