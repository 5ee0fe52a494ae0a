use super::Weight;

/// PDF base-14 faces used when no TrueType font can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFont {
    Helvetica,
    HelveticaBold,
}

impl BuiltinFont {
    pub fn for_weight(weight: Weight) -> Self {
        match weight {
            Weight::Bold => BuiltinFont::HelveticaBold,
            Weight::Regular => BuiltinFont::Helvetica,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::HelveticaBold => "Helvetica-Bold",
        }
    }

    pub(crate) fn to_printpdf(self) -> printpdf::BuiltinFont {
        match self {
            BuiltinFont::Helvetica => printpdf::BuiltinFont::Helvetica,
            BuiltinFont::HelveticaBold => printpdf::BuiltinFont::HelveticaBold,
        }
    }

    /// Advance width in points, from the standard AFM metrics (1000 units per em).
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let table = match self {
            BuiltinFont::Helvetica => &HELVETICA_WIDTHS,
            BuiltinFont::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        let units: u32 = text
            .chars()
            .filter(|ch| *ch != '\n')
            .map(|ch| {
                let code = ch as u32;
                if (0x20..=0x7e).contains(&code) {
                    table[(code - 0x20) as usize] as u32
                } else {
                    DEFAULT_WIDTH as u32
                }
            })
            .sum();
        units as f32 * size / 1000.0
    }
}

const DEFAULT_WIDTH: u16 = 556;

// Printable ASCII, 0x20 through 0x7e, under WinAnsiEncoding (what printpdf sets
// for base fonts), so 0x27 is quotesingle and 0x60 is grave.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' - '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0' - '9'
    278, 278, 584, 584, 584, 556, 1015, // ':' - '@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A' - 'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N' - 'Z'
    278, 278, 278, 469, 556, 333, // '[' - '`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a' - 'm'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n' - 'z'
    334, 260, 334, 584, // '{' - '~'
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' ' - '/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0' - '9'
    333, 333, 584, 584, 584, 611, 975, // ':' - '@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // 'A' - 'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N' - 'Z'
    333, 278, 333, 584, 556, 333, // '[' - '`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // 'a' - 'm'
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // 'n' - 'z'
    389, 280, 389, 584, // '{' - '~'
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_with_afm_widths() {
        // H e l v = 722 + 556 + 222 + 500
        let width = BuiltinFont::Helvetica.text_width("Helv", 10.0);
        assert!((width - 20.0).abs() < 1e-4);
    }

    #[test]
    fn bold_is_wider_than_regular() {
        let text = "Test Line 1";
        let regular = BuiltinFont::Helvetica.text_width(text, 12.0);
        let bold = BuiltinFont::HelveticaBold.text_width(text, 12.0);
        assert!(bold > regular);
    }

    #[test]
    fn non_ascii_uses_default_width() {
        let width = BuiltinFont::Helvetica.text_width("é", 1000.0);
        assert_eq!(width, DEFAULT_WIDTH as f32);
    }
}
