use serde::{Deserialize, Serialize};
use std::fmt;

/// Field delimiter of a CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
}

impl Delimiter {
    /// Pick the delimiter for one line: `;` only when it strictly outnumbers `,`.
    pub fn from_line(line: &str) -> Self {
        let commas = line.matches(',').count();
        let semicolons = line.matches(';').count();

        if semicolons > commas {
            Delimiter::Semicolon
        } else {
            Delimiter::Comma
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
        }
    }

    pub fn as_char(&self) -> char {
        self.as_byte() as char
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_line_prefers_semicolon_only_when_more_frequent() {
        assert_eq!(Delimiter::from_line("1;Alice"), Delimiter::Semicolon);
        assert_eq!(Delimiter::from_line("id,name"), Delimiter::Comma);
        assert_eq!(Delimiter::from_line("a;b,c"), Delimiter::Comma);
        assert_eq!(Delimiter::from_line("plain"), Delimiter::Comma);
        assert_eq!(Delimiter::from_line("a,b;c;d"), Delimiter::Semicolon);
    }
}
