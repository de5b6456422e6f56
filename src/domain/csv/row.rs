// ============================================================
// ROW REPAIR AND NORMALIZATION
// ============================================================
// Fit a parsed record to the header arity and map blanks to NULL

/// One insertable value per column; `None` is SQL NULL.
pub type RowValues = Vec<Option<String>>;

/// How a record's field count compared to the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    Exact,
    /// Fewer fields than columns; missing trailing values were filled with NULL
    Padded { observed: usize },
    /// More fields than columns; the extra trailing fields were dropped
    Truncated { observed: usize },
}

impl RowShape {
    pub fn is_divergent(&self) -> bool {
        !matches!(self, RowShape::Exact)
    }

    /// A blank source line, read as a record with no fields.
    pub fn is_blank(&self) -> bool {
        matches!(self, RowShape::Padded { observed: 0 })
    }

    pub fn observed(&self, arity: usize) -> usize {
        match self {
            RowShape::Exact => arity,
            RowShape::Padded { observed } | RowShape::Truncated { observed } => *observed,
        }
    }
}

/// A record conformed to the header arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    pub values: RowValues,
    pub shape: RowShape,
}

impl NormalizedRow {
    /// Truncate or pad `fields` to `arity`, trim each value and turn
    /// empty-after-trim values into `None`.
    pub fn conform<'a, I>(fields: I, arity: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = Vec::with_capacity(arity);
        let mut observed = 0usize;

        for field in fields {
            if observed < arity {
                values.push(normalize_value(field));
            }
            observed += 1;
        }
        values.resize(arity, None);

        let shape = if observed == arity {
            RowShape::Exact
        } else if observed < arity {
            RowShape::Padded { observed }
        } else {
            RowShape::Truncated { observed }
        };

        Self { values, shape }
    }

    /// All-NULL row standing in for a blank line.
    pub fn blank(arity: usize) -> Self {
        Self::conform(std::iter::empty::<&str>(), arity)
    }
}

fn normalize_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
