//! Column metadata and string widening rules shared by every dialect

/// Size assumed for strings declared without a length
pub const DEFAULT_STRING_SIZE: u32 = 255;

/// A column as reported by the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Declared type, e.g. `character varying` or `INTEGER`
    pub dtype: String,
    /// Declared character length, if any
    pub char_size: Option<u32>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: impl Into<String>, char_size: Option<u32>) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into(),
            char_size,
        }
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.name)
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self.dtype.to_lowercase().as_str(),
            "text" | "character varying" | "varchar"
        )
    }

    /// Character length, 255 for `text` or an unspecified size
    pub fn string_size(&self) -> u32 {
        if self.dtype.eq_ignore_ascii_case("text") {
            return DEFAULT_STRING_SIZE;
        }
        self.char_size.unwrap_or(DEFAULT_STRING_SIZE)
    }

    /// Whether `self` can be widened to hold `other`'s values
    pub fn can_expand_to(&self, other: &Column) -> bool {
        self.is_string() && other.is_string() && other.string_size() > self.string_size()
    }

    /// Type used when declaring this column elsewhere
    pub fn data_type(&self) -> String {
        if self.is_string() {
            string_type(self.string_size())
        } else {
            self.dtype.clone()
        }
    }
}

pub fn string_type(size: u32) -> String {
    format!("character varying({})", size)
}

#[cfg(test)]
#[path = "column_test.rs"]
mod tests;
