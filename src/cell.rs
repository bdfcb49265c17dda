// Cell capability shared by every editable widget of a record table.

use serde::{Deserialize, Serialize};

/// Read/write access to the text of a widget plus its numeric reading.
pub trait Cell {
    fn get(&self) -> &str;

    fn set(&mut self, text: &str);

    /// Value as f64; blank or non-numeric text reads as `NaN`.
    fn number(&self) -> f64 {
        parse_number(self.get())
    }

    fn is_numeric(&self) -> bool {
        self.number().is_finite()
    }
}

/// Strict float parsing: surrounding whitespace is ignored, anything else
/// that is not a finite decimal number yields `NaN`.
pub fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return f64::NAN;
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => f64::NAN,
    }
}

/// Render a computed value back into cell text.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == 0.0 {
        // avoids "-0"
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

/// A value input. Text is stored exactly as entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputCell {
    raw: String,
}

impl InputCell {
    pub fn new(text: impl Into<String>) -> Self {
        InputCell { raw: text.into() }
    }
}

impl Default for InputCell {
    fn default() -> Self {
        InputCell::new("0")
    }
}

impl Cell for InputCell {
    fn get(&self) -> &str {
        &self.raw
    }

    fn set(&mut self, text: &str) {
        self.raw = text.to_string();
    }
}

/// A header label. Text is trimmed when set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextCell {
    text: String,
}

impl TextCell {
    pub fn new(text: &str) -> Self {
        TextCell {
            text: text.trim().to_string(),
        }
    }
}

impl Cell for TextCell {
    fn get(&self) -> &str {
        &self.text
    }

    fn set(&mut self, text: &str) {
        self.text = text.trim().to_string();
    }
}
