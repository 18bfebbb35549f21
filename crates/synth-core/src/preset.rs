//! Plain-text `key = value` presets, one setting per line, `#` for
//! comments. Deliberately not a serde format: presets are small, hand
//! editable, and the engine only ever needs to read/write its own flat
//! parameter set.

use crate::error::{SynthError, SynthResult};
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Default)]
pub struct Preset {
    values: BTreeMap<String, String>,
}

impl Preset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get_str<'a>(&'a self, key: &str) -> SynthResult<&'a str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SynthError::UnknownPresetKey(key.to_string()))
    }

    pub fn get_f32(&self, key: &str) -> SynthResult<f32> {
        let raw = self.get_str(key)?;
        raw.parse::<f32>()
            .map_err(|_| SynthError::InvalidPresetValue { key: key.to_string(), value: raw.to_string() })
    }

    pub fn get_u8(&self, key: &str) -> SynthResult<u8> {
        let raw = self.get_str(key)?;
        raw.parse::<u8>()
            .map_err(|_| SynthError::InvalidPresetValue { key: key.to_string(), value: raw.to_string() })
    }

    pub fn get_bool(&self, key: &str) -> SynthResult<bool> {
        let raw = self.get_str(key)?;
        match raw {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(SynthError::InvalidPresetValue { key: key.to_string(), value: raw.to_string() }),
        }
    }

    /// Parse `key = value` lines; blank lines and `#`-prefixed comments
    /// are skipped. Malformed lines (no `=`) are skipped rather than
    /// rejected outright — presets are hand-edited and a stray typo
    /// shouldn't lose the rest of a saved session.
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { values }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            let _ = writeln!(out, "{key} = {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_serialize_and_parse() {
        let mut preset = Preset::new();
        preset.set("voice.attack_sec", 0.02);
        preset.set("filter.cutoff_hz", 1200.0);
        preset.set("effects.reverb_enabled", true);

        let parsed = Preset::parse(&preset.serialize());
        assert_eq!(parsed.get_f32("voice.attack_sec").unwrap(), 0.02);
        assert_eq!(parsed.get_f32("filter.cutoff_hz").unwrap(), 1200.0);
        assert!(parsed.get_bool("effects.reverb_enabled").unwrap());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let preset = Preset::parse("# a comment\n\nfilter.cutoff_hz = 500\n");
        assert_eq!(preset.get_f32("filter.cutoff_hz").unwrap(), 500.0);
    }

    #[test]
    fn missing_key_is_an_error() {
        let preset = Preset::new();
        assert_eq!(
            preset.get_f32("nonexistent"),
            Err(SynthError::UnknownPresetKey("nonexistent".to_string()))
        );
    }

    #[test]
    fn malformed_numeric_value_is_an_error() {
        let preset = Preset::parse("filter.cutoff_hz = not-a-number\n");
        assert!(matches!(
            preset.get_f32("filter.cutoff_hz"),
            Err(SynthError::InvalidPresetValue { .. })
        ));
    }

    #[test]
    fn malformed_line_without_equals_is_skipped() {
        let preset = Preset::parse("this line has no equals sign\nvalid = 1\n");
        assert_eq!(preset.get_f32("valid").unwrap(), 1.0);
    }
}
