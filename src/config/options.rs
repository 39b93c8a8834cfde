//! Runtime options database.
//!
//! Options are `-key value` token pairs (a key followed by another key is a
//! flag). Components read their settings through prefixed lookups, e.g.
//! `-ksp_rtol 1e-8`, `-pc_factor_levels 2`, `-sub_ksp_type preonly`.

use std::collections::HashMap;

use crate::error::Error;

#[derive(Debug, Default, Clone)]
pub struct OptionsDb {
    entries: HashMap<String, String>,
}

impl OptionsDb {
    pub fn new() -> Self {
        OptionsDb::default()
    }

    /// Parse command-line style tokens. Tokens not starting with `-` bind
    /// as the value of the preceding key; a key without a value is a flag
    /// with the empty string as value.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut db = OptionsDb::new();
        let mut pending: Option<String> = None;
        for tok in args {
            let tok = tok.as_ref();
            if let Some(key) = tok.strip_prefix('-') {
                // Negative numbers are values, not keys.
                if key.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                    if let Some(k) = pending.take() {
                        db.entries.insert(k, tok.to_string());
                    }
                    continue;
                }
                if let Some(k) = pending.take() {
                    db.entries.insert(k, String::new());
                }
                pending = Some(key.to_string());
            } else if let Some(k) = pending.take() {
                db.entries.insert(k, tok.to_string());
            }
        }
        if let Some(k) = pending {
            db.entries.insert(k, String::new());
        }
        db
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.trim_start_matches('-').to_string(), value.to_string());
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, Error> {
        self.parse_with(key, str::parse::<f64>)
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, Error> {
        self.parse_with(key, str::parse::<usize>)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, Error> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(v) if v.is_empty() || v == "true" || v == "1" || v == "yes" => Ok(Some(true)),
            Some(v) if v == "false" || v == "0" || v == "no" => Ok(Some(false)),
            Some(v) => Err(Error::NumericalError(format!(
                "option -{key} expects a boolean, got '{v}'"
            ))),
        }
    }

    fn parse_with<T, E>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Result<T, E>,
    ) -> Result<Option<T>, Error> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(v) => parse(v).map(Some).map_err(|_| {
                Error::NumericalError(format!("option -{key} has unparsable value '{v}'"))
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
