//! Source text of numeric literals
//!
//! `serde_yaml::Value` keeps numbers as numbers, so `PYTHON_VERSION: 3.10`
//! parses as the float `3.1`. Steps receive environment values and plugin
//! settings as text, so those literals are read a second time from the
//! source. A number that would print differently from how it was written
//! is kept as the string it was written as.

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fmt;

/// Keys whose values reach the step as text
const VERBATIM_KEYS: &[&str] = &["environment", "settings"];

/// Re-read one YAML document, guided by its already parsed `value`
///
/// `source` must deserialize the same document `value` was parsed from.
pub fn keep_literal_text<'de, D>(source: D, value: &Value) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Guided {
        shape: value,
        verbatim: false,
    }
    .deserialize(source)
}

#[derive(Clone, Copy)]
struct Guided<'a> {
    /// The same node as parsed by the first pass
    shape: &'a Value,

    /// Inside an `environment` or `settings` mapping
    verbatim: bool,
}

impl<'de, 'a> DeserializeSeed<'de> for Guided<'a> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        match self.shape {
            Value::Number(number) if self.verbatim => {
                let text = String::deserialize(deserializer)?;
                if text == number.to_string() {
                    Ok(Value::Number(number.clone()))
                } else {
                    Ok(Value::String(text))
                }
            }
            Value::Mapping(_) => deserializer.deserialize_map(self),
            Value::Sequence(_) => deserializer.deserialize_seq(self),
            other => {
                IgnoredAny::deserialize(deserializer)?;
                Ok(other.clone())
            }
        }
    }
}

impl<'de, 'a> Visitor<'de> for Guided<'a> {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("the same document as the first pass")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut mapping = Mapping::new();

        while let Some(key) = map.next_key::<Value>()? {
            let Some(shape) = self.shape.get(&key) else {
                return Err(de::Error::custom(format!("unexpected key {:?}", key)));
            };
            let verbatim = self.verbatim
                || key
                    .as_str()
                    .is_some_and(|key| VERBATIM_KEYS.contains(&key));

            let value = map.next_value_seed(Guided { shape, verbatim })?;
            mapping.insert(key, value);
        }

        Ok(Value::Mapping(mapping))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let items = self.shape.as_sequence().map(Vec::as_slice).unwrap_or_default();
        let mut sequence = Vec::with_capacity(items.len());

        for shape in items {
            let seed = Guided {
                shape,
                verbatim: self.verbatim,
            };
            match seq.next_element_seed(seed)? {
                Some(value) => sequence.push(value),
                None => return Err(de::Error::invalid_length(sequence.len(), &self)),
            }
        }

        Ok(Value::Sequence(sequence))
    }
}
