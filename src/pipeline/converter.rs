//! Converter registry: (input format, output format) → converter classes.
//!
//! Converters are ordinary node classes living in the module registry. This
//! table only records which class can bridge which format pair, in
//! registration order. The first registered candidate wins at wiring time.

use crate::frame::format::{self, FormatId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One registered converter for a format pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConverterEntry {
    #[serde(serialize_with = "serialize_format")]
    pub input: FormatId,
    #[serde(serialize_with = "serialize_format")]
    pub output: FormatId,
    pub class_id: String,
}

fn serialize_format<S: serde::Serializer>(id: &FormatId, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(format::format_name(*id))
}

/// A converter picked for a link, with the formats it will run at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterChoice {
    pub input: FormatId,
    pub output: FormatId,
    pub class_id: String,
}

#[derive(Debug, Default)]
pub struct ConverterRegistry {
    entries: Mutex<BTreeMap<(FormatId, FormatId), Vec<ConverterEntry>>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<(FormatId, FormatId), Vec<ConverterEntry>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that `class_id` converts `input` to `output`.
    ///
    /// Returns `false` if that exact triple is already known.
    pub fn register(&self, input: FormatId, output: FormatId, class_id: impl Into<String>) -> bool {
        let class_id = class_id.into();
        let mut entries = self.entries();
        let list = entries.entry((input, output)).or_default();
        if list.iter().any(|e| e.class_id == class_id) {
            return false;
        }
        tracing::debug!(
            "Registered converter '{}' {} -> {}",
            class_id,
            format::format_name(input),
            format::format_name(output)
        );
        list.push(ConverterEntry {
            input,
            output,
            class_id,
        });
        true
    }

    pub fn is_converter_registered(&self, input: FormatId, output: FormatId) -> bool {
        self.entries()
            .get(&(input, output))
            .is_some_and(|l| !l.is_empty())
    }

    /// Converters for a pair in registration order. Empty when none.
    pub fn get_converters(&self, input: FormatId, output: FormatId) -> Vec<ConverterEntry> {
        self.entries()
            .get(&(input, output))
            .cloned()
            .unwrap_or_default()
    }

    /// Full table, for diagnostics.
    pub fn get_all_converters(&self) -> BTreeMap<(FormatId, FormatId), Vec<ConverterEntry>> {
        self.entries().clone()
    }

    pub fn len(&self) -> usize {
        self.entries().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First converter bridging any producer format to any consumer format.
    ///
    /// Producer formats are tried in order, and for each of them the consumer
    /// formats in order. The first pair with a registered converter decides,
    /// and its first-registered entry is chosen.
    pub fn find_converter(
        &self,
        producer: &[FormatId],
        consumer: &[FormatId],
    ) -> Option<ConverterChoice> {
        let entries = self.entries();
        producer.iter().find_map(|&input| {
            consumer.iter().find_map(|&output| {
                entries
                    .get(&(input, output))
                    .and_then(|l| l.first())
                    .map(|e| ConverterChoice {
                        input,
                        output,
                        class_id: e.class_id.clone(),
                    })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::format::{BGR24, RGB24, Y8, YUV420P};

    #[test]
    fn test_lookup_preserves_registration_order() {
        let reg = ConverterRegistry::new();
        assert!(reg.register(RGB24, Y8, "first"));
        assert!(reg.register(RGB24, Y8, "second"));
        assert!(!reg.register(RGB24, Y8, "first"));

        let list = reg.get_converters(RGB24, Y8);
        let ids: Vec<_> = list.iter().map(|e| e.class_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert!(reg.is_converter_registered(RGB24, Y8));
    }

    #[test]
    fn test_unregistered_pair_is_empty() {
        let reg = ConverterRegistry::new();
        assert!(reg.get_converters(Y8, RGB24).is_empty());
        assert!(!reg.is_converter_registered(Y8, RGB24));
        assert!(reg.find_converter(&[Y8], &[RGB24]).is_none());
    }

    #[test]
    fn test_find_converter_order() {
        let reg = ConverterRegistry::new();
        reg.register(RGB24, YUV420P, "to_yuv");
        reg.register(RGB24, Y8, "to_y8");
        reg.register(BGR24, Y8, "bgr_to_y8");

        // Consumer order decides within one producer format.
        let choice = reg.find_converter(&[RGB24], &[Y8, YUV420P]).unwrap();
        assert_eq!(choice.class_id, "to_y8");
        assert_eq!(choice.output, Y8);

        // Producer order decides first.
        let choice = reg.find_converter(&[BGR24, RGB24], &[YUV420P, Y8]).unwrap();
        assert_eq!(choice.class_id, "bgr_to_y8");
        assert_eq!(choice.input, BGR24);
    }

    #[test]
    fn test_all_converters_listing() {
        let reg = ConverterRegistry::new();
        reg.register(RGB24, BGR24, "rgb_swap");
        reg.register(BGR24, RGB24, "rgb_swap");
        let all = reg.get_all_converters();
        assert_eq!(all.len(), 2);
        assert_eq!(reg.len(), 2);
    }
}
