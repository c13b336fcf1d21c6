//! Per-macro orchestration: classify, render, record.

use indexmap::IndexMap;
use log::debug;

use crate::classify::{Outcome, classify};
use crate::config::TranslationConfig;
use crate::emit::render;
use crate::facts::{Macro, PreprocessorData};
use crate::stats::{MacroRecord, TranslationStats};

/// The result of one complete translation run: each macro's replacement
/// (or `None` when skipped) plus the accumulated statistics
#[derive(Debug)]
pub struct TranslationRun {
    /// Each classified macro mapped to its replacement text
    pub translations: IndexMap<Macro, Option<String>>,
    /// Statistics for every classification outcome
    pub stats: TranslationStats,
}

/// Walks a preprocessor-data value once and produces a translation per
/// macro, accumulating statistics along the way
pub struct MacroTranslator {
    config: TranslationConfig,
    stats: TranslationStats,
}

impl MacroTranslator {
    /// Create a translator with the given configuration
    #[must_use]
    pub fn new(config: TranslationConfig) -> Self {
        MacroTranslator {
            config,
            stats: TranslationStats::new(),
        }
    }

    /// Classify every macro and render replacements for the accepted ones
    ///
    /// Returns each macro mapped to its replacement text, or `None` when
    /// classification rejected it. Every outcome is recorded in the
    /// statistics accumulator.
    pub fn generate_translations(
        &mut self,
        pd: &PreprocessorData,
    ) -> IndexMap<Macro, Option<String>> {
        let mut translations = IndexMap::new();
        for (m, invocations) in &pd.macros {
            let outcome = classify(m, invocations, pd, self.config.int_size);
            let translation = match outcome {
                Outcome::Translate(target) => {
                    // All invocations share one signature by this point, so
                    // any of them may donate it.
                    let signature = invocations
                        .first()
                        .map(|i| i.type_signature.as_str())
                        .unwrap_or_default();
                    Some(render(m, target, signature))
                }
                Outcome::Reject(reason) => {
                    debug!("skipping {}: {reason}", m.name);
                    None
                }
            };
            self.stats.record(MacroRecord {
                name: m.name.clone(),
                kind: m.kind(),
                outcome,
                body: m.body.clone(),
                translation: translation.clone(),
                invocation_count: invocations.len(),
            });
            translations.insert(m.clone(), translation);
        }
        translations
    }

    /// The statistics accumulated so far
    #[must_use]
    pub fn stats(&self) -> &TranslationStats {
        &self.stats
    }

    /// Consume the translator, yielding its statistics
    #[must_use]
    pub fn into_stats(self) -> TranslationStats {
        self.stats
    }
}
