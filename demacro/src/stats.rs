//! Statistics accumulation and the CSV report.

use std::fmt;
use std::io;

use indexmap::IndexMap;

use crate::classify::{Outcome, RejectReason, TranslationTarget};
use crate::error::TranslateError;
use crate::facts::MacroKind;

/// Everything recorded about one classified macro
#[derive(Clone, Debug)]
pub struct MacroRecord {
    /// Macro name
    pub name: String,
    /// Object-like or function-like
    pub kind: MacroKind,
    /// The classification outcome
    pub outcome: Outcome,
    /// The macro's body text
    pub body: String,
    /// The rendered replacement, when the outcome is a translation
    pub translation: Option<String>,
    /// Number of unique invocations considered
    pub invocation_count: usize,
}

/// Accumulates one record per classified macro and derives totals,
/// per-kind breakdowns, and the CSV report
#[derive(Debug, Default)]
pub struct TranslationStats {
    records: Vec<MacroRecord>,
}

impl TranslationStats {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one classified macro
    pub fn record(&mut self, record: MacroRecord) {
        self.records.push(record);
    }

    /// All records, in classification order
    #[must_use]
    pub fn records(&self) -> &[MacroRecord] {
        &self.records
    }

    /// Number of macros classified
    #[must_use]
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Number of macros with a translation
    #[must_use]
    pub fn translated(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.is_translation())
            .count()
    }

    /// Number of skipped macros
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.total() - self.translated()
    }

    /// Number of macros of the given kind with the given outcome
    #[must_use]
    pub fn count(&self, kind: MacroKind, outcome: &Outcome) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == kind && r.outcome == *outcome)
            .count()
    }

    fn count_target(&self, kind: MacroKind, target: TranslationTarget) -> usize {
        self.count(kind, &Outcome::Translate(target))
    }

    fn translated_of(&self, kind: MacroKind) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == kind && r.outcome.is_translation())
            .count()
    }

    fn skipped_of(&self, kind: MacroKind) -> usize {
        self.records
            .iter()
            .filter(|r| r.kind == kind && !r.outcome.is_translation())
            .count()
    }

    /// Skip counts per rejection reason for one macro kind, in first-seen
    /// order
    #[must_use]
    pub fn skip_breakdown(&self, kind: MacroKind) -> IndexMap<RejectReason, usize> {
        let mut counts = IndexMap::new();
        for record in &self.records {
            if record.kind != kind {
                continue;
            }
            if let Outcome::Reject(reason) = record.outcome {
                *counts.entry(reason).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Write the CSV report: one row per macro
    ///
    /// # Errors
    /// Returns [`TranslateError::CsvReport`] when the writer fails.
    pub fn write_csv<W: io::Write>(
        &self,
        writer: W,
        program_name: &str,
    ) -> Result<(), TranslateError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "Program Name",
            "Macro",
            "Macro Type",
            "Action",
            "Translation or Macro Body",
            "Action Type",
            "Invocation Amount",
        ])?;
        for record in &self.records {
            let action = if record.outcome.is_translation() {
                "Translated"
            } else {
                "Skipped"
            };
            let text = record.translation.as_deref().unwrap_or(&record.body);
            let kind = record.kind.to_string();
            let tag = record.outcome.tag();
            let invocations = record.invocation_count.to_string();
            csv.write_record([
                program_name,
                record.name.as_str(),
                kind.as_str(),
                action,
                text,
                tag.as_str(),
                invocations.as_str(),
            ])?;
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    fn fmt_kind(&self, f: &mut fmt::Formatter<'_>, kind: MacroKind) -> fmt::Result {
        writeln!(f, "{kind} stats:")?;
        writeln!(f, "  - Total translated: {}", self.translated_of(kind))?;
        match kind {
            MacroKind::ObjectLike => {
                writeln!(
                    f,
                    "    - Translated to enum: {}",
                    self.count_target(kind, TranslationTarget::Enum)
                )?;
                writeln!(
                    f,
                    "    - Translated to static const: {}",
                    self.count_target(kind, TranslationTarget::GlobalVariable)
                )?;
            }
            MacroKind::FunctionLike => {
                writeln!(
                    f,
                    "    - Translated to void: {}",
                    self.count_target(kind, TranslationTarget::VoidFunction)
                )?;
                writeln!(
                    f,
                    "    - Translated to non-void: {}",
                    self.count_target(kind, TranslationTarget::NonVoidFunction)
                )?;
            }
        }
        writeln!(f, "  - Total skipped: {}", self.skipped_of(kind))?;
        for (reason, count) in self.skip_breakdown(kind) {
            let note = if reason.is_technical_limitation() {
                " (analyzer limitation)"
            } else {
                ""
            };
            writeln!(f, "    - {reason}{note}: {count}")?;
        }
        Ok(())
    }
}

impl fmt::Display for TranslationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total translated: {}", self.translated())?;
        writeln!(f, "Total skipped: {}", self.skipped())?;
        self.fmt_kind(f, MacroKind::ObjectLike)?;
        self.fmt_kind(f, MacroKind::FunctionLike)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(
        name: &str,
        kind: MacroKind,
        outcome: Outcome,
        translation: Option<&str>,
    ) -> MacroRecord {
        MacroRecord {
            name: name.to_string(),
            kind,
            outcome,
            body: "1".to_string(),
            translation: translation.map(str::to_string),
            invocation_count: 1,
        }
    }

    fn sample() -> TranslationStats {
        let mut stats = TranslationStats::new();
        stats.record(record(
            "MAX_N",
            MacroKind::ObjectLike,
            Outcome::Translate(TranslationTarget::Enum),
            Some("enum { MAX_N = 1 };"),
        ));
        stats.record(record(
            "STRINGIFY",
            MacroKind::ObjectLike,
            Outcome::Reject(RejectReason::UseMetaprogramming),
            None,
        ));
        stats.record(record(
            "SQR",
            MacroKind::FunctionLike,
            Outcome::Translate(TranslationTarget::NonVoidFunction),
            Some("static inline int SQR(int x) { return 1; }"),
        ));
        stats
    }

    #[test]
    fn translated_plus_skipped_equals_total() {
        let stats = sample();
        assert_eq!(stats.translated() + stats.skipped(), stats.total());
    }

    #[test]
    fn counts_are_keyed_by_kind_and_outcome() {
        let stats = sample();
        assert_eq!(
            stats.count(
                MacroKind::ObjectLike,
                &Outcome::Translate(TranslationTarget::Enum)
            ),
            1
        );
        assert_eq!(
            stats.count(
                MacroKind::FunctionLike,
                &Outcome::Translate(TranslationTarget::Enum)
            ),
            0
        );
        assert_eq!(
            stats.skip_breakdown(MacroKind::ObjectLike)[&RejectReason::UseMetaprogramming],
            1
        );
    }

    #[test]
    fn csv_has_one_row_per_macro_with_the_documented_header() {
        let stats = sample();
        let mut out = Vec::new();
        stats.write_csv(&mut out, "demo").unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Program Name,Macro,Macro Type,Action,Translation or Macro Body,Action Type,Invocation Amount"
        );
        assert_eq!(text.lines().count(), 1 + stats.total());
        assert!(text.contains("demo,MAX_N,Object-like,Translated,enum { MAX_N = 1 };,Enum,1"));
        assert!(text.contains("demo,STRINGIFY,Object-like,Skipped,1,UseMetaprogramming,1"));
    }

    #[test]
    fn display_breaks_down_by_kind() {
        let stats = sample();
        let text = stats.to_string();
        assert!(text.contains("Total translated: 2"));
        assert!(text.contains("Object-like stats:"));
        assert!(text.contains("    - Translated to enum: 1"));
        assert!(text.contains("Function-like stats:"));
        assert!(text.contains("    - Translated to non-void: 1"));
        assert!(text.contains("    - UseMetaprogramming: 1"));
    }
}
