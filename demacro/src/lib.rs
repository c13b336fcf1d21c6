#![recursion_limit = "256"]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Macro-to-C Translation Library
//!
//! This library decides, for each C preprocessor macro in a program,
//! whether a behavior-preserving C-level replacement exists, selects its
//! kind, renders the replacement text, and rewrites copies of the source
//! files with the replacement overlaid on the original `#define` lines.
//! The evidence comes from a Clang-based analyzer that records facts about
//! every macro definition and invocation per translation unit.
//!
//! ## Features
//!
//! - Classification of object-like and function-like macros into four
//!   translation targets: void function, non-void function, global
//!   variable, enumerator
//! - Enumerated, statistics-friendly rejection reasons for everything that
//!   cannot be translated
//! - Ingestion of the analyzer's JSON record stream with one-definition
//!   enforcement and invocation deduplication
//! - Source overlay output with optional read-only marking
//! - Fan-out of the analyzer over `compile_commands.json` with caching
//!
//! ## Example
//!
//! ```rust,no_run
//! use demacro::{IntSize, TranslationConfig};
//!
//! let config = TranslationConfig::new().with_int_size(IntSize::Int32);
//! let run = demacro::translate_analysis_file("analysis.maki", &config).unwrap();
//! for (m, translation) in &run.translations {
//!     match translation {
//!         Some(text) => println!("{} -> {text}", m.name),
//!         None => println!("{} skipped", m.name),
//!     }
//! }
//! println!("{}", run.stats);
//! ```

mod classify;
mod config;
mod driver;
mod emit;
mod error;
mod facts;
mod ingest;
mod overlay;
mod stats;
mod translator;

pub use classify::{Outcome, RejectReason, TranslationTarget, classify};
pub use config::{IntSize, TranslationConfig};
pub use driver::{AnalyzerDriver, CompileCommand, collect_analysis, find_analysis_files};
pub use emit::render;
pub use error::TranslateError;
pub use facts::{AstKind, Invocation, Macro, MacroKind, PreprocessorData, SourceLocation};
pub use ingest::{AnalyzerRecord, build_preprocessor_data, parse_records};
pub use overlay::apply_translations;
pub use stats::{MacroRecord, TranslationStats};
pub use translator::{MacroTranslator, TranslationRun};

use std::fs;
use std::path::Path;

/// Translate every macro described by a record stream
///
/// Ingests the records into preprocessor data narrowed to top-level
/// non-argument source invocations, classifies each macro, and renders
/// replacements for the accepted ones.
#[must_use]
pub fn translate_records(records: &[AnalyzerRecord], config: &TranslationConfig) -> TranslationRun {
    let pd = build_preprocessor_data(records, &config.source_prefix);
    let mut translator = MacroTranslator::new(config.clone());
    let translations = translator.generate_translations(&pd);
    TranslationRun {
        translations,
        stats: translator.into_stats(),
    }
}

/// Translate every macro described by one analysis file
///
/// # Errors
/// Returns `TranslateError` if the file cannot be read or contains a
/// malformed record.
pub fn translate_analysis_file<P: AsRef<Path>>(
    path: P,
    config: &TranslationConfig,
) -> Result<TranslationRun, TranslateError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| TranslateError::io(path.to_path_buf(), e))?;
    let records = parse_records(&text).map_err(|e| TranslateError::MalformedRecord {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(translate_records(&records, config))
}

/// Translate every macro described by an analysis file or a directory of
/// `.maki` files
///
/// A directory is walked recursively and the per-translation-unit record
/// streams are merged by set union before classification.
///
/// # Errors
/// Returns `TranslateError` if a file cannot be read or contains a
/// malformed record.
pub fn translate_analysis_path<P: AsRef<Path>>(
    path: P,
    config: &TranslationConfig,
) -> Result<TranslationRun, TranslateError> {
    let files = find_analysis_files(path)?;
    let records = collect_analysis(&files)?;
    Ok(translate_records(&records, config))
}
