//! Fact ingestion: turns the analyzer's record stream into a
//! [`PreprocessorData`] value narrowed to top-level non-argument source
//! invocations.

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;

use crate::facts::{Invocation, Macro, PreprocessorData};

/// One element of the analyzer's JSON record stream
#[derive(Debug, Deserialize)]
#[serde(tag = "Kind")]
pub enum AnalyzerRecord {
    /// A macro definition
    Definition(Macro),
    /// A macro expansion
    Invocation(Box<Invocation>),
    /// A name the preprocessor inspected in a conditional
    #[serde(rename = "InspectedByCPP")]
    InspectedByCpp {
        /// The inspected macro name
        #[serde(rename = "Name")]
        name: String,
    },
    /// A `#include "..."` directive
    Include {
        /// The included path
        #[serde(rename = "IncludeName")]
        include_name: String,
        /// Whether the include resolved to a real file
        #[serde(rename = "IsValid")]
        is_valid: bool,
    },
}

/// Parse a JSON array of analyzer records
///
/// Malformed or incomplete records are deserialization errors; fields are
/// never defaulted.
///
/// # Errors
/// Returns the underlying `serde_json` error; callers attach the source
/// path via [`crate::TranslateError::MalformedRecord`].
pub fn parse_records(json: &str) -> Result<Vec<AnalyzerRecord>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Build preprocessor data from a record stream, narrowed to top-level
/// non-argument source invocations
///
/// Enforces one-definition uniqueness: a macro name appearing in more than
/// one definition record is discarded entirely, along with every
/// invocation bearing it. Within one macro, invocations are deduplicated
/// by invocation location (a nested invocation can be reported twice).
#[must_use]
pub fn build_preprocessor_data(
    records: &[AnalyzerRecord],
    source_prefix: &str,
) -> PreprocessorData {
    // Names defined exactly once survive; anything else would break the
    // one-definition rule downstream.
    let mut definition_counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        if let AnalyzerRecord::Definition(m) = record {
            *definition_counts.entry(m.name.as_str()).or_insert(0) += 1;
        }
    }
    let unique = |name: &str| definition_counts.get(name).copied() == Some(1);

    let mut pd = PreprocessorData::new();

    // Definitions first: invocations are attached to their macro via the
    // shared definition location, so the index must exist before the
    // second pass.
    let mut by_definition_location: HashMap<&str, Macro> = HashMap::new();
    for record in records {
        match record {
            AnalyzerRecord::Definition(m) => {
                if !unique(&m.name) {
                    debug!("dropping multiply-defined macro {}", m.name);
                    continue;
                }
                if !pd.macros.contains_key(m) {
                    pd.macros.insert(m.clone(), Vec::new());
                }
                if m.is_definition_location_valid {
                    by_definition_location.insert(m.definition_location.as_str(), m.clone());
                }
            }
            AnalyzerRecord::InspectedByCpp { name } => {
                pd.inspected_macro_names.insert(name.clone());
            }
            AnalyzerRecord::Include {
                include_name,
                is_valid,
            } => {
                if *is_valid {
                    pd.local_includes.insert(include_name.clone());
                }
            }
            AnalyzerRecord::Invocation(_) => {}
        }
    }

    for record in records {
        let AnalyzerRecord::Invocation(i) = record else {
            continue;
        };
        if !unique(&i.name) {
            continue;
        }
        if !i.is_definition_location_valid {
            continue;
        }
        // Compiler built-ins have no file entry and thus no definition
        // record to attach to.
        let Some(m) = by_definition_location.get(i.definition_location.as_str()) else {
            debug!(
                "ignoring invocation of {} with unknown definition {}",
                i.name, i.definition_location
            );
            continue;
        };
        let invocations = pd
            .macros
            .entry(m.clone())
            .or_insert_with(Vec::new);
        if invocations
            .iter()
            .all(|j| j.invocation_location != i.invocation_location)
        {
            invocations.push((**i).clone());
        }
    }

    pd.restrict_to_source(source_prefix)
        .restrict_to_top_level_non_argument()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::fixtures::{expr_invocation, object_macro};
    use pretty_assertions::assert_eq;

    fn definition(m: &Macro) -> AnalyzerRecord {
        AnalyzerRecord::Definition(m.clone())
    }

    fn invocation(i: &Invocation) -> AnalyzerRecord {
        AnalyzerRecord::Invocation(Box::new(i.clone()))
    }

    #[test]
    fn multiply_defined_names_are_dropped_with_their_invocations() {
        let a = object_macro("FOO", "1", "a.h:1:1");
        let b = object_macro("FOO", "2", "b.h:1:1");
        let keep = object_macro("BAR", "3", "a.h:2:1");
        let records = vec![
            definition(&a),
            definition(&b),
            definition(&keep),
            invocation(&expr_invocation("FOO", "a.h:1:1", "main.c:4:1")),
            invocation(&expr_invocation("BAR", "a.h:2:1", "main.c:5:1")),
        ];

        let pd = build_preprocessor_data(&records, "");
        assert!(!pd.macros.contains_key(&a));
        assert!(!pd.macros.contains_key(&b));
        assert_eq!(pd.macros[&keep].len(), 1);
    }

    #[test]
    fn invocations_are_deduplicated_by_location() {
        let m = object_macro("N", "10", "a.h:1:1");
        let i = expr_invocation("N", "a.h:1:1", "main.c:4:1");
        let records = vec![definition(&m), invocation(&i), invocation(&i)];

        let pd = build_preprocessor_data(&records, "");
        assert_eq!(pd.macros[&m].len(), 1);
    }

    #[test]
    fn invocations_preceding_their_definition_still_attach() {
        let m = object_macro("N", "10", "a.h:1:1");
        let i = expr_invocation("N", "a.h:1:1", "main.c:4:1");
        let records = vec![invocation(&i), definition(&m)];

        let pd = build_preprocessor_data(&records, "");
        assert_eq!(pd.macros[&m].len(), 1);
    }

    #[test]
    fn invocation_with_unknown_definition_is_ignored() {
        let m = object_macro("N", "10", "a.h:1:1");
        let records = vec![
            definition(&m),
            invocation(&expr_invocation("N", "elsewhere.h:9:9", "main.c:4:1")),
        ];

        let pd = build_preprocessor_data(&records, "");
        assert!(pd.macros[&m].is_empty());
    }

    #[test]
    fn inspected_names_and_valid_includes_accumulate() {
        let records = vec![
            AnalyzerRecord::InspectedByCpp {
                name: "GUARD".to_string(),
            },
            AnalyzerRecord::Include {
                include_name: "util.h".to_string(),
                is_valid: true,
            },
            AnalyzerRecord::Include {
                include_name: "<missing>".to_string(),
                is_valid: false,
            },
        ];

        let pd = build_preprocessor_data(&records, "");
        assert!(pd.inspected_macro_names.contains("GUARD"));
        assert!(pd.local_includes.contains("util.h"));
        assert!(!pd.local_includes.contains("<missing>"));
    }

    #[test]
    fn nested_invocations_drop_the_whole_macro() {
        let m = object_macro("N", "10", "a.h:1:1");
        let top = expr_invocation("N", "a.h:1:1", "main.c:4:1");
        let mut nested = expr_invocation("N", "a.h:1:1", "main.c:9:1");
        nested.invocation_depth = 1;
        let records = vec![definition(&m), invocation(&top), invocation(&nested)];

        let pd = build_preprocessor_data(&records, "");
        assert!(!pd.macros.contains_key(&m));
    }

    #[test]
    fn source_prefix_restricts_definitions() {
        let inside = object_macro("A", "1", "src/a.c:1:1");
        let outside = object_macro("B", "2", "/usr/include/b.h:1:1");
        let records = vec![definition(&inside), definition(&outside)];

        let pd = build_preprocessor_data(&records, "src/");
        assert!(pd.macros.contains_key(&inside));
        assert!(!pd.macros.contains_key(&outside));
    }

    #[test]
    fn malformed_records_fail_to_parse() {
        // Missing every Definition field
        let json = r#"[{"Kind": "Definition", "Name": "X"}]"#;
        assert!(parse_records(json).is_err());
        // Unknown kind tag
        let json = r#"[{"Kind": "Mystery"}]"#;
        assert!(parse_records(json).is_err());
    }
}
