//! Source overlay: rewrites copies of the original files with the accepted
//! replacements laid over their `#define` lines.

use std::fs;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use log::info;

use crate::error::TranslateError;
use crate::facts::{Macro, SourceLocation};

/// Apply accepted translations to copies of their source files
///
/// For every macro with a replacement: the file named by its definition
/// location is read, every line from the definition start through the end
/// (inclusive) is blanked, the replacement is placed on the start line, and
/// a trailing unterminated block comment that began on the end line is
/// preserved. Results are written under `output_dir` mirroring each file's
/// path relative to `source_dir`, creating parent directories as needed.
/// Files without any translation are not copied.
///
/// Returns the paths written.
///
/// # Errors
/// Fails on unreadable sources, unwritable outputs, or definition
/// locations that do not fit the file.
pub fn apply_translations(
    translations: &IndexMap<Macro, Option<String>>,
    source_dir: &Path,
    output_dir: &Path,
    read_only: bool,
) -> Result<Vec<PathBuf>, TranslateError> {
    // Group by file so each source is read and written once.
    let mut by_file: IndexMap<&str, Vec<(&Macro, &str)>> = IndexMap::new();
    for (m, translation) in translations {
        if let Some(text) = translation {
            by_file
                .entry(m.definition_filename())
                .or_default()
                .push((m, text.as_str()));
        }
    }

    let mut written = Vec::new();
    for (file, macros) in by_file {
        let input = resolve_input(source_dir, file);
        let contents =
            fs::read_to_string(&input).map_err(|e| TranslateError::io(input.clone(), e))?;
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();

        for (m, replacement) in macros {
            overlay_one(&mut lines, m, replacement)?;
        }

        let out_path = output_dir.join(relative_output_path(source_dir, file));
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TranslateError::io(parent.to_path_buf(), e))?;
        }
        let mut output = lines.join("\n");
        output.push('\n');
        fs::write(&out_path, output).map_err(|e| TranslateError::io(out_path.clone(), e))?;
        if read_only {
            let mut permissions = fs::metadata(&out_path)
                .map_err(|e| TranslateError::io(out_path.clone(), e))?
                .permissions();
            permissions.set_readonly(true);
            fs::set_permissions(&out_path, permissions)
                .map_err(|e| TranslateError::io(out_path.clone(), e))?;
        }
        info!("wrote {}", out_path.display());
        written.push(out_path);
    }
    Ok(written)
}

/// Blank the definition lines and drop the replacement on the start line
fn overlay_one(lines: &mut [String], m: &Macro, replacement: &str) -> Result<(), TranslateError> {
    let start = SourceLocation::parse(&m.definition_location)?;
    let end = SourceLocation::parse(&m.end_definition_location)?;
    if start.line == 0 || end.line < start.line || end.line > lines.len() {
        return Err(TranslateError::InvalidLocation(format!(
            "{} .. {}",
            m.definition_location, m.end_definition_location
        )));
    }

    let open_comment = trailing_open_comment(&lines[end.line - 1]).map(str::to_string);

    for line in &mut lines[start.line - 1..end.line] {
        line.clear();
    }
    lines[start.line - 1] = replacement.to_string();
    if let Some(comment) = open_comment {
        if end.line > start.line {
            lines[end.line - 1] = comment;
        } else {
            let line = &mut lines[start.line - 1];
            line.push(' ');
            line.push_str(&comment);
        }
    }
    Ok(())
}

/// A block comment opened on this line and not closed on it
fn trailing_open_comment(line: &str) -> Option<&str> {
    let pos = line.rfind("/*")?;
    if line[pos..].contains("*/") {
        None
    } else {
        Some(&line[pos..])
    }
}

fn resolve_input(source_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        source_dir.join(path)
    }
}

/// The path a transformed file takes under the output directory: relative
/// to the source root when possible, otherwise the location path with any
/// root stripped
fn relative_output_path(source_dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    let rel = path.strip_prefix(source_dir).unwrap_or(path);
    rel.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::fixtures::object_macro;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn translate_one(
        m: Macro,
        replacement: &str,
        source: &str,
        read_only: bool,
    ) -> (tempfile::TempDir, PathBuf, String) {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("a.c"), source).unwrap();

        let mut translations = IndexMap::new();
        translations.insert(m, Some(replacement.to_string()));
        let written = apply_translations(&translations, &src_dir, &out_dir, read_only).unwrap();
        assert_eq!(written.len(), 1);
        let text = fs::read_to_string(&written[0]).unwrap();
        (dir, written[0].clone(), text)
    }

    #[test]
    fn replacement_lands_on_the_definition_line() {
        let mut m = object_macro("PI", "3.14", "a.c:2:1");
        m.end_definition_location = "a.c:2:20".to_string();
        let (_dir, path, text) = translate_one(
            m,
            "static const double PI = 3.14;",
            "int before;\n#define PI 3.14\nint after;\n",
            false,
        );
        assert!(path.ends_with("a.c"));
        assert_eq!(text, "int before;\nstatic const double PI = 3.14;\nint after;\n");
    }

    #[test]
    fn multi_line_definitions_are_blanked_through_the_end_line() {
        let mut m = object_macro("SUM", "((a)+(b))", "a.c:1:1");
        m.end_definition_location = "a.c:3:12".to_string();
        let source = "#define SUM \\\n  ((a)+ \\\n   (b))\nint after;\n";
        let (_dir, _path, text) = translate_one(
            m,
            "static inline int SUM(int a, int b) { return ((a)+(b)); }",
            source,
            false,
        );
        assert_eq!(
            text,
            "static inline int SUM(int a, int b) { return ((a)+(b)); }\n\n\nint after;\n"
        );
    }

    #[test]
    fn trailing_open_comment_on_the_end_line_survives() {
        let mut m = object_macro("N", "1", "a.c:1:1");
        m.end_definition_location = "a.c:2:12".to_string();
        let source = "#define N \\\n  1 /* docs continue\n   here */\nint after;\n";
        let (_dir, _path, text) = translate_one(m, "enum { N = 1 };", source, false);
        assert_eq!(
            text,
            "enum { N = 1 };\n/* docs continue\n   here */\nint after;\n"
        );
    }

    #[test]
    fn closed_comment_on_the_end_line_is_blanked() {
        let mut m = object_macro("N", "1", "a.c:1:1");
        m.end_definition_location = "a.c:1:12".to_string();
        let source = "#define N 1 /* closed */\nint after;\n";
        let (_dir, _path, text) = translate_one(m, "enum { N = 1 };", source, false);
        assert_eq!(text, "enum { N = 1 };\nint after;\n");
    }

    #[test]
    fn open_comment_on_a_single_line_definition_is_appended() {
        let mut m = object_macro("N", "1", "a.c:1:1");
        m.end_definition_location = "a.c:1:12".to_string();
        let source = "#define N 1 /* open\ncomment ends */\n";
        let (_dir, _path, text) = translate_one(m, "enum { N = 1 };", source, false);
        assert_eq!(text, "enum { N = 1 }; /* open\ncomment ends */\n");
    }

    #[test]
    fn output_mirrors_nested_paths_and_can_be_read_only() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(src_dir.join("lib")).unwrap();
        fs::write(src_dir.join("lib/util.c"), "#define N 1\n").unwrap();

        let mut m = object_macro("N", "1", "lib/util.c:1:1");
        m.end_definition_location = "lib/util.c:1:11".to_string();
        let mut translations = IndexMap::new();
        translations.insert(m, Some("enum { N = 1 };".to_string()));

        let written = apply_translations(&translations, &src_dir, &out_dir, true).unwrap();
        assert_eq!(written, vec![out_dir.join("lib/util.c")]);
        let metadata = fs::metadata(&written[0]).unwrap();
        assert!(metadata.permissions().readonly());
    }

    #[test]
    fn skipped_macros_produce_no_output() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("a.c"), "#define N 1\n").unwrap();

        let mut translations = IndexMap::new();
        translations.insert(object_macro("N", "1", "a.c:1:1"), None);
        let written = apply_translations(&translations, &src_dir, &out_dir, false).unwrap();
        assert!(written.is_empty());
        assert!(!out_dir.exists());
    }

    #[test]
    fn out_of_range_definitions_are_fatal() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("a.c"), "#define N 1\n").unwrap();

        let mut m = object_macro("N", "1", "a.c:5:1");
        m.end_definition_location = "a.c:5:11".to_string();
        let mut translations = IndexMap::new();
        translations.insert(m, Some("enum { N = 1 };".to_string()));
        assert!(apply_translations(&translations, &src_dir, &out_dir, false).is_err());
    }

    #[test]
    fn two_macros_in_one_file_are_applied_to_one_copy() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("a.c"), "#define A 1\n#define B 2\n").unwrap();

        let mut a = object_macro("A", "1", "a.c:1:1");
        a.end_definition_location = "a.c:1:11".to_string();
        let mut b = object_macro("B", "2", "a.c:2:1");
        b.end_definition_location = "a.c:2:11".to_string();
        let mut translations = IndexMap::new();
        translations.insert(a, Some("enum { A = 1 };".to_string()));
        translations.insert(b, Some("enum { B = 2 };".to_string()));

        let written = apply_translations(&translations, &src_dir, &out_dir, false).unwrap();
        assert_eq!(written.len(), 1);
        let text = fs::read_to_string(&written[0]).unwrap();
        assert_eq!(text, "enum { A = 1 };\nenum { B = 2 };\n");
    }
}
