//! Fans the external analyzer out over a compilation database, caches its
//! per-translation-unit output, and merges the results into one record
//! stream.
//!
//! Parallelism lives here and only here: the classification engine runs
//! once, after the merge, on the single resulting preprocessor-data value.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::thread;

use indexmap::IndexSet;
use log::{debug, warn};
use serde::Deserialize;

use crate::error::TranslateError;
use crate::ingest::AnalyzerRecord;

/// One entry of `compile_commands.json`
#[derive(Clone, Debug, Deserialize)]
pub struct CompileCommand {
    /// Working directory of the compilation
    pub directory: String,
    /// The compiler argv
    pub arguments: Vec<String>,
    /// The translation unit's main file
    pub file: String,
}

/// Runs the Clang analyzer plugin over every translation unit of a build
///
/// Each unit's record stream is cached next to its source path under the
/// output directory with a `.maki` extension; a cache file newer than its
/// source is reused.
pub struct AnalyzerDriver {
    plugin_path: PathBuf,
    source_dir: PathBuf,
    out_dir: PathBuf,
    analyzer_command: String,
    jobs: usize,
}

impl AnalyzerDriver {
    /// Create a driver for the given analyzer plugin, source root, and
    /// analysis output directory
    #[must_use]
    pub fn new<P: Into<PathBuf>>(plugin_path: P, source_dir: P, out_dir: P) -> Self {
        AnalyzerDriver {
            plugin_path: plugin_path.into(),
            source_dir: source_dir.into(),
            out_dir: out_dir.into(),
            analyzer_command: "clang".to_string(),
            jobs: thread::available_parallelism().map(usize::from).unwrap_or(1),
        }
    }

    /// Override the number of worker threads
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Override the analyzer executable (`clang` by default)
    #[must_use]
    pub fn with_analyzer_command<S: Into<String>>(mut self, command: S) -> Self {
        self.analyzer_command = command.into();
        self
    }

    /// Load and parse a `compile_commands.json` file
    ///
    /// # Errors
    /// Fails when the file cannot be read or an entry is malformed.
    pub fn load_compile_commands<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<CompileCommand>, TranslateError> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| TranslateError::io(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| TranslateError::MalformedCompileCommand {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Run the analyzer over every compile command, fanning out across the
    /// configured worker count
    ///
    /// Returns the analysis file paths in compile-command order.
    ///
    /// # Errors
    /// Fails when a cache path cannot be prepared or the analyzer cannot
    /// be spawned; analyzer diagnostics on stderr are logged, not fatal.
    pub fn run(&self, commands: &[CompileCommand]) -> Result<Vec<PathBuf>, TranslateError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = commands.len().div_ceil(self.jobs);
        let chunks: Vec<Vec<Result<PathBuf, TranslateError>>> = thread::scope(|scope| {
            let handles: Vec<_> = commands
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || chunk.iter().map(|cc| self.run_one(cc)).collect()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_default())
                .collect()
        });
        chunks.into_iter().flatten().collect()
    }

    /// Produce (or reuse) the analysis file for one translation unit
    fn run_one(&self, cc: &CompileCommand) -> Result<PathBuf, TranslateError> {
        let source = self.source_dir.join(&cc.file);
        let dst = self.analysis_path(&cc.file);
        if is_fresh(&source, &dst) {
            debug!("reusing cached analysis {}", dst.display());
            return Ok(dst);
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| TranslateError::io(parent.to_path_buf(), e))?;
        }

        let args = self.analyzer_args(cc);
        debug!("running {} {}", self.analyzer_command, args.join(" "));
        let output = Command::new(&self.analyzer_command)
            .args(&args)
            .current_dir(&self.source_dir)
            .output()
            .map_err(|e| TranslateError::AnalyzerSpawn {
                command: self.analyzer_command.clone(),
                source: e,
            })?;
        if !output.status.success() {
            warn!("analyzer exited with {} on {}", output.status, cc.file);
        }
        if !output.stderr.is_empty() {
            warn!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
        }
        fs::write(&dst, &output.stdout).map_err(|e| TranslateError::io(dst.clone(), e))?;
        Ok(dst)
    }

    /// The analyzer argv for one unit: plugin injected, syntax-only so no
    /// time is wasted generating code
    fn analyzer_args(&self, cc: &CompileCommand) -> Vec<String> {
        let mut args: Vec<String> = cc.arguments.iter().skip(1).cloned().collect();
        args.insert(0, format!("-fplugin={}", self.plugin_path.display()));
        if args.len() > 1 {
            args.pop();
        }
        args.push(cc.file.clone());
        args.push("-fsyntax-only".to_string());
        args
    }

    /// Where the cached record stream for a source file lives
    #[must_use]
    pub fn analysis_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        let rel = path.strip_prefix(&self.source_dir).unwrap_or(path);
        let rel: PathBuf = rel
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.out_dir.join(rel).with_extension("maki")
    }
}

/// Whether a cached analysis file is at least as new as its source
fn is_fresh(source: &Path, cached: &Path) -> bool {
    let (Ok(source_meta), Ok(cached_meta)) = (fs::metadata(source), fs::metadata(cached)) else {
        return false;
    };
    match (source_meta.modified(), cached_meta.modified()) {
        (Ok(source_time), Ok(cached_time)) => cached_time >= source_time,
        _ => false,
    }
}

/// Find every `.maki` analysis file under a path
///
/// A file path is returned as-is; a directory is walked recursively. The
/// result is sorted so downstream processing is deterministic.
///
/// # Errors
/// Fails when a directory cannot be read.
pub fn find_analysis_files<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>, TranslateError> {
    let path = path.as_ref();
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    walk_analysis_dir(path, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk_analysis_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), TranslateError> {
    let entries = fs::read_dir(dir).map_err(|e| TranslateError::io(dir.to_path_buf(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TranslateError::io(dir.to_path_buf(), e))?;
        let path = entry.path();
        if path.is_dir() {
            walk_analysis_dir(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "maki") {
            files.push(path);
        }
    }
    Ok(())
}

/// Read and merge several analysis files into one record stream
///
/// The merge is a set union over records: a definition or invocation
/// reported identically by many translation units collapses to one record.
///
/// # Errors
/// Fails when a file cannot be read or contains a malformed record.
pub fn collect_analysis(paths: &[PathBuf]) -> Result<Vec<AnalyzerRecord>, TranslateError> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut records = Vec::new();
    for path in paths {
        let text = fs::read_to_string(path).map_err(|e| TranslateError::io(path.clone(), e))?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&text).map_err(|e| TranslateError::MalformedRecord {
                path: path.clone(),
                source: e,
            })?;
        for value in values {
            if !seen.insert(value.to_string()) {
                continue;
            }
            let record = serde_json::from_value(value).map_err(|e| {
                TranslateError::MalformedRecord {
                    path: path.clone(),
                    source: e,
                }
            })?;
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn analysis_paths_mirror_the_source_tree() {
        let driver = AnalyzerDriver::new("plugin.so", "src", "out");
        assert_eq!(
            driver.analysis_path("lib/util.c"),
            PathBuf::from("out/lib/util.maki")
        );
        assert_eq!(
            driver.analysis_path("src/main.c"),
            PathBuf::from("out/main.maki")
        );
    }

    #[test]
    fn analyzer_args_inject_plugin_and_syntax_only() {
        let driver = AnalyzerDriver::new("plugin.so", "src", "out");
        let cc = CompileCommand {
            directory: "src".to_string(),
            arguments: vec![
                "cc".to_string(),
                "-O2".to_string(),
                "main.o".to_string(),
            ],
            file: "main.c".to_string(),
        };
        assert_eq!(
            driver.analyzer_args(&cc),
            vec!["-fplugin=plugin.so", "-O2", "main.c", "-fsyntax-only"]
        );
    }

    #[test]
    fn missing_cache_is_never_fresh() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.c");
        fs::write(&source, "int x;\n").unwrap();
        assert!(!is_fresh(&source, &dir.path().join("a.maki")));
    }

    #[test]
    fn cache_written_after_the_source_is_fresh() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.c");
        let cached = dir.path().join("a.maki");
        fs::write(&source, "int x;\n").unwrap();
        fs::write(&cached, "[]").unwrap();
        assert!(is_fresh(&source, &cached));
        // A cache without a source cannot be trusted
        fs::remove_file(&source).unwrap();
        assert!(!is_fresh(&source, &cached));
    }

    #[test]
    fn run_writes_analyzer_stdout_to_the_cache() {
        let dir = tempdir().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("analysis");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("main.c"), "int x;\n").unwrap();

        // `echo` stands in for clang: the cache receives the argv
        let driver = AnalyzerDriver::new(
            PathBuf::from("plugin.so"),
            src_dir.clone(),
            out_dir.clone(),
        )
        .with_analyzer_command("echo")
        .with_jobs(2);
        let commands = vec![CompileCommand {
            directory: src_dir.display().to_string(),
            arguments: vec!["cc".to_string(), "main.o".to_string()],
            file: "main.c".to_string(),
        }];

        let written = driver.run(&commands).unwrap();
        assert_eq!(written, vec![out_dir.join("main.maki")]);
        let text = fs::read_to_string(&written[0]).unwrap();
        assert!(text.contains("-fplugin=plugin.so"));
        assert!(text.contains("main.c -fsyntax-only"));
    }

    #[test]
    fn load_compile_commands_rejects_malformed_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("compile_commands.json");
        fs::write(&path, r#"[{"directory": "."}]"#).unwrap();
        assert!(AnalyzerDriver::load_compile_commands(&path).is_err());

        fs::write(
            &path,
            r#"[{"directory": ".", "arguments": ["cc", "a.c"], "file": "a.c"}]"#,
        )
        .unwrap();
        let commands = AnalyzerDriver::load_compile_commands(&path).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].file, "a.c");
    }

    #[test]
    fn collect_analysis_merges_by_set_union() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.maki");
        let b = dir.path().join("b.maki");
        fs::write(
            &a,
            r#"[{"Kind": "InspectedByCPP", "Name": "X"},
               {"Kind": "Include", "IncludeName": "a.h", "IsValid": true}]"#,
        )
        .unwrap();
        fs::write(&b, r#"[{"Kind": "InspectedByCPP", "Name": "X"}]"#).unwrap();

        let records = collect_analysis(&[a, b]).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn find_analysis_files_walks_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("a.maki"), "[]").unwrap();
        fs::write(dir.path().join("nested/b.maki"), "[]").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();

        let files = find_analysis_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "maki")));
    }
}
