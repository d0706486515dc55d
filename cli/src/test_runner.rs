use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use codespan_reporting::files::Files;
use codespan_reporting::term::termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use serde::Deserialize;

use templater::{TemplateDiagnostic, TemplateError};
use views::{Rendered, ViewSource, Views, ViewsConfig};

/// View name the test file's own template is registered under.
const MAIN_VIEW: &str = "main";

const TEST_SUFFIX: &str = ".test.html";

#[derive(Debug, Deserialize)]
pub struct ExpectedWarning {
    /// Substring that must appear in the warning message.
    pub contains: String,

    /// If set, the warning's span must start on this 1-based source line.
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,

    /// Expected error; the error's Display string must contain this substring.
    #[serde(default)]
    pub expect_error: Option<String>,

    /// Expected warnings. If present (even empty), warning count and content are checked.
    #[serde(default)]
    pub expect_warnings: Option<Vec<ExpectedWarning>>,

    /// Depth limit for the render. Defaults to the library default.
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Additional in-memory views, name → source.
    #[serde(default)]
    pub views: BTreeMap<String, String>,
}

/// Parse a `.test.html` file into its TOML config and template source.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let rest = strip_newline(rest);
    let (frontmatter, source) = rest
        .split_once("\n---")
        .ok_or("missing closing --- frontmatter delimiter")?;

    let config = toml::from_str(frontmatter.trim_end_matches('\r'))
        .map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, strip_newline(source)))
}

fn strip_newline(text: &str) -> &str {
    text.strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

/// Render the test's `main` view against its in-memory views.
fn render_test(config: &TestConfig, source: &str) -> (Views, Result<Rendered, TemplateError>) {
    let mut sources = config.views.clone();
    sources.insert(MAIN_VIEW.to_string(), source.to_string());

    let mut views_config = ViewsConfig::default();
    if let Some(max_depth) = config.max_depth {
        views_config.max_depth = max_depth;
    }

    let mut views = Views::new(ViewSource::memory(sources), views_config);
    let result = views.render(MAIN_VIEW);
    (views, result)
}

/// A test file's description, if any, and the reason it failed.
struct TestRun {
    description: Option<String>,
    failure: Option<String>,
}

fn run_single_test(path: &Path) -> TestRun {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return TestRun {
                description: None,
                failure: Some(format!("cannot read file: {}", e)),
            };
        }
    };
    let (config, source) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => {
            return TestRun {
                description: None,
                failure: Some(format!("frontmatter error: {}", e)),
            };
        }
    };

    let (views, result) = render_test(&config, source);
    TestRun {
        description: config.description.clone(),
        failure: check_expectations(&config, &views, result).err(),
    }
}

/// Compare a render against the test's expectations.
fn check_expectations(
    config: &TestConfig,
    views: &Views,
    result: Result<Rendered, TemplateError>,
) -> Result<(), String> {
    let rendered = match (result, &config.expect_error) {
        (Err(err), Some(expected)) => {
            let message = err.to_string();
            if !message.contains(expected.as_str()) {
                return Err(format!(
                    "expected error containing \"{}\", got: {}",
                    expected, message
                ));
            }
            return Ok(());
        }
        (Ok(_), Some(expected)) => {
            return Err(format!(
                "expected error containing \"{}\", but rendering succeeded",
                expected
            ));
        }
        (Err(err), None) => return Err(format!("unexpected error: {}", err)),
        (Ok(rendered), None) => rendered,
    };

    if let Some(expected) = &config.expect_output {
        let (expected, actual) = (expected.trim(), rendered.output.trim());
        if expected != actual {
            return Err(format!(
                "output mismatch\n  expected: {}\n  actual:   {}",
                expected, actual
            ));
        }
    }

    match &config.expect_warnings {
        Some(expected) => check_warnings(views, &rendered.warnings, expected),
        None => Ok(()),
    }
}

/// 1-based line of a diagnostic's start, looked up in the file it points into.
fn diagnostic_line(views: &Views, diagnostic: &TemplateDiagnostic) -> Option<usize> {
    let (file_id, span) = diagnostic.location.as_ref()?;
    views
        .files()
        .line_index(*file_id, span.start)
        .ok()
        .map(|index| index + 1)
}

fn check_warnings(
    views: &Views,
    warnings: &[TemplateDiagnostic],
    expected: &[ExpectedWarning],
) -> Result<(), String> {
    if warnings.len() != expected.len() {
        let mut listing: Vec<String> = warnings.iter().map(|w| format!("    - {}", w)).collect();
        if listing.is_empty() {
            listing.push("    (none)".to_string());
        }
        return Err(format!(
            "expected {} warning(s), got {}\n  actual warnings:\n{}",
            expected.len(),
            warnings.len(),
            listing.join("\n")
        ));
    }

    for (i, (actual, expected)) in warnings.iter().zip(expected).enumerate() {
        let message = actual.to_string();
        if !message.contains(&expected.contains) {
            return Err(format!(
                "warning[{}]: expected message containing \"{}\", got: {}",
                i, expected.contains, message
            ));
        }

        let Some(expected_line) = expected.line else {
            continue;
        };
        match diagnostic_line(views, actual) {
            Some(line) if line == expected_line => {}
            Some(line) => {
                return Err(format!(
                    "warning[{}]: expected on line {}, but span is on line {}",
                    i, expected_line, line
                ));
            }
            None => {
                return Err(format!(
                    "warning[{}]: expected on line {}, but warning has no span",
                    i, expected_line
                ));
            }
        }
    }
    Ok(())
}

/// Test files under `path` grouped by their directory relative to it. A
/// single file forms one unnamed group.
fn discover(path: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    if path.is_file() {
        groups.insert(String::new(), vec![path.to_path_buf()]);
        return groups;
    }

    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let file = entry.path();
            if file.is_dir() {
                pending.push(file);
                continue;
            }
            let is_test = file
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEST_SUFFIX));
            if is_test {
                let group = dir
                    .strip_prefix(path)
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                groups.entry(group).or_default().push(file);
            }
        }
    }
    for files in groups.values_mut() {
        files.sort();
    }
    groups
}

fn test_label(path: &Path, run: &TestRun) -> String {
    if let Some(description) = &run.description {
        return description.clone();
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.strip_suffix(TEST_SUFFIX).unwrap_or(n).to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Colored test output on stderr.
struct Reporter {
    out: StandardStream,
}

impl Reporter {
    fn new(no_color: bool) -> Self {
        let choice = if no_color { ColorChoice::Never } else { ColorChoice::Auto };
        Reporter {
            out: StandardStream::stderr(choice),
        }
    }

    fn styled(&mut self, text: &str, color: Option<Color>) {
        let _ = self
            .out
            .set_color(ColorSpec::new().set_fg(color).set_bold(true));
        let _ = write!(self.out, "{}", text);
        let _ = self.out.reset();
    }

    fn group(&mut self, name: &str) {
        let _ = writeln!(self.out);
        self.styled(if name.is_empty() { "(root)" } else { name }, None);
        let _ = writeln!(self.out);
    }

    fn result(&mut self, label: &str, passed: bool) {
        let _ = write!(self.out, "  ");
        if passed {
            self.styled("PASS", Some(Color::Green));
        } else {
            self.styled("FAIL", Some(Color::Red));
        }
        let _ = writeln!(self.out, "  {}", label);
    }

    fn failures(&mut self, failures: &[(PathBuf, String)]) {
        let _ = writeln!(self.out, "\nfailures:");
        for (path, reason) in failures {
            let _ = writeln!(self.out, "\n  --- {} ---", path.display());
            for line in reason.lines() {
                let _ = writeln!(self.out, "  {}", line);
            }
        }
    }

    fn summary(&mut self, passed: usize, failed: usize) {
        let _ = write!(self.out, "\ntest result: ");
        if failed == 0 {
            self.styled("ok", Some(Color::Green));
            let _ = writeln!(self.out, ". {} passed, 0 failed", passed);
        } else {
            self.styled("FAILED", Some(Color::Red));
            let _ = writeln!(
                self.out,
                ". {} passed, {} failed (of {})",
                passed,
                failed,
                passed + failed
            );
        }
    }
}

/// Run every `.test.html` file under `path` (or `path` itself).
/// Returns the process exit code: 0 when all pass, 1 otherwise.
pub fn run_tests(path: &Path, no_color: bool) -> i32 {
    let groups = discover(path);
    if groups.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return 1;
    }

    let mut reporter = Reporter::new(no_color);
    let mut passed = 0usize;
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    for (group, files) in &groups {
        reporter.group(group);
        for file in files {
            let run = run_single_test(file);
            reporter.result(&test_label(file, &run), run.failure.is_none());
            match run.failure {
                None => passed += 1,
                Some(reason) => failures.push((file.clone(), reason)),
            }
        }
    }

    if !failures.is_empty() {
        reporter.failures(&failures);
    }
    reporter.summary(passed, failures.len());
    i32::from(!failures.is_empty())
}
