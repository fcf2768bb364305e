//! Function definitions and call graph, found with regex heuristics
//!
//! Python files get definitions plus an intra-repository call graph. Other
//! supported languages only get definition counts. Nothing here parses code;
//! results are best-effort.

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

/// A Python function or method definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub file: String,
    /// 1-based line of the `def`
    pub line: usize,
    /// Qualified names (`file::name`) of repository functions this one calls
    pub calls: Vec<String>,
}

/// Python definitions and call graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonAnalysis {
    /// Keyed by `file::name`; a name repeated within one file gets
    /// `file::name:line` for every definition after the first
    pub functions: BTreeMap<String, FunctionDef>,
    /// File to the names defined in it, in source order
    pub file_functions: BTreeMap<String, Vec<String>>,
    /// Caller to callees, using the same keys as `functions`
    pub call_graph: BTreeMap<String, Vec<String>>,
}

/// Definition counts for non-Python sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherAnalysis {
    pub function_count: usize,
    pub file_count: usize,
    /// Per-file definition counts, files with no definitions included
    pub files: BTreeMap<String, usize>,
    /// Per-language definition counts
    pub languages: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCoverage {
    pub python_functions: usize,
    pub other_functions: usize,
    pub python_files_analyzed: usize,
    pub other_files_analyzed: usize,
}

/// Combined function analysis for a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub python: PythonAnalysis,
    pub other: OtherAnalysis,
    pub total_function_count: usize,
    pub analysis_coverage: AnalysisCoverage,
}

impl FunctionInfo {
    pub fn from_parts(python: PythonAnalysis, other: OtherAnalysis) -> Self {
        let analysis_coverage = AnalysisCoverage {
            python_functions: python.functions.len(),
            other_functions: other.function_count,
            python_files_analyzed: python.file_functions.len(),
            other_files_analyzed: other.file_count,
        };
        Self {
            total_function_count: analysis_coverage.python_functions
                + analysis_coverage.other_functions,
            python,
            other,
            analysis_coverage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_function_count == 0
            && self.analysis_coverage.python_files_analyzed == 0
            && self.analysis_coverage.other_files_analyzed == 0
    }
}

/// Function and call-graph analysis over collected files
pub trait FunctionAnalyzer: Send + Sync {
    /// Definitions and call graph for `.py` files
    fn analyze_python(&self, files: &BTreeMap<String, String>) -> PythonAnalysis;

    /// Definition counts for every other supported language
    fn analyze_other(&self, files: &BTreeMap<String, String>) -> OtherAnalysis;

    fn analyze(&self, files: &BTreeMap<String, String>) -> FunctionInfo {
        FunctionInfo::from_parts(self.analyze_python(files), self.analyze_other(files))
    }
}

/// Source families with their own definition syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    JavaScript,
    CSharp,
    Java,
    Go,
    Rust,
    C,
}

impl SourceKind {
    fn for_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
        Some(match ext.as_str() {
            "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" => Self::JavaScript,
            "cs" => Self::CSharp,
            "java" => Self::Java,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" => Self::C,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::CSharp => "csharp",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::C => "c",
        }
    }
}

const PYTHON_KEYWORDS: &[&str] = &[
    "if", "elif", "while", "for", "with", "return", "print", "and", "or", "not", "in", "is",
    "lambda", "yield", "assert", "del", "except", "raise", "await", "def", "class",
];

const C_KEYWORDS: &[&str] = &["if", "while", "for", "switch", "return", "sizeof", "catch"];

struct FunctionRegexes {
    py_def: Regex,
    py_call: Regex,
    js_function: Regex,
    js_arrow: Regex,
    js_method: Regex,
    c_sharp_like: Regex,
    go_func: Regex,
    rust_fn: Regex,
    c_func: Regex,
}

impl FunctionRegexes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            py_def: Regex::new(r"^([ \t]*)(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)[ \t]*\(")?,
            py_call: Regex::new(r"(?:^|[^\w.])([A-Za-z_]\w*)[ \t]*\(")?,
            js_function: Regex::new(r"\bfunction\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(")?,
            js_arrow: Regex::new(
                r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
            )?,
            js_method: Regex::new(
                r"(?m)^[ \t]+(?:async\s+|static\s+)*([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*\{",
            )?,
            c_sharp_like: Regex::new(
                r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|virtual|override|abstract|async|final|sealed|extern|unsafe|synchronized|partial|new)\s+)+[\w<>\[\],.?]+\s+([A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*\(",
            )?,
            go_func: Regex::new(r"(?m)^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*[\[(]")?,
            rust_fn: Regex::new(
                r#"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_]\w*)"#,
            )?,
            c_func: Regex::new(
                r"(?m)^[A-Za-z_][\w \t\*&:<>,]*?[\s\*&]([A-Za-z_][\w:~]*)\s*\([^;{)]*\)\s*(?:const\s*)?\{",
            )?,
        })
    }
}

fn function_regexes() -> Option<&'static FunctionRegexes> {
    static REGEXES: OnceLock<Option<FunctionRegexes>> = OnceLock::new();
    REGEXES
        .get_or_init(|| match FunctionRegexes::compile() {
            Ok(regexes) => Some(regexes),
            Err(err) => {
                log::warn!("Function analysis disabled: {}", err);
                None
            }
        })
        .as_ref()
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// A Python definition with the lines of its body
struct PythonBody<'a> {
    name: String,
    line: usize,
    body: Vec<&'a str>,
}

fn python_bodies<'a>(re: &FunctionRegexes, content: &'a str) -> Vec<PythonBody<'a>> {
    let lines: Vec<&str> = content.lines().collect();
    let mut bodies = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let Some(caps) = re.py_def.captures(line) else {
            continue;
        };
        let def_indent = indent_width(line);
        let name = caps.get(2).map_or("", |m| m.as_str()).to_owned();

        let mut body = Vec::new();
        for next in &lines[idx + 1..] {
            if !next.trim().is_empty() && indent_width(next) <= def_indent {
                break;
            }
            body.push(*next);
        }
        bodies.push(PythonBody { name, line: idx + 1, body });
    }
    bodies
}

/// Regex-based [`FunctionAnalyzer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexFunctionAnalyzer;

impl RegexFunctionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn count_definitions(re: &FunctionRegexes, kind: SourceKind, content: &str) -> usize {
        match kind {
            SourceKind::JavaScript => {
                let mut names: BTreeSet<(usize, &str)> = BTreeSet::new();
                for regex in [&re.js_function, &re.js_arrow, &re.js_method] {
                    for caps in regex.captures_iter(content) {
                        if let Some(m) = caps.get(1) {
                            if !C_KEYWORDS.contains(&m.as_str()) {
                                names.insert((m.start(), m.as_str()));
                            }
                        }
                    }
                }
                names.len()
            }
            SourceKind::CSharp | SourceKind::Java => re.c_sharp_like.captures_iter(content).count(),
            SourceKind::Go => re.go_func.captures_iter(content).count(),
            SourceKind::Rust => re.rust_fn.captures_iter(content).count(),
            SourceKind::C => re
                .c_func
                .captures_iter(content)
                .filter_map(|caps| caps.get(1))
                .filter(|m| !C_KEYWORDS.contains(&m.as_str()))
                .count(),
        }
    }
}

impl FunctionAnalyzer for RegexFunctionAnalyzer {
    fn analyze_python(&self, files: &BTreeMap<String, String>) -> PythonAnalysis {
        let Some(re) = function_regexes() else {
            return PythonAnalysis::default();
        };

        let python_files: Vec<(&String, &String)> =
            files.iter().filter(|(path, _)| path.ends_with(".py")).collect();

        let parsed: Vec<(&String, Vec<PythonBody<'_>>)> = python_files
            .par_iter()
            .map(|(path, content)| (*path, python_bodies(re, content)))
            .collect();

        let mut analysis = PythonAnalysis::default();
        // Bare name to every qualified definition with that name
        let mut by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        // `file::name`, or `file::name:line` when the name repeats in that file
        let mut keys: Vec<Vec<String>> = Vec::with_capacity(parsed.len());

        for (path, bodies) in &parsed {
            let names = analysis.file_functions.entry((*path).clone()).or_default();
            let mut file_keys: Vec<String> = Vec::with_capacity(bodies.len());
            for body in bodies {
                names.push(body.name.clone());
                let base = format!("{}::{}", path, body.name);
                let key = if file_keys.contains(&base) {
                    format!("{}:{}", base, body.line)
                } else {
                    base
                };
                by_name.entry(body.name.as_str()).or_default().push(key.clone());
                file_keys.push(key);
            }
            keys.push(file_keys);
        }

        for ((path, bodies), file_keys) in parsed.iter().zip(&keys) {
            for (body, key) in bodies.iter().zip(file_keys) {
                let key = key.clone();
                let mut calls: BTreeSet<String> = BTreeSet::new();

                for line in &body.body {
                    for caps in re.py_call.captures_iter(line) {
                        let Some(callee) = caps.get(1).map(|m| m.as_str()) else {
                            continue;
                        };
                        if PYTHON_KEYWORDS.contains(&callee) {
                            continue;
                        }
                        let Some(targets) = by_name.get(callee) else {
                            continue;
                        };
                        // Prefer a definition in the same file
                        let local = format!("{}::{}", path, callee);
                        let target = if targets.contains(&local) {
                            local
                        } else {
                            targets[0].clone()
                        };
                        if target != key {
                            calls.insert(target);
                        }
                    }
                }

                let calls: Vec<String> = calls.into_iter().collect();
                if !calls.is_empty() {
                    analysis.call_graph.insert(key.clone(), calls.clone());
                }
                analysis.functions.insert(
                    key,
                    FunctionDef {
                        name: body.name.clone(),
                        file: (*path).clone(),
                        line: body.line,
                        calls,
                    },
                );
            }
        }

        log::debug!(
            "Python analysis: {} functions in {} files",
            analysis.functions.len(),
            analysis.file_functions.len()
        );
        analysis
    }

    fn analyze_other(&self, files: &BTreeMap<String, String>) -> OtherAnalysis {
        let Some(re) = function_regexes() else {
            return OtherAnalysis::default();
        };

        let counted: Vec<(&String, SourceKind, usize)> = files
            .par_iter()
            .filter_map(|(path, content)| {
                let kind = SourceKind::for_path(path)?;
                Some((path, kind, Self::count_definitions(re, kind, content)))
            })
            .collect();

        let mut analysis = OtherAnalysis::default();
        for (path, kind, count) in counted {
            analysis.function_count += count;
            analysis.file_count += 1;
            analysis.files.insert(path.clone(), count);
            *analysis.languages.entry(kind.name().to_owned()).or_default() += count;
        }
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| ((*p).to_owned(), (*c).to_owned()))
            .collect()
    }

    #[test]
    fn test_python_definitions_and_calls() {
        let files = files(&[
            (
                "main.py",
                "from utils import helper\n\ndef main():\n    value = helper(1)\n    show(value)\n\ndef show(v):\n    print(v)\n\nif __name__ == '__main__':\n    main()\n",
            ),
            ("utils.py", "def helper(x):\n    return x * 2\n"),
        ]);

        let analysis = RegexFunctionAnalyzer::new().analyze_python(&files);
        assert_eq!(analysis.functions.len(), 3);
        assert_eq!(analysis.file_functions["main.py"], vec!["main", "show"]);

        let main = &analysis.functions["main.py::main"];
        assert_eq!(main.line, 3);
        assert_eq!(main.calls, vec!["main.py::show", "utils.py::helper"]);
        // print is a builtin, not a repository function
        assert!(!analysis.call_graph.contains_key("main.py::show"));
    }

    #[test]
    fn test_method_bodies_end_at_dedent() {
        let files = files(&[(
            "svc.py",
            "class Service:\n    def start(self):\n        self.run()\n\n    def run(self):\n        pass\n\ndef run():\n    pass\n",
        )]);

        let analysis = RegexFunctionAnalyzer::new().analyze_python(&files);
        assert_eq!(analysis.file_functions["svc.py"], vec!["start", "run", "run"]);
        // Attribute calls are not resolved
        assert!(analysis.functions["svc.py::start"].calls.is_empty());
        // The repeated name keeps its own entry, keyed by line
        assert_eq!(analysis.functions.len(), 3);
        assert_eq!(analysis.functions["svc.py::run"].line, 5);
        assert_eq!(analysis.functions["svc.py::run:8"].line, 8);

        let info = RegexFunctionAnalyzer::new().analyze(&files);
        assert_eq!(info.analysis_coverage.python_functions, 3);
    }

    #[test]
    fn test_other_languages_counted() {
        let files = files(&[
            (
                "App.jsx",
                "function App() {\n  return <div/>;\n}\nconst Button = (props) => <b/>;\n",
            ),
            (
                "Program.cs",
                "class Program {\n    public static void Main(string[] args) {\n    }\n    private int Add(int a, int b) { return a + b; }\n}\n",
            ),
            ("main.go", "package main\n\nfunc main() {\n}\n\nfunc (s *Server) Start() error {\n}\n"),
            ("lib.rs", "pub fn one() {}\nasync fn two() {}\n"),
            ("README.md", "function notCode() {}"),
        ]);

        let analysis = RegexFunctionAnalyzer::new().analyze_other(&files);
        assert_eq!(analysis.files["App.jsx"], 2);
        assert_eq!(analysis.files["Program.cs"], 2);
        assert_eq!(analysis.files["main.go"], 2);
        assert_eq!(analysis.files["lib.rs"], 2);
        assert!(!analysis.files.contains_key("README.md"));
        assert_eq!(analysis.file_count, 4);
        assert_eq!(analysis.function_count, 8);
        assert_eq!(analysis.languages["go"], 2);
    }

    #[test]
    fn test_c_control_flow_is_not_a_function() {
        let files = files(&[(
            "main.c",
            "int main(void) {\n    if (x) {\n    }\n    return 0;\n}\nstatic int add(int a, int b) {\n    return a + b;\n}\n",
        )]);
        let analysis = RegexFunctionAnalyzer::new().analyze_other(&files);
        assert_eq!(analysis.function_count, 2);
    }

    #[test]
    fn test_function_info_totals() {
        let files = files(&[
            ("a.py", "def f():\n    pass\n"),
            ("b.ts", "export function g() {}\n"),
        ]);
        let info = RegexFunctionAnalyzer::new().analyze(&files);
        assert_eq!(info.total_function_count, 2);
        assert_eq!(info.analysis_coverage.python_functions, 1);
        assert_eq!(info.analysis_coverage.other_functions, 1);
        assert_eq!(info.analysis_coverage.python_files_analyzed, 1);
        assert_eq!(info.analysis_coverage.other_files_analyzed, 1);
        assert!(!info.is_empty());
        assert!(FunctionInfo::default().is_empty());
    }
}
