//! Per-file content helpers: binary probing, lossy reads, comment stripping

use regex::Regex;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::OnceLock;

/// Number of leading bytes inspected by the binary probe
const PROBE_LEN: usize = 8192;

/// Check whether a byte sample looks like binary data
///
/// A sample is binary when it contains a NUL byte, is not valid UTF-8, or
/// more than a tenth of it is control characters. A multi-byte sequence cut
/// off at the end of the sample does not count as invalid.
pub fn is_binary_data(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(PROBE_LEN)];

    if sample.contains(&0) {
        return true;
    }

    if let Err(err) = std::str::from_utf8(sample) {
        if err.error_len().is_some() {
            return true;
        }
    }

    let non_printable = sample
        .iter()
        .filter(|&&b| b < 32 && b != b'\t' && b != b'\n' && b != b'\r' && b != 0x0c)
        .count();

    non_printable * 10 > sample.len()
}

/// Probe the start of a file for binary content
pub fn is_binary(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buf = Vec::with_capacity(PROBE_LEN);
    file.by_ref().take(PROBE_LEN as u64).read_to_end(&mut buf)?;
    Ok(is_binary_data(&buf))
}

/// Read a file as text, replacing undecodable bytes
pub fn read_file_lossy(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

struct CommentRegexes {
    py_double_docstring: Regex,
    py_single_docstring: Regex,
    hash_line: Regex,
    c_block: Regex,
    slash_line: Regex,
    markup: Regex,
    blank_run: Regex,
}

impl CommentRegexes {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            py_double_docstring: Regex::new(r#""""[\s\S]*?""""#)?,
            py_single_docstring: Regex::new(r"'''[\s\S]*?'''")?,
            hash_line: Regex::new(r"(?m)^[ \t]*#.*$")?,
            c_block: Regex::new(r"/\*[\s\S]*?\*/")?,
            slash_line: Regex::new(r"(?m)^[ \t]*//.*$")?,
            markup: Regex::new(r"<!--[\s\S]*?-->")?,
            blank_run: Regex::new(r"\n\s*\n")?,
        })
    }
}

fn comment_regexes() -> Option<&'static CommentRegexes> {
    static REGEXES: OnceLock<Option<CommentRegexes>> = OnceLock::new();
    REGEXES
        .get_or_init(|| match CommentRegexes::compile() {
            Ok(regexes) => Some(regexes),
            Err(err) => {
                log::warn!("Comment stripping disabled: {}", err);
                None
            }
        })
        .as_ref()
}

/// Comment syntax family for a file, keyed on extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStyle {
    Python,
    CLike,
    Markup,
    Css,
    Other,
}

impl CommentStyle {
    fn for_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "py" => Self::Python,
            "js" | "jsx" | "ts" | "tsx" | "cs" | "java" | "c" | "cpp" | "h" | "hpp" => Self::CLike,
            "html" | "xml" | "csproj" | "sln" => Self::Markup,
            "css" => Self::Css,
            _ => Self::Other,
        }
    }
}

/// Remove comments from file content based on its extension
///
/// Runs of blank lines left behind are collapsed to a single empty line.
/// Files with unknown extensions only get the blank-line collapse.
pub fn strip_comments(relative_path: &str, content: &str) -> String {
    let Some(re) = comment_regexes() else {
        return content.to_owned();
    };

    let stripped = match CommentStyle::for_path(relative_path) {
        CommentStyle::Python => {
            let text = re.py_double_docstring.replace_all(content, "");
            let text = re.py_single_docstring.replace_all(&text, "");
            re.hash_line.replace_all(&text, "").into_owned()
        }
        CommentStyle::CLike => {
            let text = re.c_block.replace_all(content, "");
            re.slash_line.replace_all(&text, "").into_owned()
        }
        CommentStyle::Markup => re.markup.replace_all(content, "").into_owned(),
        CommentStyle::Css => re.c_block.replace_all(content, "").into_owned(),
        CommentStyle::Other => content.to_owned(),
    };

    re.blank_run.replace_all(&stripped, "\n\n").into_owned()
}
