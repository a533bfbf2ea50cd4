//! File filters
//!
//! A `FileFilter` is a pure predicate over a file's name, path, size and
//! hidden flag. Filters compose through `All`, `Any` and `Not`; a file is
//! synced only when every top-level filter accepts it. Filtered files are
//! invisible to the planner on both sides, in every mode.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;

use crate::relpath::RelPath;

/// The attributes a filter may inspect
#[derive(Debug, Clone)]
pub struct FilterEntry<'a> {
	pub name: &'a str,
	pub path: &'a RelPath,
	pub size: u64,
	pub is_hidden: bool,
}

impl<'a> FilterEntry<'a> {
	/// Build a filter entry for a manifest-style record. A file counts as
	/// hidden when any path segment starts with a dot.
	pub fn new(path: &'a RelPath, size: u64) -> Self {
		FilterEntry {
			name: path.name(),
			path,
			size,
			is_hidden: path.segments().any(|s| s.starts_with('.')),
		}
	}
}

/// Error raised for unparseable filter patterns
#[derive(Debug)]
pub struct FilterError {
	pub message: String,
}

impl fmt::Display for FilterError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Invalid filter: {}", self.message)
	}
}

impl std::error::Error for FilterError {}

type CustomFn = dyn Fn(&FilterEntry) -> bool + Send + Sync;

/// Composable file predicate
#[derive(Clone)]
pub enum FileFilter {
	/// Accept only files whose extension is listed (without dot, case-insensitive)
	IncludeExtensions(Vec<String>),

	/// Reject files whose extension is listed
	ExcludeExtensions(Vec<String>),

	/// Accept files whose size is within the inclusive range
	SizeRange { min: Option<u64>, max: Option<u64> },

	/// Accept paths matching a glob pattern (`*` and `?` wildcards)
	Glob(Regex),

	/// Accept paths matching a regular expression
	Regex(Regex),

	/// Reject hidden files (dot-prefixed names anywhere in the path)
	Hidden,

	/// Accept only paths under the given prefix
	PathPrefix(String),

	/// User-supplied predicate
	Custom(Arc<CustomFn>),

	/// Accept when every child accepts
	All(Vec<FileFilter>),

	/// Accept when at least one child accepts
	Any(Vec<FileFilter>),

	/// Invert a filter
	Not(Box<FileFilter>),
}

impl fmt::Debug for FileFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::IncludeExtensions(exts) => write!(f, "IncludeExtensions({:?})", exts),
			Self::ExcludeExtensions(exts) => write!(f, "ExcludeExtensions({:?})", exts),
			Self::SizeRange { min, max } => write!(f, "SizeRange({:?}, {:?})", min, max),
			Self::Glob(re) => write!(f, "Glob({:?})", re.as_str()),
			Self::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
			Self::Hidden => write!(f, "Hidden"),
			Self::PathPrefix(p) => write!(f, "PathPrefix({:?})", p),
			Self::Custom(_) => write!(f, "Custom(..)"),
			Self::All(children) => write!(f, "All({:?})", children),
			Self::Any(children) => write!(f, "Any({:?})", children),
			Self::Not(inner) => write!(f, "Not({:?})", inner),
		}
	}
}

impl FileFilter {
	/// Build a glob filter. `*` matches any run of characters, `?` a
	/// single character; matching is case-insensitive over the full
	/// relative path.
	pub fn glob(pattern: &str) -> Result<Self, FilterError> {
		let regex = compile_pattern(&glob_to_regex(pattern))?;
		Ok(FileFilter::Glob(regex))
	}

	/// Build a regex filter (case-insensitive, anchored).
	pub fn regex(pattern: &str) -> Result<Self, FilterError> {
		Ok(FileFilter::Regex(compile_pattern(pattern)?))
	}

	/// Build a custom predicate filter.
	pub fn custom<F>(predicate: F) -> Self
	where
		F: Fn(&FilterEntry) -> bool + Send + Sync + 'static,
	{
		FileFilter::Custom(Arc::new(predicate))
	}

	/// Apply the predicate.
	pub fn accept(&self, entry: &FilterEntry) -> bool {
		match self {
			Self::IncludeExtensions(exts) => match entry.path.extension() {
				Some(ext) => {
					let ext = ext.trim_start_matches('.');
					exts.iter().any(|e| e.eq_ignore_ascii_case(ext))
				}
				None => false,
			},
			Self::ExcludeExtensions(exts) => match entry.path.extension() {
				Some(ext) => {
					let ext = ext.trim_start_matches('.');
					!exts.iter().any(|e| e.eq_ignore_ascii_case(ext))
				}
				None => true,
			},
			Self::SizeRange { min, max } => {
				if let Some(min) = min {
					if entry.size < *min {
						return false;
					}
				}
				if let Some(max) = max {
					if entry.size > *max {
						return false;
					}
				}
				true
			}
			Self::Glob(re) | Self::Regex(re) => re.is_match(entry.path.as_str()),
			Self::Hidden => !entry.is_hidden,
			Self::PathPrefix(prefix) => entry.path.starts_with(prefix),
			Self::Custom(predicate) => predicate(entry),
			Self::All(children) => children.iter().all(|c| c.accept(entry)),
			Self::Any(children) => children.iter().any(|c| c.accept(entry)),
			Self::Not(inner) => !inner.accept(entry),
		}
	}
}

/// Check a file against a top-level filter list (all must accept).
pub fn accept_all(filters: &[FileFilter], entry: &FilterEntry) -> bool {
	filters.iter().all(|f| f.accept(entry))
}

/// The default filter set: skip hidden files and common temp artifacts.
pub fn default_sync_filter() -> Vec<FileFilter> {
	let temp_globs = ["*.tmp", "*.part", "*.crdownload", "*~"]
		.iter()
		.map(|p| FileFilter::glob(p).expect("builtin glob pattern"))
		.collect();
	vec![FileFilter::Hidden, FileFilter::Not(Box::new(FileFilter::Any(temp_globs)))]
}

/// Translate a glob pattern to an anchored regex source.
fn glob_to_regex(pattern: &str) -> String {
	let mut out = String::with_capacity(pattern.len() + 8);
	for c in pattern.chars() {
		match c {
			'*' => out.push_str(".*"),
			'?' => out.push('.'),
			// Escape regex metacharacters, '.' included
			'.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
				out.push('\\');
				out.push(c);
			}
			c => out.push(c),
		}
	}
	out
}

fn compile_pattern(source: &str) -> Result<Regex, FilterError> {
	RegexBuilder::new(&format!("^(?:{})$", source))
		.case_insensitive(true)
		.build()
		.map_err(|e| FilterError { message: e.to_string() })
}


// vim: ts=4
