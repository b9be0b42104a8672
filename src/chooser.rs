//! Rule-based compressor selection. Rules see only the partial local file
//! header (filename, provisional sizes) — never file contents — so the
//! pipeline can decide a compressor before a single byte is read.

use globset::GlobMatcher;
use regex::Regex;

use crate::algo::build_compressor;
use crate::error::{Result, ZipError};
use crate::types::LocalFileHeader;

/// Which header field a rule inspects.
#[derive(Debug, Clone, Copy)]
pub enum Attr {
    Usize,
    Csize,
    Filename,
}

/// The comparison a rule applies to its attribute.
pub enum Predicate {
    Lt(u64),
    Le(u64),
    Gt(u64),
    Ge(u64),
    Eq(u64),
    Regex(Regex),
    Glob(GlobMatcher),
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Lt(v) => write!(f, "Lt({})", v),
            Predicate::Le(v) => write!(f, "Le({})", v),
            Predicate::Gt(v) => write!(f, "Gt({})", v),
            Predicate::Ge(v) => write!(f, "Ge({})", v),
            Predicate::Eq(v) => write!(f, "Eq({})", v),
            Predicate::Regex(r) => write!(f, "Regex({})", r.as_str()),
            Predicate::Glob(_) => write!(f, "Glob(..)"),
        }
    }
}

pub struct Rule {
    pub attr: Attr,
    pub predicate: Predicate,
    pub algo: String,
}

/// Rule predicates match filenames the way `re.fullmatch` does: the whole
/// string, not just a substring. `Regex` has no built-in full-match, so the
/// pattern is anchored at construction time.
pub fn fullmatch_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ZipError::InvalidFormat(e.to_string()))
}

impl Rule {
    fn matches(&self, lfh: &LocalFileHeader) -> bool {
        match (self.attr, &self.predicate) {
            (Attr::Usize, Predicate::Lt(v)) => lfh.usize < *v,
            (Attr::Usize, Predicate::Le(v)) => lfh.usize <= *v,
            (Attr::Usize, Predicate::Gt(v)) => lfh.usize > *v,
            (Attr::Usize, Predicate::Ge(v)) => lfh.usize >= *v,
            (Attr::Usize, Predicate::Eq(v)) => lfh.usize == *v,
            (Attr::Csize, Predicate::Lt(v)) => lfh.csize < *v,
            (Attr::Csize, Predicate::Le(v)) => lfh.csize <= *v,
            (Attr::Csize, Predicate::Gt(v)) => lfh.csize > *v,
            (Attr::Csize, Predicate::Ge(v)) => lfh.csize >= *v,
            (Attr::Csize, Predicate::Eq(v)) => lfh.csize == *v,
            (Attr::Filename, Predicate::Regex(re)) => re.is_match(&lfh.filename),
            (Attr::Filename, Predicate::Glob(g)) => g.is_match(&lfh.filename),
            _ => false,
        }
    }
}

/// An ordered rule table plus a fallback. The first matching rule wins.
pub struct CompressionChooser {
    rules: Vec<Rule>,
    default: String,
}

impl CompressionChooser {
    /// Validates every referenced algorithm key up front (fail fast) before
    /// accepting the chooser.
    pub fn new(default: impl Into<String>, rules: Vec<Rule>) -> Result<Self> {
        let default = default.into();
        for rule in &rules {
            build_compressor(&rule.algo, 1)?;
        }
        build_compressor(&default, 1)?;
        Ok(CompressionChooser { rules, default })
    }

    pub fn choose(&self, lfh: &LocalFileHeader) -> &str {
        for rule in &self.rules {
            if rule.matches(lfh) {
                return &rule.algo;
            }
        }
        &self.default
    }
}

/// `usize < 12 => store`, `filename matching *.zip => store`, else deflate.
/// DEFLATE grows very small inputs (the shortest stream for one repeated
/// byte is still ~11 bytes), and re-deflating an already-compressed archive
/// wastes CPU for no size benefit.
pub fn default_chooser() -> Result<CompressionChooser> {
    let zip_suffix = fullmatch_regex(r".*\.zip")?;
    CompressionChooser::new(
        "deflate@compresslevel=-1",
        vec![
            Rule {
                attr: Attr::Usize,
                predicate: Predicate::Lt(12),
                algo: "store".to_string(),
            },
            Rule {
                attr: Attr::Filename,
                predicate: Predicate::Regex(zip_suffix),
                algo: "store".to_string(),
            },
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lfh(filename: &str, usize: u64) -> LocalFileHeader {
        LocalFileHeader::new_provisional(filename, usize, 0, 0)
    }

    #[test]
    fn tiny_files_are_stored() {
        let chooser = default_chooser().unwrap();
        assert_eq!(chooser.choose(&lfh("a.txt", 4)), "store");
    }

    #[test]
    fn zip_suffix_is_stored_even_when_large() {
        let chooser = default_chooser().unwrap();
        assert_eq!(chooser.choose(&lfh("bundle.zip", 5_000_000)), "store");
    }

    #[test]
    fn default_applies_otherwise() {
        let chooser = default_chooser().unwrap();
        assert_eq!(chooser.choose(&lfh("readme.md", 5000)), "deflate@compresslevel=-1");
    }

    #[test]
    fn unknown_algo_in_rule_rejected_at_construction() {
        let result = CompressionChooser::new(
            "store",
            vec![Rule {
                attr: Attr::Usize,
                predicate: Predicate::Lt(1),
                algo: "not-a-real-algo".to_string(),
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn glob_rule_matches_full_path() {
        let pattern = globset::Glob::new("**/*.log").unwrap().compile_matcher();
        let chooser = CompressionChooser::new(
            "deflate",
            vec![Rule {
                attr: Attr::Filename,
                predicate: Predicate::Glob(pattern),
                algo: "store".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(chooser.choose(&lfh("logs/today.log", 9999)), "store");
        assert_eq!(chooser.choose(&lfh("logs/today.txt", 9999)), "deflate");
    }
}
