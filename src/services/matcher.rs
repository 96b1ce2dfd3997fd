// src/services/matcher.rs

//! Fuzzy keyword matching.
//!
//! Every keyword becomes a pattern that matches its characters in order,
//! allowing at most one arbitrary character between neighbours ("花园"
//! matches "花@园" but not "花@@园"). Exclusion terms are plain substrings
//! of the title or content and win over any keyword hit.

use regex::Regex;

use crate::error::Result;
use crate::models::PostDraft;

/// Result of running a post through the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchVerdict {
    /// An exclusion term occurs in the title or content
    Excluded { term: String },
    /// At least one keyword matched
    Matched {
        /// Matched keywords in configuration order, without duplicates
        keywords: Vec<String>,
        /// Comments that matched some keyword; diagnostic only
        relevant_comments: Vec<String>,
    },
    /// No keyword matched anywhere
    Unmatched,
}

impl MatchVerdict {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchVerdict::Matched { .. })
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, MatchVerdict::Excluded { .. })
    }

    /// Matched keywords, empty unless matched.
    pub fn keywords(&self) -> &[String] {
        match self {
            MatchVerdict::Matched { keywords, .. } => keywords,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
struct KeywordPattern {
    keyword: String,
    pattern: Regex,
}

/// Keyword/exclusion filter applied to group posts.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<KeywordPattern>,
    exclude: Vec<String>,
}

impl KeywordMatcher {
    /// Compile keywords into fuzzy patterns. Blank keywords and exclusion
    /// terms are ignored.
    pub fn new(keywords: &[String], exclude: &[String]) -> Result<Self> {
        let mut compiled: Vec<KeywordPattern> = Vec::new();
        for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            if compiled.iter().any(|k| k.keyword == keyword) {
                continue;
            }
            compiled.push(KeywordPattern {
                keyword: keyword.to_string(),
                pattern: Regex::new(&fuzzy_pattern(keyword))?,
            });
        }

        Ok(Self {
            keywords: compiled,
            exclude: exclude
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        })
    }

    /// Check a post against the exclusion terms and keywords.
    pub fn evaluate(&self, post: &PostDraft) -> MatchVerdict {
        self.evaluate_parts(&post.title, &post.content, &post.comments)
    }

    /// Same as [`evaluate`](Self::evaluate) on loose parts.
    pub fn evaluate_parts(&self, title: &str, content: &str, comments: &[String]) -> MatchVerdict {
        if let Some(term) = self
            .exclude
            .iter()
            .find(|e| title.contains(e.as_str()) || content.contains(e.as_str()))
        {
            return MatchVerdict::Excluded { term: term.clone() };
        }

        let mut keywords = Vec::new();
        let mut relevant_comments = Vec::new();
        for k in &self.keywords {
            let mut hit = k.pattern.is_match(title) || k.pattern.is_match(content);
            for comment in comments {
                if k.pattern.is_match(comment) {
                    hit = true;
                    relevant_comments.push(comment.clone());
                }
            }
            if hit {
                keywords.push(k.keyword.clone());
            }
        }

        if keywords.is_empty() {
            MatchVerdict::Unmatched
        } else {
            MatchVerdict::Matched {
                keywords,
                relevant_comments,
            }
        }
    }
}

/// Build the single-insertion-tolerant pattern for `keyword`.
fn fuzzy_pattern(keyword: &str) -> String {
    let chars: Vec<String> = keyword
        .chars()
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    format!("(?s){}", chars.join(".?"))
}
