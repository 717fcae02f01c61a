//! Fetch command parsing
//!
//! The command grammar is deliberately soft: optional tokens may appear in any order and
//! anything unrecognized degrades to a search term. Tokens are classified in a fixed
//! priority order so that ambiguous tokens always resolve the same way:
//!
//! 1. time filter keyword (`all`, `year`, `month`, `week`), first occurrence only
//! 2. integer in `1..=5`, taken as the count, first occurrence only
//! 3. media type keyword (`image`, `video`), first occurrence only
//! 4. the `-c` flag
//! 5. the first remaining token is the (comma-separated) subreddit list; every later
//!    remaining token is split on commas and added to the search terms
//!
//! Parsing only fails when no subreddit list can be found.

use crate::error::ParseError;
use crate::types::{FetchRequest, MAX_COUNT, MIN_COUNT, MediaTypeFilter, TimeFilter};
use regex::Regex;
use std::sync::LazyLock;

/// Flag that attaches top comments to each delivery
pub const COMMENTS_FLAG: &str = "-c";

// pattern is a literal
#[allow(clippy::unwrap_used)]
static SUBREDDIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:/?r/)?([A-Za-z0-9_]{2,21})$").unwrap());

/// Parse a raw command string into a [`FetchRequest`]
///
/// A leading trigger token (`/r`, `/r@SomeBot`) is ignored when present.
///
/// # Examples
///
/// ```
/// use reddit_relay::command::parse;
/// use reddit_relay::types::{MediaTypeFilter, TimeFilter};
///
/// let request = parse("/r month pics,cats cool 2 image").unwrap();
/// assert_eq!(request.time_filter, Some(TimeFilter::Month));
/// assert_eq!(request.targets, vec!["pics", "cats"]);
/// assert_eq!(request.search_terms, vec!["cool"]);
/// assert_eq!(request.count, 2);
/// assert_eq!(request.media_type, MediaTypeFilter::Image);
/// assert!(!request.include_comments);
/// ```
pub fn parse(raw: &str) -> Result<FetchRequest, ParseError> {
    let mut tokens = raw.split_whitespace().peekable();
    if tokens.peek().is_some_and(|t| t.starts_with('/')) {
        tokens.next();
    }
    parse_args(tokens)
}

/// Parse already-split command arguments (trigger removed)
pub fn parse_args<'a, I>(args: I) -> Result<FetchRequest, ParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut time_filter = None;
    let mut count = None;
    let mut media_type = None;
    let mut include_comments = false;
    let mut targets: Option<Vec<String>> = None;
    let mut search_terms = Vec::new();
    let mut saw_any = false;

    for token in args {
        saw_any = true;

        if time_filter.is_none()
            && let Some(filter) = TimeFilter::from_keyword(token)
        {
            time_filter = Some(filter);
            continue;
        }
        if count.is_none()
            && let Some(n) = parse_count(token)
        {
            count = Some(n);
            continue;
        }
        if media_type.is_none()
            && let Some(kind) = MediaTypeFilter::from_keyword(token)
        {
            media_type = Some(kind);
            continue;
        }
        if token.eq_ignore_ascii_case(COMMENTS_FLAG) {
            include_comments = true;
            continue;
        }
        if targets.is_none()
            && let Some(list) = parse_subreddit_list(token)
        {
            targets = Some(list);
            continue;
        }
        for term in split_list(token) {
            push_unique(&mut search_terms, term.to_lowercase());
        }
    }

    if !saw_any {
        return Err(ParseError::EmptyCommand);
    }
    let targets = targets.ok_or(ParseError::NoTargets)?;

    let mut request = FetchRequest::new(targets).with_count(count.unwrap_or(MIN_COUNT));
    request.time_filter = time_filter;
    request.search_terms = search_terms;
    request.media_type = media_type.unwrap_or_default();
    request.include_comments = include_comments;

    tracing::debug!(?request, "parsed fetch command");
    Ok(request)
}

fn parse_count(token: &str) -> Option<u8> {
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token
        .parse::<u8>()
        .ok()
        .filter(|n| (MIN_COUNT..=MAX_COUNT).contains(n))
}

/// Split a comma-separated token into its non-empty, trimmed parts
fn split_list(token: &str) -> impl Iterator<Item = &str> {
    token.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// A token qualifies as the subreddit list when every entry is a valid name
fn parse_subreddit_list(token: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for part in split_list(token) {
        let caps = SUBREDDIT_NAME.captures(part)?;
        push_unique(&mut names, caps[1].to_lowercase());
    }
    if names.is_empty() { None } else { Some(names) }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}
