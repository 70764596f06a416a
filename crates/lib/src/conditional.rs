//! Conditional request helpers.
//!
//! Entity-tag matching for `If-None-Match` and media type negotiation for the
//! manifest `Accept` header. Every resource served by the API is validated by a
//! quoted digest of its own content, so matching is plain string equality once a
//! header has been tokenized.

use crate::consts::MANIFEST_MEDIA_TYPE;

/// Media ranges under which the manifest can be served.
const MANIFEST_MEDIA_RANGES: &[&str] = &[MANIFEST_MEDIA_TYPE, "*/*", "application/*"];

/// Wrap a validator in double quotes, e.g. `sha256:ab..` -> `"sha256:ab.."`.
pub fn quote_etag(value: &str) -> String {
  format!("\"{value}\"")
}

/// Check whether an `If-None-Match` header value matches the current validator.
///
/// The header holds comma-separated entity tags, each optionally weak (`W/`), or
/// the wildcard `*`. Malformed tags are skipped. Tags are compared verbatim, so a
/// weak tag only matches an identical weak validator. An empty validator never
/// matches.
pub fn etag_matches(current: &str, header: &str) -> bool {
  if current.is_empty() {
    return false;
  }
  split_top_level(header)
    .into_iter()
    .any(|token| token_matches(current, token))
}

/// [`etag_matches`] over every occurrence of the header.
pub fn etag_matches_any<'a>(current: &str, headers: impl IntoIterator<Item = &'a str>) -> bool {
  headers.into_iter().any(|header| etag_matches(current, header))
}

fn token_matches(current: &str, token: &str) -> bool {
  if token == "*" {
    return true;
  }

  let (weak, rest) = match token.strip_prefix("W/") {
    Some(rest) => (true, rest.trim_start()),
    None => (false, token),
  };

  let Some(quoted) = quoted_string(rest) else {
    return false;
  };

  if weak {
    current.strip_prefix("W/") == Some(quoted)
  } else {
    current == quoted
  }
}

/// Return `s` if it is exactly one quoted string with no trailing characters.
fn quoted_string(s: &str) -> Option<&str> {
  let body = s.strip_prefix('"')?;
  let mut escaped = false;
  for (idx, c) in body.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' => escaped = true,
      '"' => {
        // Closing quote must end the token.
        return (idx + 1 == body.len()).then_some(s);
      }
      _ => {}
    }
  }
  None
}

/// Split on commas that are not inside a quoted string.
fn split_top_level(header: &str) -> Vec<&str> {
  let mut tokens = Vec::new();
  let mut start = 0;
  let mut in_quotes = false;
  let mut escaped = false;

  for (idx, c) in header.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' if in_quotes => escaped = true,
      '"' => in_quotes = !in_quotes,
      ',' if !in_quotes => {
        tokens.push(&header[start..idx]);
        start = idx + 1;
      }
      _ => {}
    }
  }
  tokens.push(&header[start..]);

  tokens.into_iter().map(str::trim).filter(|t| !t.is_empty()).collect()
}

/// Check an `Accept` header against the manifest media type.
///
/// A missing or blank header accepts anything. Otherwise at least one listed
/// media range (parameters ignored) must be the manifest type or a wildcard
/// covering it.
pub fn accepts_manifest(accept: Option<&str>) -> bool {
  let Some(accept) = accept.map(str::trim).filter(|a| !a.is_empty()) else {
    return true;
  };

  accept.split(',').any(|range| {
    let media = range.split(';').next().unwrap_or("").trim();
    MANIFEST_MEDIA_RANGES
      .iter()
      .any(|supported| media.eq_ignore_ascii_case(supported))
  })
}
